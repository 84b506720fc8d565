use std::time::Duration;

use log::{debug, trace};
use serde::Deserialize;

use super::Flags;
use crate::{
    docker::{DOCKERD, ROOTLESSKIT},
    error::{Error, Result},
    process::{self, Child, Command, Runner},
};

pub const DEFAULT_DATA_ROOT: &str = "/var/lib/docker";
pub const HOST: &str = "unix:///var/run/docker.sock";

/// Number of times the daemon is checked before giving up on it.
pub const READINESS_ATTEMPTS: u32 = 5;

/// The rootless daemon keeps its runtime state under `$XDG_RUNTIME_DIR`.
pub const RUNTIME_DIR_VAR: &str = "XDG_RUNTIME_DIR";
pub const ROOTLESS_RUNTIME_DIR: &str = "/run/user/1000";

/// Sandbox settings for running dockerd under rootlesskit.
pub const ROOTLESS_FLAGS: &[&str] = &[
    "--net=slirp4netns",
    "--mtu=1500",
    "--disable-host-loopback",
    "--port-driver=builtin",
    "--copy-up=/etc",
    "--copy-up=/run",
];

/// The `--dns` prefixed flags of dockerd.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Dns {
    pub servers: Vec<String>,
    pub searches: Vec<String>,
}

/// The `--storage` prefixed flags of dockerd.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub driver: Option<String>,
    pub opts: Vec<String>,
}

/// Settings for the docker daemon the plugin starts. Provided as JSON through `daemon.config`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Daemon {
    /// Network bridge IP.
    pub bip: Option<String>,
    pub data_root: Option<String>,
    pub dns: Dns,
    pub experimental: bool,
    pub insecure_registries: Vec<String>,
    pub ipv6: bool,
    pub log_level: Option<String>,
    pub mtu: u64,
    pub registry_mirrors: Vec<String>,
    pub storage: StorageOptions,
    #[serde(skip)]
    pub rootless: bool,
    /// JSON encoded settings, parsed by [`Daemon::unmarshal`].
    #[serde(skip)]
    pub raw: String,
}

impl Daemon {
    /// Replaces the settings with the ones in [`Daemon::raw`], if any.
    pub fn unmarshal(&mut self) -> Result<()> {
        if self.raw.trim().is_empty() {
            return Ok(());
        }
        trace!("parsing daemon.config {:?}", self.raw);

        let parsed: Daemon = serde_json::from_str(&self.raw).map_err(|error| Error::Config {
            setting: "daemon.config",
            source: error.into(),
        })?;
        *self = Daemon {
            rootless: self.rootless,
            raw: std::mem::take(&mut self.raw),
            ..parsed
        };
        Ok(())
    }

    fn flags(&self) -> Vec<String> {
        let mut flags = Flags::default();
        flags.value(
            "--data-root",
            Some(self.data_root.as_deref().unwrap_or(DEFAULT_DATA_ROOT)),
        );
        flags.value("--host", Some(HOST));
        flags.value("--bip", self.bip.as_deref());
        flags.values("--dns", &self.dns.servers);
        flags.values("--dns-search", &self.dns.searches);
        flags.switch("--experimental", self.experimental);
        flags.values("--insecure-registry", &self.insecure_registries);
        flags.switch("--ipv6", self.ipv6);
        flags.value("--log-level", self.log_level.as_deref());
        flags.number("--mtu", self.mtu);
        flags.values("--registry-mirror", &self.registry_mirrors);
        flags.value("--storage-driver", self.storage.driver.as_deref());
        flags.values("--storage-opt", &self.storage.opts);
        flags.into_vec()
    }

    pub fn command(&self) -> Command {
        if self.rootless {
            process::command!(ROOTLESSKIT)
                .args(ROOTLESS_FLAGS.iter().copied())
                .arg(DOCKERD)
                .args(self.flags())
        } else {
            process::command!(DOCKERD).args(self.flags())
        }
    }

    /// Starts the daemon in the background.
    pub fn start(&self, runner: &dyn Runner) -> process::Result<Child> {
        if self.rootless {
            debug!("setting {RUNTIME_DIR_VAR}={ROOTLESS_RUNTIME_DIR}");
            std::env::set_var(RUNTIME_DIR_VAR, ROOTLESS_RUNTIME_DIR);
        }
        runner.spawn(&self.command())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    Unready { attempts: u32 },
}

/// Calls `ready` until it succeeds, at most [`READINESS_ATTEMPTS`] times. After failed attempt
/// `n` it sleeps `n` seconds, unless no attempts are left.
pub fn wait_until_ready(
    mut ready: impl FnMut() -> bool,
    mut sleep: impl FnMut(Duration),
) -> Readiness {
    for attempt in 1..=READINESS_ATTEMPTS {
        if ready() {
            return Readiness::Ready { attempts: attempt };
        }
        debug!("the docker daemon is not ready yet (attempt {attempt}/{READINESS_ATTEMPTS})");
        if attempt < READINESS_ATTEMPTS {
            sleep(Duration::from_secs(attempt.into()));
        }
    }
    Readiness::Unready {
        attempts: READINESS_ATTEMPTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;

    fn daemon() -> Daemon {
        Daemon {
            bip: Some("192.168.1.5/24".to_owned()),
            dns: Dns {
                servers: vec!["10.20.1.2".to_owned(), "10.20.1.3".to_owned()],
                searches: vec!["8.8.8.8".to_owned()],
            },
            experimental: true,
            insecure_registries: vec!["private.registry.com".to_owned()],
            ipv6: true,
            mtu: 1500,
            registry_mirrors: vec!["mirror.registry.com".to_owned()],
            storage: StorageOptions {
                driver: Some("overlay2".to_owned()),
                opts: vec!["ftype=1".to_owned()],
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_command() {
        let command = daemon().command();
        assert_eq!(command.get_program(), "/usr/local/bin/dockerd");
        assert_eq!(
            command.get_args(),
            [
                "--data-root",
                "/var/lib/docker",
                "--host",
                "unix:///var/run/docker.sock",
                "--bip",
                "192.168.1.5/24",
                "--dns",
                "10.20.1.2",
                "--dns",
                "10.20.1.3",
                "--dns-search",
                "8.8.8.8",
                "--experimental",
                "--insecure-registry",
                "private.registry.com",
                "--ipv6",
                "--mtu",
                "1500",
                "--registry-mirror",
                "mirror.registry.com",
                "--storage-driver",
                "overlay2",
                "--storage-opt",
                "ftype=1",
            ]
        );
    }

    #[test]
    fn test_command_without_settings() {
        let command = Daemon::default().command();
        assert_eq!(
            command.get_args(),
            [
                "--data-root",
                "/var/lib/docker",
                "--host",
                "unix:///var/run/docker.sock"
            ]
        );
    }

    #[test]
    fn test_command_rootless() {
        let command = Daemon {
            rootless: true,
            ..Default::default()
        }
        .command();
        assert_eq!(command.get_program(), "/usr/local/bin/rootlesskit");
        assert_eq!(
            command.to_string(),
            "/usr/local/bin/rootlesskit --net=slirp4netns --mtu=1500 --disable-host-loopback \
             --port-driver=builtin --copy-up=/etc --copy-up=/run /usr/local/bin/dockerd \
             --data-root /var/lib/docker --host unix:///var/run/docker.sock"
        );
    }

    #[test]
    fn test_unmarshal() {
        let mut daemon = Daemon {
            rootless: true,
            raw: r#"{"bip": "192.168.1.5/24", "dns": {"servers": ["10.20.1.2"]}, "storage": {"driver": "vfs"}, "mtu": 1450}"#
                .to_owned(),
            ..Default::default()
        };
        daemon.unmarshal().unwrap();

        assert_eq!(daemon.bip.as_deref(), Some("192.168.1.5/24"));
        assert_eq!(daemon.dns.servers, ["10.20.1.2"]);
        assert!(daemon.dns.searches.is_empty());
        assert_eq!(daemon.storage.driver.as_deref(), Some("vfs"));
        assert_eq!(daemon.mtu, 1450);
        assert!(daemon.rootless);
        assert!(!daemon.raw.is_empty());
    }

    #[test]
    fn test_unmarshal_malformed() {
        let mut daemon = Daemon {
            mtu: 1400,
            raw: "not json".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            daemon.unmarshal(),
            Err(Error::Config {
                setting: "daemon.config",
                ..
            })
        ));
        assert_eq!(daemon.mtu, 1400);
    }

    #[test]
    fn test_start_spawns_in_background() {
        let runner = RecordingRunner::default();
        let child = Daemon::default().start(&runner).unwrap();
        assert_eq!(child.id(), None);
        assert_eq!(runner.spawned().len(), 1);
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn test_start_rootless_sets_runtime_dir() {
        let runner = RecordingRunner::default();
        Daemon {
            rootless: true,
            ..Default::default()
        }
        .start(&runner)
        .unwrap();
        assert_eq!(std::env::var(RUNTIME_DIR_VAR).as_deref(), Ok(ROOTLESS_RUNTIME_DIR));
        let spawned = runner.spawned();
        assert_eq!(spawned.len(), 1);
        assert!(spawned[0].starts_with("/usr/local/bin/rootlesskit --net=slirp4netns"));
    }

    #[test]
    fn test_wait_until_ready_after_retries() {
        let mut checks = 0;
        let mut slept = Vec::new();
        let readiness = wait_until_ready(
            || {
                checks += 1;
                checks == 5
            },
            |duration| slept.push(duration.as_secs()),
        );

        assert_eq!(readiness, Readiness::Ready { attempts: 5 });
        assert_eq!(checks, 5);
        assert_eq!(slept, [1, 2, 3, 4]);
    }

    #[test]
    fn test_wait_until_ready_gives_up() {
        let mut checks = 0;
        let readiness = wait_until_ready(
            || {
                checks += 1;
                false
            },
            |_| {},
        );

        assert_eq!(readiness, Readiness::Unready { attempts: 5 });
        assert_eq!(checks, 5);
    }

    #[test]
    fn test_wait_until_ready_immediately() {
        let mut slept = 0;
        let readiness = wait_until_ready(|| true, |_| slept += 1);
        assert_eq!(readiness, Readiness::Ready { attempts: 1 });
        assert_eq!(slept, 0);
    }
}
