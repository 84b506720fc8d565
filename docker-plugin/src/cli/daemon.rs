use clap::{builder::BoolishValueParser, Args};

use crate::{
    config::{source, Resolver},
    error::Result,
    plugin::Daemon,
};

/// Flags for the docker daemon started next to the build.
#[derive(Debug, Args)]
#[command(next_help_heading = "Daemon")]
pub struct DaemonArgs {
    /// Start a docker daemon before building. Disable when the pipeline provides one.
    #[arg(
        long = "daemon.enabled",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    enabled: Option<bool>,

    /// Daemon settings as JSON, e.g. `{"mtu": 1450, "dns": {"servers": ["8.8.8.8"]}}`.
    #[arg(long = "daemon.config")]
    daemon_config: Option<String>,

    /// Run the daemon unprivileged under rootlesskit.
    #[arg(
        long = "daemon.rootless",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    rootless: Option<bool>,
}

impl DaemonArgs {
    /// Returns `None` when no daemon should be started.
    pub fn resolve(self, resolver: &Resolver) -> Result<Option<Daemon>> {
        let enabled = resolver
            .flag(
                self.enabled,
                &source!(
                    "daemon.enabled",
                    "daemon/enabled",
                    ["PARAMETER_START_DAEMON", "DOCKER_START_DAEMON"]
                ),
            )?
            .unwrap_or(true);
        if !enabled {
            return Ok(None);
        }

        Ok(Some(Daemon {
            rootless: resolver
                .flag(
                    self.rootless,
                    &source!(
                        "daemon.rootless",
                        "daemon/rootless",
                        ["PARAMETER_ROOTLESS", "DOCKER_ROOTLESS"]
                    ),
                )?
                .unwrap_or_default(),
            raw: resolver
                .string(
                    self.daemon_config,
                    &source!(
                        "daemon.config",
                        "daemon/config",
                        ["PARAMETER_DAEMON", "DOCKER_DAEMON"]
                    ),
                )
                .unwrap_or_default(),
            ..Default::default()
        }))
    }
}
