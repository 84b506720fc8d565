mod build;
mod daemon;
mod publish;

use std::time::Duration;

use clap::Parser;
use log::{debug, info};

use crate::{
    config::{source, Resolver, Source},
    plugin::{Plugin, Provenance},
    process::{Cancel, System},
    storage, version, Result,
};

const LOG_LEVEL: Source = source!(
    "log.level",
    "log_level",
    ["PARAMETER_LOG_LEVEL", "VELA_LOG_LEVEL", "DOCKER_LOG_LEVEL"]
);
const TIMEOUT: Source = source!("timeout", "timeout", ["PARAMETER_TIMEOUT", "DOCKER_TIMEOUT"]);

/// Maps a pipeline log level onto an `env_logger` filter. Unknown levels fall back to `info`.
pub fn log_filter(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "t" | "trace" => "trace",
        "d" | "debug" => "debug",
        "w" | "warn" | "warning" => "warn",
        "e" | "error" | "f" | "fatal" | "p" | "panic" => "error",
        _ => "info",
    }
}

#[derive(Debug, Parser)]
#[command(version = version::VERSION, about)]
pub struct Cli {
    /// Log level of the plugin: trace, debug, info, warn or error.
    #[arg(long = "log.level")]
    log_level: Option<String>,

    /// Give up on the run, killing the command in progress, after this many seconds.
    #[arg(long = "timeout")]
    timeout: Option<u64>,

    #[command(flatten)]
    build: build::BuildArgs,

    #[command(flatten)]
    daemon: daemon::DaemonArgs,

    #[command(flatten)]
    push: publish::PushArgs,

    #[command(flatten)]
    registry: publish::RegistryArgs,

    #[command(flatten)]
    manifest: publish::ManifestArgs,
}

impl Cli {
    /// The `env_logger` filter for the resolved `log.level`.
    pub fn log_filter(&self, resolver: &Resolver) -> &'static str {
        resolver
            .string(self.log_level.clone(), &LOG_LEVEL)
            .as_deref()
            .map_or("info", log_filter)
    }

    /// Resolves every setting and assembles the plugin from them.
    fn plugin(self, resolver: &Resolver) -> Result<Plugin> {
        Ok(Plugin::new(
            self.build.resolve(resolver)?,
            self.push.resolve(resolver)?,
            self.daemon.resolve(resolver)?,
            self.registry.resolve(resolver, storage::Os)?,
            self.manifest.resolve(resolver),
            Provenance::from_resolver(resolver),
        ))
    }

    pub fn run(self, resolver: &Resolver) -> Result<()> {
        info!("docker plugin {}", version::VERSION);

        let timeout = resolver
            .number(self.timeout, &TIMEOUT)?
            .map(Duration::from_secs);
        let cancel = Cancel::after(timeout).on_termination()?;

        let mut plugin = self.plugin(resolver)?;
        plugin.validate()?;

        let runner = System::new(cancel.clone());
        plugin.exec(&runner, |duration| {
            if let Err(stop) = cancel.sleep(duration) {
                debug!("no longer waiting for the docker daemon: {stop}");
            }
        })?;

        Ok(())
    }
}
