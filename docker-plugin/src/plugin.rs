mod build;
mod daemon;
mod manifest;
mod provenance;
mod push;
mod registry;

use std::time::Duration;

pub use build::*;
pub use daemon::*;
use log::{debug, info, warn};
pub use manifest::*;
pub use provenance::*;
pub use push::*;
pub use registry::*;

use crate::{
    docker,
    error::{Error, Result},
    process::{Child, Runner},
};

/// Whether a step may run, decided by validating its configuration.
#[derive(Debug, Default)]
pub enum Eligibility {
    #[default]
    Unvalidated,
    Eligible,
    Ineligible(Error),
}

impl Eligibility {
    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Eligibility::Eligible,
            Err(error) => Eligibility::Ineligible(error),
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    fn reason(&self) -> String {
        match self {
            Eligibility::Unvalidated => "the configuration has not been validated".to_owned(),
            Eligibility::Eligible => "the configuration is valid".to_owned(),
            Eligibility::Ineligible(error) => error.to_string(),
        }
    }

    /// Fails unless the step is eligible to run.
    pub fn require(&self, step: &'static str) -> Result<()> {
        if self.is_eligible() {
            Ok(())
        } else {
            Err(Error::Ineligible {
                step,
                reason: self.reason(),
            })
        }
    }
}

/// Accumulates command line flags. Unset values produce no flags at all.
#[derive(Debug, Default)]
pub(crate) struct Flags(Vec<String>);

impl Flags {
    /// Appends `flag` if `enabled`.
    pub fn switch(&mut self, flag: &str, enabled: bool) {
        if enabled {
            self.0.push(flag.to_owned());
        }
    }

    /// Appends `flag value` if the value is present and not empty.
    pub fn value(&mut self, flag: &str, value: Option<&str>) {
        if let Some(value) = value.filter(|value| !value.is_empty()) {
            self.0.push(flag.to_owned());
            self.0.push(value.to_owned());
        }
    }

    /// Appends `flag value` for every value, in order.
    pub fn values<I>(&mut self, flag: &str, values: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for value in values {
            self.value(flag, Some(value.as_ref()));
        }
    }

    /// Appends `flag value` if the number is not zero.
    pub fn number(&mut self, flag: &str, value: u64) {
        if value != 0 {
            self.value(flag, Some(&value.to_string()));
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Everything a single plugin run does, in order.
#[derive(Debug)]
pub struct Plugin {
    pub build: Build,
    pub push: Push,
    /// Absent when the pipeline provides its own daemon.
    pub daemon: Option<Daemon>,
    pub registry: Registry,
    pub manifest: Manifest,
    pub provenance: Provenance,
    build_eligibility: Eligibility,
    manifest_eligibility: Eligibility,
    // The daemon is left running when the plugin exits, it goes away with the container.
    daemon_process: Option<Child>,
}

impl Plugin {
    pub fn new(
        build: Build,
        push: Push,
        daemon: Option<Daemon>,
        registry: Registry,
        manifest: Manifest,
        provenance: Provenance,
    ) -> Self {
        Self {
            build,
            push,
            daemon,
            registry,
            manifest,
            provenance,
            build_eligibility: Eligibility::Unvalidated,
            manifest_eligibility: Eligibility::Unvalidated,
            daemon_process: None,
        }
    }

    /// Validates the configuration and decides which steps will run. At least one of the image
    /// build and the manifest must be valid.
    pub fn validate(&mut self) -> Result<()> {
        debug!("validating plugin configuration");

        self.registry.validate()?;

        if let Some(daemon) = &mut self.daemon {
            daemon.unmarshal()?;
        }

        self.build_eligibility =
            Eligibility::from_result(self.build.unmarshal().and_then(|()| self.build.validate()));
        self.manifest_eligibility = Eligibility::from_result(
            self.manifest
                .unmarshal()
                .and_then(|()| self.manifest.validate()),
        );

        match (
            self.build_eligibility.is_eligible(),
            self.manifest_eligibility.is_eligible(),
        ) {
            (false, false) => Err(Error::NothingToDo {
                build: self.build_eligibility.reason(),
                manifest: self.manifest_eligibility.reason(),
            }),
            (build, manifest) => {
                if !build {
                    info!("skipping image build: {}", self.build_eligibility.reason());
                }
                if !manifest {
                    debug!("skipping manifest: {}", self.manifest_eligibility.reason());
                }
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub fn build_eligibility(&self) -> &Eligibility {
        &self.build_eligibility
    }

    #[cfg(test)]
    pub fn manifest_eligibility(&self) -> &Eligibility {
        &self.manifest_eligibility
    }

    /// Runs every eligible step. `sleep` paces the daemon readiness check.
    pub fn exec(&mut self, runner: &dyn Runner, sleep: impl FnMut(Duration)) -> Result<()> {
        debug!("running plugin with provided configuration");

        if let Some(daemon) = &self.daemon {
            self.daemon_process = start_daemon(daemon, runner, sleep);
        }

        // Fails early when the toolchain is unreachable, and helps troubleshooting.
        runner.run(&docker::version())?;
        runner.run(&docker::info())?;

        self.registry.write()?;
        self.registry.login(runner)?;

        if self.build_eligibility.is_eligible() {
            self.build.inject_labels(&self.provenance);
            self.build.exec(runner, &self.build_eligibility)?;

            if self.registry.dry_run {
                info!("registry dry run enabled, not pushing the image");
            } else {
                self.push.exec(runner, self.build.tags())?;
            }
        }

        if self.manifest_eligibility.is_eligible() {
            self.manifest.exec(runner, &self.manifest_eligibility)?;

            if self.registry.dry_run {
                info!("registry dry run enabled, not pushing the manifest");
            } else {
                self.manifest.exec_push(runner, &self.manifest_eligibility)?;
            }
        }

        Ok(())
    }
}

/// Starts the daemon and waits for it to answer. Failures are logged, later steps will report
/// an unreachable daemon themselves.
fn start_daemon(
    daemon: &Daemon,
    runner: &dyn Runner,
    sleep: impl FnMut(Duration),
) -> Option<Child> {
    info!("starting the docker daemon...");

    let process = match daemon.start(runner) {
        Ok(process) => process,
        Err(error) => {
            warn!("{error}, continuing without starting the daemon");
            return None;
        }
    };
    if let Some(id) = process.id() {
        debug!("{command:?} running with pid {id}", command = process.command());
    }

    match wait_until_ready(|| runner.run(&docker::version()).is_ok(), sleep) {
        Readiness::Ready { attempts } => {
            debug!("the docker daemon is ready after {attempts} attempt(s)");
        }
        Readiness::Unready { attempts } => {
            warn!("the docker daemon did not respond after {attempts} attempts, continuing anyway");
        }
    }

    Some(process)
}
