use std::borrow::Cow;

use log::trace;
use serde::Deserialize;

use super::{Eligibility, Flags, Provenance};
use crate::{
    docker::docker,
    error::{Error, Result, ValidationError},
    process::{Command, Runner},
};

/// CPU limits for the build containers, provided as JSON through `build.cpu`. Zero means unset.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Cpu {
    pub period: u64,
    pub quota: u64,
    pub shares: u64,
    pub set_cpus: Option<String>,
    pub set_mems: Option<String>,
}

impl Cpu {
    fn flags(&self, flags: &mut Flags) {
        flags.number("--cpu-period", self.period);
        flags.number("--cpu-quota", self.quota);
        flags.number("--cpu-shares", self.shares);
        flags.value("--cpuset-cpus", self.set_cpus.as_deref());
        flags.value("--cpuset-mems", self.set_mems.as_deref());
    }
}

/// Settings for `docker build`. Most fields map one-to-one onto a flag of the same name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Build {
    pub add_hosts: Vec<String>,
    pub build_args: Vec<String>,
    pub cache_from: Vec<String>,
    pub cgroup_parent: Option<String>,
    pub compress: bool,
    pub context: String,
    pub cpu: Cpu,
    /// JSON encoded [`Cpu`], parsed by [`Build::unmarshal`].
    pub cpu_raw: String,
    pub disable_content_trust: bool,
    pub file: Option<String>,
    pub force_rm: bool,
    pub image_id_file: Option<String>,
    pub isolation: Option<String>,
    pub labels: Vec<String>,
    pub memory: Vec<String>,
    pub memory_swaps: Vec<String>,
    pub network: Option<String>,
    pub no_cache: bool,
    pub outputs: Vec<String>,
    pub platform: Option<String>,
    pub progress: Option<String>,
    pub pull: bool,
    pub quiet: bool,
    pub remove: bool,
    /// Repository prepended to tags that do not already mention it.
    pub repo: Option<String>,
    pub secrets: Vec<String>,
    pub security_opts: Vec<String>,
    pub shm_sizes: Vec<String>,
    pub squash: bool,
    pub ssh_components: Vec<String>,
    pub stream: bool,
    pub tags: Vec<String>,
    pub target: Option<String>,
    pub ulimits: Vec<String>,
}

impl Build {
    /// Parses [`Build::cpu_raw`] into [`Build::cpu`]. The limits are left untouched when the JSON
    /// is malformed.
    pub fn unmarshal(&mut self) -> Result<()> {
        if self.cpu_raw.trim().is_empty() {
            return Ok(());
        }
        trace!("parsing build.cpu {:?}", self.cpu_raw);

        self.cpu = serde_json::from_str(&self.cpu_raw).map_err(|error| Error::Config {
            setting: "build.cpu",
            source: error.into(),
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        trace!("validating build configuration");

        if self.context.is_empty() {
            return Err(ValidationError::NoContext.into());
        }
        if self.tags.is_empty() {
            return Err(ValidationError::NoTags.into());
        }
        Ok(())
    }

    fn tag<'a>(&self, tag: &'a str) -> Cow<'a, str> {
        match self.repo.as_deref().filter(|repo| !repo.is_empty()) {
            Some(repo) if !tag.contains(repo) => Cow::Owned(format!("{repo}:{tag}")),
            _ => Cow::Borrowed(tag),
        }
    }

    /// The tags as they are passed to docker, after applying [`Build::repo`].
    pub fn tags(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.tags.iter().map(|tag| self.tag(tag))
    }

    /// Adds the provenance labels, except for keys that are already labelled.
    pub fn inject_labels(&mut self, provenance: &Provenance) {
        for (key, value) in provenance.labels() {
            let labelled = self
                .labels
                .iter()
                .any(|label| label.split('=').next() == Some(key));
            if !labelled {
                self.labels.push(format!("{key}={value}"));
            }
        }
    }

    pub fn command(&self) -> Command {
        let mut flags = Flags::default();
        flags.values("--add-host", &self.add_hosts);
        flags.values("--build-arg", &self.build_args);
        flags.values("--cache-from", &self.cache_from);
        flags.value("--cgroup-parent", self.cgroup_parent.as_deref());
        flags.switch("--compress", self.compress);
        self.cpu.flags(&mut flags);
        flags.switch("--disable-content-trust", self.disable_content_trust);
        flags.value("--file", self.file.as_deref());
        flags.switch("--force-rm", self.force_rm);
        flags.value("--iidfile", self.image_id_file.as_deref());
        flags.value("--isolation", self.isolation.as_deref());
        flags.values("--label", &self.labels);
        flags.values("--memory", &self.memory);
        flags.values("--memory-swap", &self.memory_swaps);
        flags.value("--network", self.network.as_deref());
        flags.switch("--no-cache", self.no_cache);
        flags.values("--output", &self.outputs);
        flags.value("--platform", self.platform.as_deref());
        flags.value("--progress", self.progress.as_deref());
        flags.switch("--pull", self.pull);
        flags.switch("--quiet", self.quiet);
        flags.switch("--rm", self.remove);
        flags.values("--secret", &self.secrets);
        flags.values("--security-opt", &self.security_opts);
        flags.values("--shm-size", &self.shm_sizes);
        flags.switch("--squash", self.squash);
        flags.values("--ssh", &self.ssh_components);
        flags.switch("--stream", self.stream);
        flags.values("--tag", self.tags());
        flags.value("--target", self.target.as_deref());
        flags.values("--ulimit", &self.ulimits);

        docker!("build").args(flags.into_vec()).arg(&self.context)
    }

    pub fn exec(&self, runner: &dyn Runner, eligibility: &Eligibility) -> Result<()> {
        eligibility.require("build")?;
        trace!("running build with provided configuration");

        runner.run(&self.command())?;
        Ok(())
    }
}
