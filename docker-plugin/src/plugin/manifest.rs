use log::trace;
use serde::Deserialize;

use super::{Eligibility, Flags};
use crate::{
    docker::docker,
    error::{Error, Result, ValidationError},
    process::{Command, Runner},
};

/// An image included in a fat manifest, with the platform it should be annotated with.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManifestImage {
    pub name: String,
    pub arch: Option<String>,
    pub os: Option<String>,
    pub os_features: Vec<String>,
    pub os_version: Option<String>,
    pub variant: Option<String>,
}

impl ManifestImage {
    fn annotations(&self) -> Vec<String> {
        let mut flags = Flags::default();
        flags.value("--arch", self.arch.as_deref());
        flags.value("--os", self.os.as_deref());
        flags.value("--os-features", Some(self.os_features.join(",").as_str()));
        flags.value("--os-version", self.os_version.as_deref());
        flags.value("--variant", self.variant.as_deref());
        flags.into_vec()
    }
}

/// A multi-platform image assembled from already published images. Provided as JSON through
/// `manifest.spec`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: String,
    pub images: Vec<ManifestImage>,
    #[serde(skip)]
    pub raw: String,
}

impl Manifest {
    pub fn unmarshal(&mut self) -> Result<()> {
        if self.raw.trim().is_empty() {
            return Ok(());
        }
        trace!("parsing manifest.spec {:?}", self.raw);

        let parsed: Manifest = serde_json::from_str(&self.raw).map_err(|error| Error::Config {
            setting: "manifest.spec",
            source: error.into(),
        })?;
        self.name = parsed.name;
        self.images = parsed.images;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        trace!("validating manifest configuration");

        if self.name.is_empty() {
            return Err(ValidationError::NoManifestName.into());
        }
        if self.images.is_empty() {
            return Err(ValidationError::NoManifestImages.into());
        }
        Ok(())
    }

    pub fn create_command(&self) -> Command {
        let mut command = docker!("manifest", "create", &self.name);
        for image in &self.images {
            command = command.arg("--amend").arg(&image.name);
        }
        command
    }

    /// One `manifest annotate` per image that carries at least one annotation.
    pub fn annotate_commands(&self) -> Vec<Command> {
        self.images
            .iter()
            .filter_map(|image| {
                let annotations = image.annotations();
                if annotations.is_empty() {
                    return None;
                }
                trace!("annotating {} in {} with {annotations:?}", image.name, self.name);
                Some(
                    docker!("manifest", "annotate")
                        .args(annotations)
                        .arg(&self.name)
                        .arg(&image.name),
                )
            })
            .collect()
    }

    pub fn push_command(&self) -> Command {
        docker!("manifest", "push", &self.name)
    }

    /// Creates the manifest locally and annotates its images.
    pub fn exec(&self, runner: &dyn Runner, eligibility: &Eligibility) -> Result<()> {
        eligibility.require("manifest")?;
        trace!("running manifest with provided configuration");

        runner.run(&self.create_command())?;
        for command in self.annotate_commands() {
            runner.run(&command)?;
        }
        Ok(())
    }

    pub fn exec_push(&self, runner: &dyn Runner, eligibility: &Eligibility) -> Result<()> {
        eligibility.require("manifest push")?;
        runner.run(&self.push_command())?;
        Ok(())
    }
}
