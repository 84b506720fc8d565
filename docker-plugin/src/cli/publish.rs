use clap::{builder::BoolishValueParser, Args};

use crate::{
    config::{source, Resolver},
    error::Result,
    plugin::{Manifest, Push, Registry, DEFAULT_REGISTRY},
    storage::Storage,
};

#[derive(Debug, Args)]
#[command(next_help_heading = "Push")]
pub struct PushArgs {
    /// Skip image signing when pushing.
    #[arg(
        long = "push.disable-content-trust",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    push_disable_content_trust: Option<bool>,
}

impl PushArgs {
    pub fn resolve(self, resolver: &Resolver) -> Result<Push> {
        let default = Push::default();
        Ok(Push {
            disable_content_trust: resolver
                .flag(
                    self.push_disable_content_trust,
                    &source!(
                        "push.disable-content-trust",
                        "push/disable_content_trust",
                        [
                            "PARAMETER_PUSH_DISABLE_CONTENT_TRUST",
                            "DOCKER_PUSH_DISABLE_CONTENT_TRUST"
                        ]
                    ),
                )?
                .unwrap_or(default.disable_content_trust),
        })
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Registry")]
pub struct RegistryArgs {
    /// Registry to authenticate with and publish to.
    #[arg(long = "registry.name")]
    name: Option<String>,

    #[arg(long = "registry.username")]
    username: Option<String>,

    #[arg(long = "registry.password")]
    password: Option<String>,

    /// Build the image without publishing it.
    #[arg(
        long = "registry.dry-run",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    dry_run: Option<bool>,
}

impl RegistryArgs {
    pub fn resolve(self, resolver: &Resolver, storage: impl Storage + 'static) -> Result<Registry> {
        let mut registry = Registry::new(storage);
        registry.name = resolver
            .string(
                self.name,
                &source!("registry.name", "registry/name", ["PARAMETER_REGISTRY", "REGISTRY_NAME"]),
            )
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_owned());
        registry.username = resolver
            .string(
                self.username,
                &source!(
                    "registry.username",
                    "registry/username",
                    ["PARAMETER_USERNAME", "REGISTRY_USERNAME", "DOCKER_USERNAME"]
                ),
            )
            .unwrap_or_default();
        registry.password = resolver
            .string(
                self.password,
                &source!(
                    "registry.password",
                    "registry/password",
                    ["PARAMETER_PASSWORD", "REGISTRY_PASSWORD", "DOCKER_PASSWORD"]
                ),
            )
            .unwrap_or_default();
        registry.dry_run = resolver
            .flag(
                self.dry_run,
                &source!(
                    "registry.dry-run",
                    "registry/dry_run",
                    ["PARAMETER_DRY_RUN", "REGISTRY_DRY_RUN"]
                ),
            )?
            .unwrap_or_default();
        Ok(registry)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Manifest")]
pub struct ManifestArgs {
    /// Fat manifest as JSON, e.g. `{"name": "repo:1", "images": [{"name": "repo:1-amd64"}]}`.
    #[arg(long = "manifest.spec")]
    spec: Option<String>,
}

impl ManifestArgs {
    pub fn resolve(self, resolver: &Resolver) -> Manifest {
        Manifest {
            raw: resolver
                .string(
                    self.spec,
                    &source!(
                        "manifest.spec",
                        "manifest/spec",
                        ["PARAMETER_MANIFEST", "DOCKER_MANIFEST"]
                    ),
                )
                .unwrap_or_default(),
            ..Default::default()
        }
    }
}
