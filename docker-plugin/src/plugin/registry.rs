use std::{fmt, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{info, trace};

use crate::{
    docker::docker,
    error::{Error, Result, ValidationError},
    process::{Command, Runner, SECRET_MASK},
    storage::Storage,
};

/// Where docker looks for registry credentials.
pub const CONFIG_PATH: &str = "/root/.docker/config.json";

pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Credentials for the registry images are published to.
pub struct Registry {
    pub name: String,
    pub username: String,
    pub password: String,
    /// Build without publishing, credentials become optional.
    pub dry_run: bool,
    storage: Box<dyn Storage>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &SECRET_MASK)
            .field("dry_run", &self.dry_run)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Registry {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            name: DEFAULT_REGISTRY.to_owned(),
            username: String::new(),
            password: String::new(),
            dry_run: false,
            storage: Box::new(storage),
        }
    }

    pub fn validate(&self) -> Result<()> {
        trace!("validating registry configuration");

        if self.name.is_empty() {
            return Err(ValidationError::NoRegistryName.into());
        }
        if self.dry_run {
            return Ok(());
        }
        if self.username.is_empty() {
            return Err(ValidationError::NoRegistryUsername.into());
        }
        if self.password.is_empty() {
            return Err(ValidationError::NoRegistryPassword.into());
        }
        Ok(())
    }

    fn config(&self) -> String {
        let auth = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let config = serde_json::json!({
            "auths": {
                self.name.as_str(): { "auth": auth },
            },
        });
        format!("{config:#}")
    }

    /// Writes the docker client configuration holding the credentials, replacing any previous one.
    pub fn write(&self) -> Result<()> {
        trace!("writing registry credentials to {CONFIG_PATH}");

        let path = Path::new(CONFIG_PATH);
        self.storage
            .write(path, self.config().as_bytes())
            .map_err(|source| Error::Filesystem {
                path: path.to_owned(),
                source,
            })
    }

    pub fn login_command(&self) -> Command {
        docker!(
            "login",
            "--password",
            &self.password,
            "--username",
            &self.username,
            &self.name
        )
        .mask(&self.password)
    }

    pub fn login(&self, runner: &dyn Runner) -> Result<()> {
        if self.dry_run {
            info!("registry dry run enabled, skipping login to {}", self.name);
            return Ok(());
        }
        runner.run(&self.login_command())?;
        Ok(())
    }
}
