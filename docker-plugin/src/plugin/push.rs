use log::trace;

use crate::{
    docker::docker,
    error::Result,
    process::{Command, Runner},
};

/// Settings for `docker push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    /// Skip image signing.
    pub disable_content_trust: bool,
}

impl Default for Push {
    fn default() -> Self {
        Self {
            disable_content_trust: true,
        }
    }
}

impl Push {
    pub fn command(&self, tag: &str) -> Command {
        let mut command = docker!("push");
        if self.disable_content_trust {
            command = command.arg("--disable-content-trust");
        }
        command.arg(tag)
    }

    /// Pushes each tag in turn, stopping at the first failure.
    pub fn exec<I>(&self, runner: &dyn Runner, tags: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        trace!("running push with provided configuration");

        for tag in tags {
            runner.run(&self.command(tag.as_ref()))?;
        }
        Ok(())
    }
}
