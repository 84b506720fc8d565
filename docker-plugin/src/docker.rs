use constcat::concat;

use crate::process::{self, Command};

/// Where the plugin image installs the container tooling.
pub const BIN_DIR: &str = "/usr/local/bin";

pub const DOCKER: &str = concat!(BIN_DIR, "/docker");
pub const DOCKERD: &str = concat!(BIN_DIR, "/dockerd");
pub const ROOTLESSKIT: &str = concat!(BIN_DIR, "/rootlesskit");

/// Returns a `docker` client command with the given subcommand and arguments.
macro_rules! docker {
    ($($arg:expr),+ $(,)?) => {
        $crate::process::command!($crate::docker::DOCKER, $($arg),+)
    };
}

pub(crate) use docker;

/// Prints the client and server version. Also tells whether the daemon is ready.
pub fn version() -> Command {
    docker!("version")
}

/// Prints system-wide information, useful when troubleshooting a pipeline.
pub fn info() -> Command {
    process::args!(Command::new(DOCKER), "info")
}
