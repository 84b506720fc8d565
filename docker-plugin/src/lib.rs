pub(crate) mod config;
pub(crate) mod docker;
pub(crate) mod error;
pub(crate) mod plugin;
pub(crate) mod process;
pub(crate) mod storage;
pub(crate) mod version;

pub mod cli;

pub use config::Resolver;

#[cfg(test)]
mod testing;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
