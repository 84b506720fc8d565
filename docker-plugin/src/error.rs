use std::{fmt, io, path::PathBuf};

use crate::process;

/// A required setting that was not provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    NoTags,
    NoContext,
    NoRegistryName,
    NoRegistryUsername,
    NoRegistryPassword,
    NoManifestName,
    NoManifestImages,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationError::NoTags => "no build tags provided",
            ValidationError::NoContext => "no build context provided",
            ValidationError::NoRegistryName => "no registry name provided",
            ValidationError::NoRegistryUsername => "no registry username provided",
            ValidationError::NoRegistryPassword => "no registry password provided",
            ValidationError::NoManifestName => "cannot create a fat manifest without a name",
            ValidationError::NoManifestImages => {
                "cannot create a fat manifest without including the images to be included"
            }
        })
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum Error {
    /// A setting holds a value that can not be interpreted.
    Config {
        setting: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    Validation(ValidationError),
    /// A step was asked to run although its configuration did not validate.
    Ineligible {
        step: &'static str,
        reason: String,
    },
    Exec(process::Error),
    Filesystem {
        path: PathBuf,
        source: io::Error,
    },
    /// Neither an image build nor a manifest is configured correctly.
    NothingToDo {
        build: String,
        manifest: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config { setting, source } => {
                write!(f, "invalid value for `{setting}`: {source}")
            }
            Error::Validation(error) => error.fmt(f),
            Error::Ineligible { step, reason } => {
                write!(f, "the {step} step can not run because its configuration is invalid: {reason}")
            }
            Error::Exec(error) => error.fmt(f),
            Error::Filesystem { path, source } => {
                write!(f, "failed to write {path}: {source}", path = path.display())
            }
            Error::NothingToDo { build, manifest } => write!(
                f,
                "nothing to do, provide a valid build or manifest configuration (build: {build}; manifest: {manifest})"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config { source, .. } => Some(source.as_ref()),
            Error::Validation(error) => Some(error),
            Error::Exec(error) => Some(error),
            Error::Filesystem { source, .. } => Some(source),
            Error::Ineligible { .. } | Error::NothingToDo { .. } => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Error::Validation(error)
    }
}

impl From<process::Error> for Error {
    fn from(error: process::Error) -> Self {
        Error::Exec(error)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
