//! Resolution of plugin settings from the pipeline environment.
//!
//! Every setting can be provided in several places. The first non-empty value wins, in the
//! following order:
//!
//! 1. the command line flag,
//! 2. each environment variable listed for the setting, in order,
//! 3. the parameter file under [`PARAMETERS_DIR`],
//! 4. the secret file under [`SECRETS_DIR`].

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::{trace, warn};

use crate::error::{Error, Result};

pub const PARAMETERS_DIR: &str = "/vela/parameters/docker";
pub const SECRETS_DIR: &str = "/vela/secrets/docker";

/// Where a setting may be read from when its flag is absent.
#[derive(Debug, Clone, Copy)]
pub struct Source {
    /// The flag name, used in error messages.
    pub name: &'static str,
    pub env: &'static [&'static str],
    /// Path relative to the parameter and secret directories.
    pub file: &'static str,
}

/// Creates a [`Source`] from a flag name, a file path and a list of environment variables.
macro_rules! source {
    ($name:literal, $file:literal, [$($env:literal),+ $(,)?]) => {
        $crate::config::Source {
            name: $name,
            env: &[$($env),+],
            file: $file,
        }
    };
}

pub(crate) use source;

#[derive(Debug)]
struct InvalidBool(String);

impl fmt::Display for InvalidBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a boolean but got {:?}", self.0)
    }
}

impl std::error::Error for InvalidBool {}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

/// A snapshot of the environment variables plus the directories holding parameter and secret
/// files.
#[derive(Debug)]
pub struct Resolver {
    vars: HashMap<String, String>,
    dirs: Vec<PathBuf>,
}

impl Resolver {
    pub fn new<V, D>(vars: V, dirs: D) -> Self
    where
        V: IntoIterator<Item = (String, String)>,
        D: IntoIterator,
        D::Item: Into<PathBuf>,
    {
        Self {
            vars: vars.into_iter().collect(),
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::vars(), [PARAMETERS_DIR, SECRETS_DIR])
    }

    /// Returns the value of the environment variable if it is set and not blank.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn read(path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(contents) => non_empty(contents.trim().to_owned()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => {
                warn!("ignoring {path}: {error}", path = path.display());
                None
            }
        }
    }

    fn lookup(&self, source: &Source) -> Option<String> {
        for key in source.env {
            if let Some(value) = self.var(key) {
                trace!("{name} set by ${key}", name = source.name);
                return Some(value.to_owned());
            }
        }

        for dir in &self.dirs {
            let path = dir.join(source.file);
            if let Some(value) = Self::read(&path) {
                trace!("{name} set by {path}", name = source.name, path = path.display());
                return Some(value);
            }
        }

        None
    }

    pub fn string(&self, flag: Option<String>, source: &Source) -> Option<String> {
        flag.and_then(non_empty).or_else(|| self.lookup(source))
    }

    /// Values from the environment or files are comma separated.
    pub fn list(&self, flag: Option<Vec<String>>, source: &Source) -> Vec<String> {
        self.split(flag, source, ',')
    }

    /// Like [`Resolver::list`], but values from the environment or files hold one item per line.
    /// For items that contain commas themselves, such as `id=mysecret,src=/local/secret`.
    pub fn lines(&self, flag: Option<Vec<String>>, source: &Source) -> Vec<String> {
        self.split(flag, source, '\n')
    }

    fn split(&self, flag: Option<Vec<String>>, source: &Source, separator: char) -> Vec<String> {
        match flag.filter(|values| !values.is_empty()) {
            Some(values) => values,
            None => self
                .lookup(source)
                .map(|value| {
                    value
                        .split(separator)
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn flag(&self, flag: Option<bool>, source: &Source) -> Result<Option<bool>> {
        if flag.is_some() {
            return Ok(flag);
        }
        self.lookup(source)
            .map(|value| {
                parse_bool(&value).ok_or_else(|| Error::Config {
                    setting: source.name,
                    source: InvalidBool(value).into(),
                })
            })
            .transpose()
    }

    pub fn number<T>(&self, flag: Option<T>, source: &Source) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        if flag.is_some() {
            return Ok(flag);
        }
        self.lookup(source)
            .map(|value| {
                value.trim().parse().map_err(|error: T::Err| Error::Config {
                    setting: source.name,
                    source: error.into(),
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: Source = source!("build.tags", "build/tags", ["PARAMETER_TAGS", "DOCKER_TAGS"]);
    const PULL: Source = source!("build.pull", "build/pull", ["PARAMETER_PULL"]);
    const SECRETS: Source = source!("build.secrets", "build/secrets", ["PARAMETER_SECRETS"]);

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_flag_wins_over_environment() {
        let resolver = Resolver::new(vars(&[("PARAMETER_TAGS", "a,b")]), Vec::<PathBuf>::new());
        assert_eq!(resolver.list(Some(vec!["c".to_owned()]), &TAGS), ["c"]);
    }

    #[test]
    fn test_environment_in_listed_order() {
        let resolver = Resolver::new(
            vars(&[("PARAMETER_TAGS", " "), ("DOCKER_TAGS", "latest, 1.0 ,")]),
            Vec::<PathBuf>::new(),
        );
        assert_eq!(resolver.list(None, &TAGS), ["latest", "1.0"]);
    }

    #[test]
    fn test_parameter_file_before_secret_file() {
        let parameters = tempfile::tempdir().unwrap();
        let secrets = tempfile::tempdir().unwrap();
        fs::create_dir_all(parameters.path().join("build")).unwrap();
        fs::create_dir_all(secrets.path().join("build")).unwrap();
        fs::write(secrets.path().join("build/tags"), "from-secret").unwrap();

        let resolver = Resolver::new(vars(&[]), [parameters.path(), secrets.path()]);
        assert_eq!(resolver.list(None, &TAGS), ["from-secret"]);

        fs::write(parameters.path().join("build/tags"), "from-parameter\n").unwrap();
        assert_eq!(resolver.list(None, &TAGS), ["from-parameter"]);
    }

    #[test]
    fn test_lines_keep_commas() {
        let resolver = Resolver::new(
            vars(&[(
                "PARAMETER_SECRETS",
                "id=mysecret,src=/local/secret\r\n\nid=other,src=/local/other\n",
            )]),
            Vec::<PathBuf>::new(),
        );
        assert_eq!(
            resolver.lines(None, &SECRETS),
            ["id=mysecret,src=/local/secret", "id=other,src=/local/other"]
        );
        assert_eq!(
            resolver.lines(Some(vec!["id=a,src=b".to_owned()]), &SECRETS),
            ["id=a,src=b"]
        );
    }

    #[test]
    fn test_lines_from_file() {
        let parameters = tempfile::tempdir().unwrap();
        fs::create_dir_all(parameters.path().join("build")).unwrap();
        fs::write(
            parameters.path().join("build/secrets"),
            "id=mysecret,src=/local/secret\n",
        )
        .unwrap();

        let resolver = Resolver::new(vars(&[]), [parameters.path()]);
        assert_eq!(
            resolver.lines(None, &SECRETS),
            ["id=mysecret,src=/local/secret"]
        );
    }

    #[test]
    fn test_missing_everywhere() {
        let resolver = Resolver::new(vars(&[]), ["/does/not/exist"]);
        assert_eq!(resolver.string(None, &TAGS), None);
        assert_eq!(resolver.string(Some(String::new()), &TAGS), None);
        assert!(resolver.list(None, &TAGS).is_empty());
        assert_eq!(resolver.flag(None, &PULL).unwrap(), None);
    }

    #[test]
    fn test_flag_parsing() {
        let resolver = Resolver::new(vars(&[("PARAMETER_PULL", "TRUE")]), Vec::<PathBuf>::new());
        assert_eq!(resolver.flag(None, &PULL).unwrap(), Some(true));
        assert_eq!(resolver.flag(Some(false), &PULL).unwrap(), Some(false));

        let resolver = Resolver::new(vars(&[("PARAMETER_PULL", "maybe")]), Vec::<PathBuf>::new());
        let error = resolver.flag(None, &PULL).unwrap_err();
        assert!(error.to_string().contains("build.pull"));
    }

    #[test]
    fn test_number_parsing() {
        const TIMEOUT: Source = source!("timeout", "timeout", ["PARAMETER_TIMEOUT"]);

        let resolver = Resolver::new(vars(&[("PARAMETER_TIMEOUT", "90")]), Vec::<PathBuf>::new());
        assert_eq!(resolver.number::<u64>(None, &TIMEOUT).unwrap(), Some(90));

        let resolver = Resolver::new(vars(&[("PARAMETER_TIMEOUT", "soon")]), Vec::<PathBuf>::new());
        assert!(resolver.number::<u64>(None, &TIMEOUT).is_err());
    }
}
