use std::{fmt, fs, io, path::Path};

/// Somewhere files can be written to.
pub trait Storage: fmt::Debug {
    /// Replaces the contents of the file at `path`, creating it and its parent directories if
    /// necessary.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// The host file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct Os;

impl Storage for Os {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docker").join("config.json");

        Os.write(&path, b"{}").unwrap();
        Os.write(&path, b"{\"auths\": {}}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"auths\": {}}");
    }
}
