//! Test doubles for the [`Runner`] and [`Storage`] seams.

use std::{
    cell::RefCell,
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    process::{Child, Command, Error, ErrorKind, Result, Runner},
    storage::Storage,
};

type Predicate = Box<dyn Fn(&Command) -> bool>;

/// Records every command instead of running it. Commands matching the failure predicate exit with
/// a non-zero status.
#[derive(Default)]
pub struct RecordingRunner {
    commands: RefCell<Vec<Command>>,
    spawned: RefCell<Vec<Command>>,
    fail_when: Option<Predicate>,
}

impl RecordingRunner {
    pub fn failing_when(predicate: impl Fn(&Command) -> bool + 'static) -> Self {
        Self {
            fail_when: Some(Box::new(predicate)),
            ..Default::default()
        }
    }

    /// The displayed (and therefore masked) command lines run so far.
    pub fn lines(&self) -> Vec<String> {
        self.commands.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.spawned.borrow().iter().map(ToString::to_string).collect()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, command: &Command) -> Result<()> {
        self.commands.borrow_mut().push(command.clone());
        match &self.fail_when {
            Some(predicate) if predicate(command) => Err(Error {
                command: command.clone(),
                kind: ErrorKind::NonZeroExitStatus(std::num::NonZeroI32::new(1)),
            }),
            _ => Ok(()),
        }
    }

    fn spawn(&self, command: &Command) -> Result<Child> {
        self.spawned.borrow_mut().push(command.clone());
        Ok(Child::detached(command.clone()))
    }
}

/// Keeps written files in memory. Clones share the same files.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: Rc<RefCell<HashMap<PathBuf, Vec<u8>>>>,
    read_only: bool,
}

impl MemoryStorage {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file system",
            ));
        }
        self.files
            .borrow_mut()
            .insert(path.to_owned(), contents.to_owned());
        Ok(())
    }
}
