use std::{
    borrow::Cow,
    fmt, io,
    num::NonZeroI32,
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread, time,
};

use log::{debug, warn};

/// Substituted for every registered secret when a command is displayed.
pub const SECRET_MASK: &str = "***";

/// How often a running child is checked for exit and cancellation.
const WAIT_INTERVAL: time::Duration = time::Duration::from_millis(100);

/// An external command line. Unlike [`std::process::Command`] this is a plain value, so it can be
/// compared in tests and displayed without leaking the secrets registered through
/// [`Command::mask`].
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    secrets: Vec<String>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{self}`")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", self.masked(arg))?;
        }
        Ok(())
    }
}

impl Command {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Hides `secret` behind [`SECRET_MASK`] wherever the command is displayed.
    pub fn mask(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret.to_owned());
        }
        self
    }

    pub fn get_program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn masked<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let mut value = Cow::Borrowed(value);
        for secret in &self.secrets {
            if value.contains(secret.as_str()) {
                value = Cow::Owned(value.replace(secret.as_str(), SECRET_MASK));
            }
        }
        value
    }

    fn to_std(&self) -> process::Command {
        let mut command = process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(process::Stdio::null())
            .stdout(process::Stdio::inherit())
            .stderr(process::Stdio::inherit());
        command
    }
}

/// Why a running command was stopped before it exited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    DeadlineExceeded,
    Interrupted,
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stop::DeadlineExceeded => f.write_str("the plugin timeout was exceeded"),
            Stop::Interrupted => f.write_str("the plugin was interrupted"),
        }
    }
}

/// Shared cancellation state for every command the plugin runs. Trips when the optional deadline
/// passes or when [`Cancel::interrupt`] is called, typically from a signal handler.
#[derive(Debug, Clone)]
pub struct Cancel {
    deadline: Option<time::Instant>,
    interrupted: Arc<AtomicBool>,
}

impl Cancel {
    pub fn never() -> Self {
        Self {
            deadline: None,
            interrupted: Arc::default(),
        }
    }

    /// Create a token that trips once `timeout` has elapsed, if any. A timeout too far in the
    /// future to be represented never trips.
    pub fn after(timeout: Option<time::Duration>) -> Self {
        Self {
            deadline: timeout.and_then(|timeout| time::Instant::now().checked_add(timeout)),
            ..Self::never()
        }
    }

    /// Interrupt on SIGINT, SIGTERM and SIGHUP.
    pub fn on_termination(self) -> Result<Self, ctrlc::Error> {
        let cancel = self.clone();
        ctrlc::set_handler(move || cancel.interrupt())?;
        Ok(self)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn check(&self) -> Option<Stop> {
        if self.interrupted.load(Ordering::SeqCst) {
            Some(Stop::Interrupted)
        } else if self
            .deadline
            .is_some_and(|deadline| time::Instant::now() >= deadline)
        {
            Some(Stop::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Sleeps for `duration` unless the token trips first.
    pub fn sleep(&self, duration: time::Duration) -> Result<(), Stop> {
        let wake = time::Instant::now() + duration;
        loop {
            if let Some(stop) = self.check() {
                return Err(stop);
            }
            let now = time::Instant::now();
            if now >= wake {
                return Ok(());
            }
            thread::sleep(WAIT_INTERVAL.min(wake - now));
        }
    }
}

/// A command started in the background.
#[derive(Debug)]
pub struct Child {
    command: Command,
    process: Option<process::Child>,
}

impl Child {
    /// A handle without an operating system process behind it.
    #[cfg(test)]
    pub(crate) fn detached(command: Command) -> Self {
        Self {
            command,
            process: None,
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.process.as_ref().map(process::Child::id)
    }
}

/// Executes external commands.
pub trait Runner {
    /// Runs the command to completion, streaming its output to ours.
    fn run(&self, command: &Command) -> Result<()>;

    /// Starts the command and returns without waiting for it to exit.
    fn spawn(&self, command: &Command) -> Result<Child>;
}

/// Runs commands on the host, echoing each command line before it starts.
pub struct System {
    cancel: Cancel,
}

impl System {
    pub fn new(cancel: Cancel) -> Self {
        Self { cancel }
    }

    fn start(&self, command: &Command) -> Result<process::Child> {
        if let Some(stop) = self.cancel.check() {
            return Err(Error {
                command: command.clone(),
                kind: ErrorKind::Cancelled(stop),
            });
        }

        debug!("running {command:?}...");
        println!("$ {command}");

        command.to_std().spawn().map_err(|error| Error {
            command: command.clone(),
            kind: error.into(),
        })
    }
}

impl Runner for System {
    fn run(&self, command: &Command) -> Result<()> {
        let mut child = self.start(command)?;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return require_success(command, status),
                Ok(None) => {}
                Err(error) => {
                    return Err(Error {
                        command: command.clone(),
                        kind: error.into(),
                    })
                }
            }

            if let Some(stop) = self.cancel.check() {
                warn!("stopping {command:?}: {stop}");
                // The child may have exited in the meantime, reaping it below covers both cases.
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error {
                    command: command.clone(),
                    kind: ErrorKind::Cancelled(stop),
                });
            }

            thread::sleep(WAIT_INTERVAL);
        }
    }

    fn spawn(&self, command: &Command) -> Result<Child> {
        let process = self.start(command)?;
        Ok(Child {
            command: command.clone(),
            process: Some(process),
        })
    }
}

pub fn require_success(command: &Command, status: process::ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error {
            command: command.clone(),
            kind: ErrorKind::NonZeroExitStatus(status.code().and_then(NonZeroI32::new)),
        })
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::Error),
    NonZeroExitStatus(Option<NonZeroI32>),
    Cancelled(Stop),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to run `{command}`: ", command = &self.command)?;
        let program = self.command.get_program();
        match &self.kind {
            ErrorKind::NotFound => {
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(error) => write!(f, "{error}"),
            ErrorKind::NonZeroExitStatus(code) => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")
                } else {
                    write!(f, "did not run succesfully")
                }
            }
            ErrorKind::Cancelled(stop) => write!(f, "{stop}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::Into::into`] on each.
macro_rules! command {
    ($program:expr $(, $arg:expr)* $(,)?) => {
        $crate::process::Command::new($program)$(.arg($arg))*
    };
}

/// Calls [`Command::arg`] on the provided [`Command`] for each argument.
macro_rules! args {
    ($command:expr, $($arg:expr),+ $(,)?) => {
        $command$(.arg($arg))+
    }
}

pub(crate) use args;
pub(crate) use command;
