//! Process environment
//!
//! The [`ProcEnv`] is the only way a program body touches the system:
//! identity queries, `fork`, `exec`, `wait`, `exit` and console output.
//!
//! `exec` and `exit` end the body. They return a [`Signal`] which the body
//! passes back as `Err`. Once either has succeeded the handle is spent:
//! later `fork`, `exec`, `wait` and `exit` calls fail with
//! [`ProcError::Ended`], `print` and `sleep` do nothing, and the run loop
//! acts on the recorded exit or exec whatever the body goes on to return.
//!
//! ```rust
//! use osim_proc::{ProcEnv, ProcResult};
//!
//! fn hello(env: &mut ProcEnv) -> ProcResult {
//!     env.print(format!("[pid {}] hello", env.getpid()));
//!     Err(env.exit(0))
//! }
//! # let _ = hello;
//! ```

use crate::process::ProcessState;
use crate::runner::{self, Machine};
use crate::{Pid, ProcError, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Program name plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub program: String,
    pub args: Vec<String>,
}

impl Image {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Control transfer out of a program body
#[derive(Debug)]
#[must_use = "a signal ends the program body and must be returned as `Err`"]
pub enum Signal {
    /// Re-enter the run loop with a new image; the table is already updated
    Exec(Image),

    /// Terminate with this exit code; the table is already updated
    Exit(i32),

    /// Unexpected failure; the run loop exits the process with code 1
    Fault(ProcError),
}

impl From<ProcError> for Signal {
    fn from(err: ProcError) -> Self {
        Signal::Fault(err)
    }
}

/// How a body ended its program, recorded by the first successful
/// `exit` or `exec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ended {
    Exit(i32),
    Exec(Image),
}

/// Result of running a program body
///
/// `Ok(())` is a normal return, which leaves the exit code unset.
pub type ProcResult = core::result::Result<(), Signal>;

/// System-call handle for one process
pub struct ProcEnv {
    pid: Pid,
    machine: Arc<Machine>,

    /// `Some(0)` inside a forked child until it execs
    fork_return: Option<Pid>,

    ended: Option<Ended>,
}

impl ProcEnv {
    pub(crate) fn new(pid: Pid, machine: Arc<Machine>, fork_return: Option<Pid>) -> Self {
        Self { pid, machine, fork_return, ended: None }
    }

    /// Clear and return the recorded `exit`/`exec`
    pub(crate) fn take_ended(&mut self) -> Option<Ended> {
        self.ended.take()
    }

    /// True once `exit` or `exec` has succeeded on this handle
    pub fn has_ended(&self) -> bool {
        self.ended.is_some()
    }

    fn ensure_live(&self) -> Result<()> {
        match self.ended {
            Some(_) => Err(ProcError::Ended { pid: self.pid }),
            None => Ok(()),
        }
    }

    pub fn getpid(&self) -> Pid {
        self.pid
    }

    pub fn getppid(&self) -> Pid {
        self.machine.table.ppid(self.pid).unwrap_or(0)
    }

    /// Current program name
    pub fn program(&self) -> String {
        self.machine
            .table
            .image(self.pid)
            .map(|image| image.program)
            .unwrap_or_default()
    }

    /// Current arguments
    pub fn args(&self) -> Vec<String> {
        self.machine
            .table
            .image(self.pid)
            .map(|image| image.args)
            .unwrap_or_default()
    }

    /// Parse argument `index`, falling back to `default` when absent
    ///
    /// # Errors
    /// [`ProcError::InvalidArgument`] when the argument does not parse.
    pub fn arg_or<T: FromStr>(&self, index: usize, default: T) -> Result<T> {
        let image = self.machine.table.image(self.pid)?;
        match image.args.get(index) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ProcError::InvalidArgument {
                program: image.program.clone(),
                reason: format!("argument {} `{raw}` is not valid", index + 1),
            }),
        }
    }

    /// `Some(0)` when running as a freshly forked child, `None` otherwise
    pub fn fork_return_value(&self) -> Option<Pid> {
        self.fork_return
    }

    /// Create a child running a copy of this process's current image
    ///
    /// The child runs on its own thread and observes
    /// [`fork_return_value`](Self::fork_return_value) `== Some(0)`. The caller
    /// is not blocked and sees no discriminator.
    pub fn fork(&mut self) -> Result<Pid> {
        self.ensure_live()?;
        let child = self.machine.table.fork(self.pid)?;
        log::info!("[proc] {} forked child {child}", self.pid);
        runner::launch(&self.machine, child, Some(0))?;
        Ok(child)
    }

    /// Replace this process's image; never returns to the body
    ///
    /// On success the table holds the new image and [`Signal::Exec`] is
    /// returned. An unregistered program yields [`Signal::Fault`] with
    /// [`ProcError::ProgramNotFound`] and leaves the image unchanged.
    pub fn exec<I, S>(&mut self, program: &str, args: I) -> Signal
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Err(err) = self.ensure_live() {
            return Signal::Fault(err);
        }
        if !self.machine.registry.contains(program) {
            return Signal::Fault(ProcError::ProgramNotFound { name: program.to_string() });
        }

        let image = Image::new(program, args);
        if let Err(err) = self.machine.table.set_image(self.pid, image.clone()) {
            return Signal::Fault(err);
        }
        self.fork_return = None;
        self.ended = Some(Ended::Exec(image.clone()));
        log::info!("[proc] {} exec {} {:?}", self.pid, image.program, image.args);
        Signal::Exec(image)
    }

    /// Block until `child` exits and return its exit code
    ///
    /// # Errors
    /// [`ProcError::NotAChild`] if `child` was not forked or spawned by this
    /// process.
    pub fn wait(&mut self, child: Pid) -> Result<i32> {
        self.ensure_live()?;
        let table = &self.machine.table;
        if !table.is_child(self.pid, child)? {
            return Err(ProcError::NotAChild { pid: self.pid, child });
        }

        let blocked = table.transition(self.pid, ProcessState::Running, ProcessState::Blocked)?;
        let waited = table.wait_for_exit(child, None);
        if blocked {
            table.transition(self.pid, ProcessState::Blocked, ProcessState::Running)?;
        }

        Ok(waited?.unwrap_or(0))
    }

    /// Record `code`, mark EXITED and wake waiters; never returns to the body
    pub fn exit(&mut self, code: i32) -> Signal {
        if let Err(err) = self.ensure_live() {
            return Signal::Fault(err);
        }
        match self.machine.table.finish(self.pid, Some(code)) {
            Ok(()) => {
                self.ended = Some(Ended::Exit(code));
                log::info!("[proc] {} exit {code}", self.pid);
                Signal::Exit(code)
            }
            Err(err) => Signal::Fault(err),
        }
    }

    /// Send one line to the simulator console
    pub fn print(&self, line: impl Into<String>) {
        if self.has_ended() {
            return;
        }
        // A dropped console only loses output
        let _ = self.machine.console.send(line.into());
    }

    pub fn sleep(&self, duration: Duration) {
        if !self.has_ended() {
            std::thread::sleep(duration);
        }
    }
}

impl std::fmt::Debug for ProcEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcEnv")
            .field("pid", &self.pid)
            .field("fork_return", &self.fork_return)
            .field("ended", &self.ended)
            .finish()
    }
}
