//! Process control block

use crate::Pid;
use core::fmt;
use parking_lot::Condvar;
use std::sync::Arc;

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, body not started yet
    Ready,
    Running,
    /// Inside `wait`
    Blocked,
    Exited,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Blocked => "BLOCKED",
            ProcessState::Exited => "EXITED",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Process table entry
///
/// Lives inside the [`crate::ProcessTable`] lock. `program`/`args` are
/// replaced in place by `exec`; the pid never changes.
#[derive(Debug)]
pub struct Process {
    pub(crate) pid: Pid,
    pub(crate) ppid: Pid,
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) state: ProcessState,

    /// `None` until set by `exit` or a failure; waiters read it as 0
    pub(crate) exit_code: Option<i32>,
    pub(crate) children: Vec<Pid>,

    /// Broadcast once the process reaches EXITED
    pub(crate) exited: Arc<Condvar>,
}

impl Process {
    pub(crate) fn new(pid: Pid, ppid: Pid, program: String, args: Vec<String>) -> Self {
        Self {
            pid,
            ppid,
            program,
            args,
            state: ProcessState::Ready,
            exit_code: None,
            children: Vec::new(),
            exited: Arc::new(Condvar::new()),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn ppid(&self) -> Pid {
        self.ppid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn children(&self) -> &[Pid] {
        &self.children
    }

    /// Owned copy for use outside the table lock
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            ppid: self.ppid,
            program: self.program.clone(),
            args: self.args.clone(),
            state: self.state,
            exit_code: self.exit_code,
            children: self.children.clone(),
        }
    }
}

/// Snapshot of one process, as listed by `ps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Pid,
    pub program: String,
    pub args: Vec<String>,
    pub state: ProcessState,
    pub exit_code: Option<i32>,
    pub children: Vec<Pid>,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID {:4} PPID {:4} STATE {:7} PROG {} ARGS {:?} EXIT ",
            self.pid, self.ppid, self.state, self.program, self.args
        )?;
        match self.exit_code {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("-"),
        }
    }
}

/// One line of the process tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    /// Distance from a root (a process whose ppid is 0)
    pub depth: usize,
    pub pid: Pid,
    pub program: String,
    pub state: ProcessState,
}

impl fmt::Display for TreeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} ({}) [{}]",
            "",
            self.pid,
            self.program,
            self.state,
            indent = self.depth * 2
        )
    }
}
