//! Process Simulator - fork/exec/wait/exit over host threads
//!
//! # Purpose
//! Models the process-control system calls of a small OS. Every simulated
//! process runs its program body on its own host thread, so the process
//! table and pid allocator are genuinely shared state.
//!
//! # Integration Points
//! - Depends on: a [`ProgramRegistry`] built once at startup
//! - Provides to: front ends (`osim proc ...`), tests
//! - Output: console lines over a channel, `ps`/`tree` snapshots
//!
//! # Architecture
//! - `table`: one lock-protected map from pid to [`Process`]; each entry
//!   carries a condition variable broadcast when the process exits
//! - `registry`: immutable name → program lookup shared by every unit
//! - `env`: the [`ProcEnv`] handle a program body uses for system calls
//! - `runner`: per-process run loop; turns `exec`, `exit`, faults and
//!   panics into table updates
//! - `simulator`: driver facade (spawn, wait, ps, tree, attach)
//! - `programs`: built-in demo programs
//!
//! `exec` and `exit` never return to the program body. They produce a
//! [`Signal`] that the body hands back as `Err`, and the run loop acts on it.
//! The [`ProcEnv`] is spent from that point, so a body that ignores the
//! signal can no longer fork, wait, exec or print.
//!
//! # Testing Strategy
//! - Unit tests: table transitions, registry, argument parsing
//! - Integration tests: fork/wait ordering, exec, crash conversion, timeouts

pub mod env;
pub mod process;
pub mod programs;
pub mod registry;
mod runner;
pub mod simulator;
pub mod table;

pub use env::{Image, ProcEnv, ProcResult, Signal};
pub use process::{Process, ProcessInfo, ProcessState, TreeLine};
pub use registry::{Program, ProgramRegistry, RegistryBuilder};
pub use simulator::{ProcConfig, Simulator};
pub use table::ProcessTable;

use thiserror::Error;

/// Process identifier
pub type Pid = usize;

/// Reserved init process; never runs a body
pub const INIT_PID: Pid = 1;

/// Default first pid handed to user processes
pub const DEFAULT_FIRST_PID: Pid = 100;

/// Error types for process operations
#[derive(Debug, Error)]
pub enum ProcError {
    #[error("program '{name}' not found")]
    ProgramNotFound { name: String },

    #[error("pid {child} is not a child of {pid}")]
    NotAChild { pid: Pid, child: Pid },

    #[error("no such process: {pid}")]
    NoSuchProcess { pid: Pid },

    #[error("program '{name}' already registered")]
    DuplicateProgram { name: String },

    #[error("{program}: {reason}")]
    InvalidArgument { program: String, reason: String },

    #[error("process {pid} already left its program via exit or exec")]
    Ended { pid: Pid },

    #[error("{0}")]
    Crashed(String),

    #[error("failed to start process thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, ProcError>;
