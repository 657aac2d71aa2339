//! Instruction Scheduler - deterministic cooperative thread simulator
//!
//! # Purpose
//! Executes symbolic thread instruction streams against simulated mutexes and
//! semaphores so that races, mutual exclusion and producer/consumer
//! coordination can be observed tick by tick.
//!
//! # Architecture
//! A single host thread drives the dispatch loop. Simulated threads live in
//! an arena owned by the [`Cpu`]; the ready queue, the blocking primitives and
//! the trace only hold [`ThreadId`] handles into it. Exactly one instruction
//! is executed per dispatch and every dispatch costs one tick.
//!
//! - `objects`: simulated threads and the blocking primitives they use
//! - `scheduler`: clock, ready queue and the dispatch loop
//! - `trace`: tick-stamped record of every transition
//! - `scenario`: TOML scenario loading
//! - `demos`: canned race / mutex / semaphore / producer-consumer runs
//!
//! # Testing Strategy
//! - Unit tests: primitive transitions, dispatch rules, instruction parsing
//! - Integration tests: lost-update and producer/consumer properties

pub mod demos;
pub mod instruction;
pub mod objects;
pub mod scenario;
pub mod scheduler;
pub mod trace;

pub use instruction::Instruction;
pub use objects::{Mutex, MutexId, Semaphore, SemaphoreId, SimThread, ThreadId, ThreadState};
pub use scenario::Scenario;
pub use scheduler::{Cpu, RunOutcome, RunReport, Scheduler, SchedulerConfig};
pub use trace::{EventKind, Trace, TraceEvent};

use thiserror::Error;

/// Error types for scheduler operations
#[derive(Debug, Error)]
pub enum SimError {
    #[error("{tid} tried to release mutex {mutex} but is not owner")]
    NotOwner { tid: String, mutex: String },

    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),

    #[error("Instruction {op} requires an operand")]
    MissingOperand { op: String },

    #[error("Unknown mutex: {0}")]
    UnknownMutex(String),

    #[error("Unknown semaphore: {0}")]
    UnknownSemaphore(String),

    #[error("Semaphore {0} would exceed its maximum value")]
    SemaphoreOverflow(String),

    #[error("Thread {0} already admitted")]
    DuplicateThread(String),

    #[error("Primitive {0} already declared")]
    DuplicatePrimitive(String),

    #[error("Scheduler already ran; simulations are not resumable")]
    Halted,

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, SimError>;
