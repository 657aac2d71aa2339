//! Simulated Objects
//!
//! The things instructions act on:
//!
//! - **SimThread**: a named instruction stream with a lifecycle state
//! - **Mutex**: single owner plus FIFO wait queue
//! - **Semaphore**: counter plus FIFO wait queue with direct hand-off
//!
//! Primitives never own threads. They hold [`ThreadId`] handles and move
//! threads between BLOCKED and READY through the [`crate::Cpu`] they are
//! handed on every call.

pub mod mutex;
pub mod semaphore;
pub mod thread;

pub use mutex::{Mutex, MutexId};
pub use semaphore::{Semaphore, SemaphoreId};
pub use thread::{SimThread, ThreadId, ThreadState};
