//! Simulated Thread
//!
//! A `SimThread` is a named queue of instructions plus the bookkeeping the
//! dispatcher needs: lifecycle state, a program counter and one private
//! register used by split `LOAD`/`STORE` increments.
//!
//! ## Thread Lifecycle
//!
//! ```text
//! NEW → READY → RUNNING → READY       (more instructions remain)
//!                      → BLOCKED     (parked on a primitive)
//!                      → TERMINATED  (instruction queue empty)
//! BLOCKED → READY                     (only via release/signal)
//! ```

use crate::Instruction;
use core::fmt;
use std::collections::VecDeque;

/// Handle to a thread admitted into a [`crate::Cpu`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// Admission order of the thread (0-based)
    pub fn index(self) -> usize {
        self.0
    }
}

/// Thread state - lifecycle states of a simulated thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Constructed but not yet admitted
    New,

    /// In the ready queue
    Ready,

    /// Currently being dispatched
    Running,

    /// Parked in a mutex or semaphore wait queue
    Blocked,

    /// Instruction queue drained
    Terminated,
}

impl ThreadState {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::New => "NEW",
            ThreadState::Ready => "READY",
            ThreadState::Running => "RUNNING",
            ThreadState::Blocked => "BLOCKED",
            ThreadState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A simulated thread of execution
#[derive(Debug, Clone)]
pub struct SimThread {
    /// Thread name used in traces
    tid: String,

    /// Remaining instructions (head executes next)
    instructions: VecDeque<Instruction>,

    /// Lifecycle state
    state: ThreadState,

    /// Number of instructions consumed so far
    pc: usize,

    /// Private register for split increments
    register: i64,
}

impl SimThread {
    /// Create a thread in the NEW state
    pub fn new(tid: impl Into<String>, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        Self {
            tid: tid.into(),
            instructions: instructions.into_iter().collect(),
            state: ThreadState::New,
            pc: 0,
            register: 0,
        }
    }

    pub fn tid(&self) -> &str {
        &self.tid
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Count of instructions consumed
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Instructions still queued
    pub fn remaining(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_done(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn register(&self) -> i64 {
        self.register
    }

    pub(crate) fn set_register(&mut self, value: i64) {
        self.register = value;
    }

    /// Pop the next instruction, advancing the program counter
    pub(crate) fn pop_instruction(&mut self) -> Option<Instruction> {
        let inst = self.instructions.pop_front()?;
        self.pc += 1;
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_starts_new() {
        let thread = SimThread::new("T1", [Instruction::Compute, Instruction::Yield]);
        assert_eq!(thread.state(), ThreadState::New);
        assert_eq!(thread.pc(), 0);
        assert_eq!(thread.remaining(), 2);
        assert!(!thread.is_done());
    }

    #[test]
    fn test_pop_advances_pc() {
        let mut thread = SimThread::new("T1", [Instruction::Compute]);
        assert_eq!(thread.pop_instruction(), Some(Instruction::Compute));
        assert_eq!(thread.pc(), 1);
        assert!(thread.is_done());

        // Popping an empty queue leaves the counter alone
        assert_eq!(thread.pop_instruction(), None);
        assert_eq!(thread.pc(), 1);
    }

    #[test]
    fn test_state_display_pads() {
        assert_eq!(format!("{:7}|", ThreadState::Ready), "READY  |");
        assert_eq!(ThreadState::Terminated.to_string(), "TERMINATED");
    }
}
