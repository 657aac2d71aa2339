//! Symbolic instructions executed by simulated threads
//!
//! Primitive operands are handles into the owning [`crate::Scheduler`], so an
//! instruction only renders with names through [`crate::Scheduler::describe`].
//! Text parsing lives on the scheduler for the same reason
//! ([`crate::Scheduler::parse_instruction`]).

use crate::{MutexId, SemaphoreId};

/// One dispatchable operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// No-op that still consumes a tick
    Compute,

    /// Acquire a mutex, blocking if it is owned
    EnterMutex(MutexId),

    /// Release a mutex owned by the caller
    ExitMutex(MutexId),

    /// Take a semaphore unit, blocking at zero
    WaitSem(SemaphoreId),

    /// Return a semaphore unit
    SignalSem(SemaphoreId),

    /// Single-tick increment of a shared counter
    Inc(String),

    /// Copy a shared counter into the thread register (first half of a split increment)
    Load(String),

    /// Write register + 1 back to a shared counter (second half of a split increment)
    Store(String),

    /// No-op that still consumes a tick
    Yield,
}

impl Instruction {
    /// Text tag as it appears in traces and scenario files
    pub fn tag(&self) -> &'static str {
        match self {
            Instruction::Compute => "COMPUTE",
            Instruction::EnterMutex(_) => "ENTER_MUTEX",
            Instruction::ExitMutex(_) => "EXIT_MUTEX",
            Instruction::WaitSem(_) => "WAIT_SEM",
            Instruction::SignalSem(_) => "SIGNAL_SEM",
            Instruction::Inc(_) => "INC",
            Instruction::Load(_) => "LOAD",
            Instruction::Store(_) => "STORE",
            Instruction::Yield => "YIELD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Instruction::Compute.tag(), "COMPUTE");
        assert_eq!(Instruction::Inc("counter".into()).tag(), "INC");
        assert_eq!(Instruction::SignalSem(SemaphoreId(0)).tag(), "SIGNAL_SEM");
    }
}
