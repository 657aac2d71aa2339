//! Semaphore - counting semaphore with direct hand-off
//!
//! ## Design
//!
//! `wait` takes a unit if the value is positive, otherwise parks the caller.
//! `signal` adds a unit and, if anyone is parked, immediately passes that unit
//! to the head of the wait queue (the value is re-decremented on its behalf).
//! A third thread can never slip in between the increment and the wakeup.
//!
//! The value never goes negative: it is only decremented after it has been
//! observed positive or just incremented.
//!
//! ## Use Cases
//!
//! - Resource pools (initial value = pool size)
//! - Producer/consumer slots (`empty` = capacity, `full` = 0)

use crate::scheduler::Cpu;
use crate::trace::EventKind;
use crate::{Result, SimError, ThreadId};
use std::collections::VecDeque;

/// Handle to a semaphore declared on a [`crate::Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId(pub(crate) usize);

/// Simulated counting semaphore
#[derive(Debug, Clone)]
pub struct Semaphore {
    name: String,
    value: u32,
    wait_queue: VecDeque<ThreadId>,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, initial: u32) -> Self {
        Self {
            name: name.into(),
            value: initial,
            wait_queue: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.wait_queue.iter().copied()
    }

    pub fn waiter_count(&self) -> usize {
        self.wait_queue.len()
    }

    /// Take one unit for `thread`
    ///
    /// Returns `true` if a unit was available. Otherwise the thread is queued,
    /// marked BLOCKED, and `false` is returned.
    pub fn wait(&mut self, thread: ThreadId, cpu: &mut Cpu) -> bool {
        let tid = cpu.thread(thread).tid().to_string();

        if self.value > 0 {
            self.value -= 1;
            cpu.record(EventKind::SemAcquired { tid, semaphore: self.name.clone(), value: self.value });
            return true;
        }

        cpu.record(EventKind::SemBlocked { tid, semaphore: self.name.clone(), value: self.value });
        self.wait_queue.push_back(thread);
        cpu.block(thread);
        false
    }

    /// Return one unit, handing it to the oldest waiter if there is one
    ///
    /// # Errors
    /// [`SimError::SemaphoreOverflow`] if the value is already `u32::MAX`;
    /// the semaphore and trace are left untouched.
    pub fn signal(&mut self, cpu: &mut Cpu) -> Result<()> {
        self.value = self
            .value
            .checked_add(1)
            .ok_or_else(|| SimError::SemaphoreOverflow(self.name.clone()))?;
        cpu.record(EventKind::SemSignaled { semaphore: self.name.clone(), value: self.value });

        if let Some(next) = self.wait_queue.pop_front() {
            cpu.wake(next);
            self.value -= 1;
            let tid = cpu.thread(next).tid().to_string();
            cpu.record(EventKind::SemWoken { tid, semaphore: self.name.clone(), value: self.value });
        }
        Ok(())
    }
}
