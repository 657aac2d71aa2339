//! Mutex - exclusive lock with a FIFO wait queue
//!
//! ## Design
//!
//! At most one thread owns the mutex. A contending thread is parked in the
//! wait queue and marked BLOCKED. Releasing with waiters present hands
//! ownership straight to the head of the queue and makes it READY; the lock
//! is never observed free in between.
//!
//! Releasing a mutex the caller does not own is a fatal usage error that
//! leaves owner and queue untouched.

use crate::scheduler::Cpu;
use crate::trace::EventKind;
use crate::{Result, SimError, ThreadId};
use std::collections::VecDeque;

/// Handle to a mutex declared on a [`crate::Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub(crate) usize);

/// Simulated mutex
#[derive(Debug, Clone)]
pub struct Mutex {
    name: String,
    owner: Option<ThreadId>,
    wait_queue: VecDeque<ThreadId>,
}

impl Mutex {
    /// Create an unowned mutex
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            wait_queue: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Threads parked on this mutex, head first
    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.wait_queue.iter().copied()
    }

    pub fn waiter_count(&self) -> usize {
        self.wait_queue.len()
    }

    /// Try to take the mutex for `thread`
    ///
    /// Returns `true` if granted. Otherwise the thread is queued, marked
    /// BLOCKED, and `false` is returned.
    pub fn acquire(&mut self, thread: ThreadId, cpu: &mut Cpu) -> bool {
        let tid = cpu.thread(thread).tid().to_string();

        if self.owner.is_none() {
            self.owner = Some(thread);
            cpu.record(EventKind::MutexAcquired { tid, mutex: self.name.clone() });
            return true;
        }

        cpu.record(EventKind::MutexBlocked { tid, mutex: self.name.clone() });
        self.wait_queue.push_back(thread);
        cpu.block(thread);
        false
    }

    /// Release the mutex held by `thread`
    ///
    /// # Errors
    /// Returns [`SimError::NotOwner`] if `thread` is not the current owner.
    pub fn release(&mut self, thread: ThreadId, cpu: &mut Cpu) -> Result<()> {
        let tid = cpu.thread(thread).tid().to_string();

        if self.owner != Some(thread) {
            return Err(SimError::NotOwner { tid, mutex: self.name.clone() });
        }

        cpu.record(EventKind::MutexReleased { tid, mutex: self.name.clone() });

        match self.wait_queue.pop_front() {
            Some(next) => {
                self.owner = Some(next);
                cpu.wake(next);
                let tid = cpu.thread(next).tid().to_string();
                cpu.record(EventKind::MutexGranted { tid, mutex: self.name.clone() });
            }
            None => self.owner = None,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Instruction, SimThread, ThreadState};

    fn cpu_with(names: &[&str]) -> (Cpu, Vec<ThreadId>) {
        let mut cpu = Cpu::new();
        let ids = names
            .iter()
            .map(|name| cpu.admit(SimThread::new(*name, [Instruction::Compute])))
            .collect();
        (cpu, ids)
    }

    #[test]
    fn test_acquire_unowned() {
        let (mut cpu, ids) = cpu_with(&["T1"]);
        let mut m = Mutex::new("M");

        assert!(m.acquire(ids[0], &mut cpu));
        assert_eq!(m.owner(), Some(ids[0]));
        assert_eq!(m.waiter_count(), 0);
        assert_eq!(cpu.trace().last().unwrap().to_string(), "[000] T1 acquired mutex M");
    }

    #[test]
    fn test_contention_blocks() {
        let (mut cpu, ids) = cpu_with(&["T1", "T2"]);
        let mut m = Mutex::new("M");

        assert!(m.acquire(ids[0], &mut cpu));
        assert!(!m.acquire(ids[1], &mut cpu));

        assert_eq!(m.owner(), Some(ids[0]));
        assert_eq!(m.waiters().collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(cpu.thread(ids[1]).state(), ThreadState::Blocked);
    }

    #[test]
    fn test_release_hands_off_fifo() {
        let (mut cpu, ids) = cpu_with(&["T1", "T2", "T3"]);
        let mut m = Mutex::new("M");
        // Drain admission entries so the ready queue only shows wakeups
        while cpu.next_ready().is_some() {}

        m.acquire(ids[0], &mut cpu);
        m.acquire(ids[1], &mut cpu);
        m.acquire(ids[2], &mut cpu);

        m.release(ids[0], &mut cpu).unwrap();
        assert_eq!(m.owner(), Some(ids[1]));
        assert_eq!(cpu.thread(ids[1]).state(), ThreadState::Ready);
        assert_eq!(cpu.thread(ids[2]).state(), ThreadState::Blocked);
        assert_eq!(cpu.next_ready(), Some(ids[1]));

        let lines: Vec<String> = cpu.trace().lines().collect();
        assert!(lines.contains(&"[000] T2 unblocked and granted mutex M".to_string()));

        m.release(ids[1], &mut cpu).unwrap();
        assert_eq!(m.owner(), Some(ids[2]));

        m.release(ids[2], &mut cpu).unwrap();
        assert_eq!(m.owner(), None);
    }

    #[test]
    fn test_release_by_non_owner_is_rejected() {
        let (mut cpu, ids) = cpu_with(&["T1", "T2", "T3"]);
        let mut m = Mutex::new("M");

        m.acquire(ids[0], &mut cpu);
        m.acquire(ids[1], &mut cpu);
        let events_before = cpu.trace().len();

        let result = m.release(ids[2], &mut cpu);
        assert!(matches!(result, Err(SimError::NotOwner { ref tid, ref mutex }) if tid == "T3" && mutex == "M"));

        // Owner, queue and trace untouched
        assert_eq!(m.owner(), Some(ids[0]));
        assert_eq!(m.waiters().collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(cpu.trace().len(), events_before);
    }

    #[test]
    fn test_release_unowned_is_rejected() {
        let (mut cpu, ids) = cpu_with(&["T1"]);
        let mut m = Mutex::new("M");

        assert!(m.release(ids[0], &mut cpu).is_err());
        assert_eq!(m.owner(), None);
    }
}
