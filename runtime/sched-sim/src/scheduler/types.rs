//! Scheduler Types
//!
//! Core data structures for the dispatch loop.

use crate::trace::{EventKind, Trace, TraceEvent};
use crate::{SimThread, ThreadId, ThreadState};
use serde::Deserialize;
use std::collections::VecDeque;

/// Default tick cap for a run
pub const DEFAULT_MAX_TICKS: u64 = 1000;

/// Cpu - the simulated processor
///
/// Owns the clock, the thread arena, the FIFO ready queue and the trace.
/// Primitives receive `&mut Cpu` to park and wake threads, which keeps every
/// BLOCKED → READY transition going through [`Cpu::wake`].
#[derive(Debug, Default)]
pub struct Cpu {
    /// Monotonic tick counter
    time: u64,

    /// Every admitted thread, indexed by [`ThreadId`]
    threads: Vec<SimThread>,

    /// Threads eligible for dispatch, head runs next
    ready: VecDeque<ThreadId>,

    trace: Trace,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick
    #[inline]
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Admit a thread: NEW → READY, appended to the ready queue
    pub fn admit(&mut self, mut thread: SimThread) -> ThreadId {
        let id = ThreadId(self.threads.len());
        thread.set_state(ThreadState::Ready);
        self.threads.push(thread);
        self.ready.push_back(id);
        id
    }

    pub fn thread(&self, id: ThreadId) -> &SimThread {
        &self.threads[id.0]
    }

    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> &mut SimThread {
        &mut self.threads[id.0]
    }

    pub fn threads(&self) -> impl Iterator<Item = (ThreadId, &SimThread)> {
        self.threads.iter().enumerate().map(|(i, t)| (ThreadId(i), t))
    }

    /// Look up a thread by name
    pub fn find(&self, tid: &str) -> Option<ThreadId> {
        self.threads.iter().position(|t| t.tid() == tid).map(ThreadId)
    }

    /// Park a thread; the scheduler will not re-enqueue it
    pub fn block(&mut self, id: ThreadId) {
        self.thread_mut(id).set_state(ThreadState::Blocked);
    }

    /// Make a blocked thread runnable and append it to the ready queue
    pub fn wake(&mut self, id: ThreadId) {
        self.thread_mut(id).set_state(ThreadState::Ready);
        self.ready.push_back(id);
    }

    /// Record an event stamped with the current tick
    pub fn record(&mut self, kind: EventKind) {
        let tick = self.time;
        self.trace.push(TraceEvent { tick, kind });
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Threads currently queued, head first
    pub fn ready_queue(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.ready.iter().copied()
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub(crate) fn next_ready(&mut self) -> Option<ThreadId> {
        self.ready.pop_front()
    }

    pub(crate) fn requeue(&mut self, id: ThreadId) {
        self.thread_mut(id).set_state(ThreadState::Ready);
        self.ready.push_back(id);
    }

    pub(crate) fn advance(&mut self) {
        self.time += 1;
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ready queue drained
    Completed,

    /// Tick cap reached with threads still queued
    Truncated,
}

/// Summary of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,

    /// Ticks spent in this run
    pub ticks: u64,
}

impl RunReport {
    pub fn is_truncated(&self) -> bool {
        self.outcome == RunOutcome::Truncated
    }
}

/// Scheduler configuration (`[scheduler]` table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Tick cap passed to [`crate::Scheduler::run`]
    pub max_ticks: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}
