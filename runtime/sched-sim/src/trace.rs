//! Tick-stamped event trace
//!
//! Every transition the dispatcher or a primitive makes is recorded as a
//! [`TraceEvent`]. Events render to the classic one-line form, e.g.
//! `[004] T2 blocked on mutex M`, which front ends print verbatim.

use core::fmt;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A thread was dispatched with an instruction
    Dispatch { tid: String, instruction: String },

    MutexAcquired { tid: String, mutex: String },
    MutexBlocked { tid: String, mutex: String },
    MutexReleased { tid: String, mutex: String },
    /// Ownership passed to a waiter on release
    MutexGranted { tid: String, mutex: String },

    SemAcquired { tid: String, semaphore: String, value: u32 },
    SemBlocked { tid: String, semaphore: String, value: u32 },
    SemSignaled { semaphore: String, value: u32 },
    /// A waiter received the signalled unit
    SemWoken { tid: String, semaphore: String, value: u32 },

    Increment { tid: String, key: String, value: i64 },
    Load { tid: String, key: String, value: i64 },
    Store { tid: String, key: String, value: i64 },

    Terminated { tid: String },

    /// The tick cap was reached with work still queued
    Truncated,
}

/// One trace record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Scheduler tick at which the event happened
    pub tick: u64,
    pub kind: EventKind,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let EventKind::Truncated = self.kind {
            return f.write_str("[!] reached max ticks, stopping simulation");
        }

        write!(f, "[{:03}] ", self.tick)?;
        match &self.kind {
            EventKind::Dispatch { tid, instruction } => write!(f, "RUNNING {tid} -> {instruction}"),
            EventKind::MutexAcquired { tid, mutex } => write!(f, "{tid} acquired mutex {mutex}"),
            EventKind::MutexBlocked { tid, mutex } => write!(f, "{tid} blocked on mutex {mutex}"),
            EventKind::MutexReleased { tid, mutex } => write!(f, "{tid} released mutex {mutex}"),
            EventKind::MutexGranted { tid, mutex } => {
                write!(f, "{tid} unblocked and granted mutex {mutex}")
            }
            EventKind::SemAcquired { tid, semaphore, value } => {
                write!(f, "{tid} acquired semaphore {semaphore} (value={value})")
            }
            EventKind::SemBlocked { tid, semaphore, value } => {
                write!(f, "{tid} blocked on semaphore {semaphore} (value={value})")
            }
            EventKind::SemSignaled { semaphore, value } => {
                write!(f, "semaphore {semaphore} signaled (value={value})")
            }
            EventKind::SemWoken { tid, semaphore, value } => {
                write!(f, "{tid} unblocked by semaphore {semaphore} (value now={value})")
            }
            EventKind::Increment { tid, key, value } => write!(f, "{tid} incremented {key} -> {value}"),
            EventKind::Load { tid, key, value } => write!(f, "{tid} loaded {key} = {value}"),
            EventKind::Store { tid, key, value } => write!(f, "{tid} stored {key} -> {value}"),
            EventKind::Terminated { tid } => write!(f, "{tid} terminated"),
            EventKind::Truncated => Ok(()),
        }
    }
}

/// Ordered list of events for one run
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: TraceEvent) {
        log::debug!("{event}");
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEvent> {
        self.events.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter()
    }

    /// Rendered lines, in order
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.events.iter().map(ToString::to_string)
    }

    /// Values written to `key` by `INC`/`STORE`, in order
    pub fn counter_history<'a>(&'a self, key: &'a str) -> impl Iterator<Item = (u64, i64)> + 'a {
        self.events.iter().filter_map(move |event| match &event.kind {
            EventKind::Increment { key: k, value, .. } | EventKind::Store { key: k, value, .. } if k == key => {
                Some((event.tick, *value))
            }
            _ => None,
        })
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "{event}")?;
        }
        Ok(())
    }
}
