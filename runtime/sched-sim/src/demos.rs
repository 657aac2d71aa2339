//! Canned demonstrations
//!
//! - **race**: two threads increment a counter with split `LOAD`/`STORE`
//!   and no lock, losing updates
//! - **mutex**: the same threads with the increment inside a mutex
//! - **semaphore**: four workers sharing a pool of two units
//! - **producer-consumer**: bounded buffer guarded by `empty`/`full`
//!   semaphores and a buffer mutex

use crate::{Instruction, MutexId, Result, RunReport, Scheduler, SimError};
use core::fmt;
use core::str::FromStr;

/// Shared counter used by the race and mutex demos
pub const COUNTER_KEY: &str = "counter";

/// How a thread increments a shared counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementStyle {
    /// One `INC` instruction
    Atomic,

    /// `LOAD` then `STORE`, one tick each
    Split,
}

/// Finished demo run
#[derive(Debug)]
pub struct DemoReport {
    pub title: &'static str,
    pub report: RunReport,
    pub scheduler: Scheduler,

    /// One-line result, e.g. `Final counter (mutex): 10`
    pub summary: String,
}

/// Instruction stream for one counter thread
///
/// Each round is `[ENTER_MUTEX] COMPUTE <increment> [EXIT_MUTEX] YIELD`.
pub fn counter_program(
    increments: usize,
    guard: Option<MutexId>,
    style: IncrementStyle,
) -> Vec<Instruction> {
    let mut insts = Vec::new();
    for _ in 0..increments {
        if let Some(m) = guard {
            insts.push(Instruction::EnterMutex(m));
        }
        insts.push(Instruction::Compute);
        match style {
            IncrementStyle::Atomic => insts.push(Instruction::Inc(COUNTER_KEY.to_string())),
            IncrementStyle::Split => {
                insts.push(Instruction::Load(COUNTER_KEY.to_string()));
                insts.push(Instruction::Store(COUNTER_KEY.to_string()));
            }
        }
        if let Some(m) = guard {
            insts.push(Instruction::ExitMutex(m));
        }
        insts.push(Instruction::Yield);
    }
    insts
}

/// Build a scheduler with `threads` identical counter threads `T1..Tn`
pub fn counter_scheduler(
    threads: usize,
    increments: usize,
    guarded: bool,
    style: IncrementStyle,
) -> Result<Scheduler> {
    let mut sched = Scheduler::new();
    let guard = if guarded { Some(sched.add_mutex("M")?) } else { None };
    let program = counter_program(increments, guard, style);
    for i in 1..=threads {
        sched.add_thread(&format!("T{i}"), program.clone())?;
    }
    Ok(sched)
}

/// Unsynchronized split increments on two threads
pub fn race(increments: usize, max_ticks: u64) -> Result<DemoReport> {
    let mut sched = counter_scheduler(2, increments, false, IncrementStyle::Split)?;
    let report = sched.run(max_ticks)?;
    let summary = format!("Final counter (unsynchronized): {}", sched.counter(COUNTER_KEY));
    Ok(DemoReport { title: "RACE (no synchronization)", report, scheduler: sched, summary })
}

/// Mutex-protected split increments on two threads
pub fn mutex(increments: usize, max_ticks: u64) -> Result<DemoReport> {
    let mut sched = counter_scheduler(2, increments, true, IncrementStyle::Split)?;
    let report = sched.run(max_ticks)?;
    let summary = format!("Final counter (mutex): {}", sched.counter(COUNTER_KEY));
    Ok(DemoReport { title: "MUTEX PROTECTED", report, scheduler: sched, summary })
}

/// Four workers `W1..W4` each taking a unit of a two-unit pool `rounds` times
pub fn semaphore(rounds: usize, max_ticks: u64) -> Result<DemoReport> {
    let mut sched = Scheduler::new();
    let pool = sched.add_semaphore("POOL", 2)?;

    for i in 1..=4 {
        let mut insts = Vec::new();
        for _ in 0..rounds {
            insts.push(Instruction::WaitSem(pool));
            insts.push(Instruction::Compute);
            insts.push(Instruction::SignalSem(pool));
            insts.push(Instruction::Yield);
        }
        sched.add_thread(&format!("W{i}"), insts)?;
    }

    let report = sched.run(max_ticks)?;
    let summary = format!("Semaphore POOL final value: {}", sched.semaphore(pool).value());
    Ok(DemoReport { title: "SEMAPHORE DEMO", report, scheduler: sched, summary })
}

/// One producer `P1` and one consumer `C1` over a buffer of `capacity` slots
pub fn producer_consumer(items: usize, capacity: u32, max_ticks: u64) -> Result<DemoReport> {
    let mut sched = Scheduler::new();
    let buf = sched.add_mutex("buf_mutex")?;
    let empty = sched.add_semaphore("empty", capacity)?;
    let full = sched.add_semaphore("full", 0)?;

    let side = |wait, signal, key: &str| {
        let mut insts = Vec::new();
        for _ in 0..items {
            insts.push(Instruction::WaitSem(wait));
            insts.push(Instruction::EnterMutex(buf));
            insts.push(Instruction::Inc(key.to_string()));
            insts.push(Instruction::ExitMutex(buf));
            insts.push(Instruction::SignalSem(signal));
            insts.push(Instruction::Yield);
        }
        insts
    };

    sched.add_thread("P1", side(empty, full, "produced"))?;
    sched.add_thread("C1", side(full, empty, "consumed"))?;

    let report = sched.run(max_ticks)?;
    let summary = format!(
        "Produced: {}, Consumed: {}",
        sched.counter("produced"),
        sched.counter("consumed")
    );
    Ok(DemoReport { title: "PRODUCER-CONSUMER", report, scheduler: sched, summary })
}

/// Selectable demo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demo {
    Race,
    Mutex,
    Semaphore,
    ProducerConsumer,
}

impl Demo {
    pub const ALL: [Demo; 4] = [Demo::Race, Demo::Mutex, Demo::Semaphore, Demo::ProducerConsumer];

    /// Items (or rounds) used when the caller does not pick a count
    pub fn default_items(self) -> usize {
        match self {
            Demo::Race | Demo::Mutex => 5,
            Demo::Semaphore | Demo::ProducerConsumer => 3,
        }
    }

    pub fn run(self, items: Option<usize>, max_ticks: u64) -> Result<DemoReport> {
        let items = items.unwrap_or(self.default_items());
        match self {
            Demo::Race => race(items, max_ticks),
            Demo::Mutex => mutex(items, max_ticks),
            Demo::Semaphore => semaphore(items, max_ticks),
            Demo::ProducerConsumer => producer_consumer(items, 2, max_ticks),
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Demo::Race => "race",
            Demo::Mutex => "mutex",
            Demo::Semaphore => "semaphore",
            Demo::ProducerConsumer => "prod-cons",
        })
    }
}

impl FromStr for Demo {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "race" => Ok(Demo::Race),
            "mutex" | "mutex_demo" => Ok(Demo::Mutex),
            "semaphore" | "semaphore_demo" => Ok(Demo::Semaphore),
            "prod-cons" | "prod_cons" | "producer-consumer" => Ok(Demo::ProducerConsumer),
            other => Err(SimError::Scenario(format!("unknown demo `{other}`"))),
        }
    }
}
