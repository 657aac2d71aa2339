//! Scheduler - round-robin dispatch of simulated threads
//!
//! ## Policy
//!
//! Strict FIFO over a single ready queue:
//!
//! - pop the head of the ready queue
//! - skip it (without re-enqueuing) if it is BLOCKED
//! - execute exactly one instruction
//! - advance the clock by exactly one tick
//! - re-enqueue at the tail unless it blocked or terminated
//!
//! No priorities, no preemption inside an instruction.
//!
//! ## Blocking
//!
//! A blocking `ENTER_MUTEX`/`WAIT_SEM` is consumed when it is popped and is
//! not retried. The primitive grants the thread its mutex or semaphore unit
//! at release/signal time and re-enqueues it, so the thread resumes with the
//! instruction after the one that blocked.
//!
//! ## Usage
//!
//! ```rust
//! use osim_sched::{Instruction, Scheduler};
//!
//! let mut sched = Scheduler::new();
//! let m = sched.add_mutex("M").unwrap();
//! let body = vec![
//!     Instruction::EnterMutex(m),
//!     Instruction::Inc("counter".into()),
//!     Instruction::ExitMutex(m),
//! ];
//! sched.add_thread("T1", body.clone()).unwrap();
//! sched.add_thread("T2", body).unwrap();
//!
//! let report = sched.run(100).unwrap();
//! assert!(!report.is_truncated());
//! assert_eq!(sched.counter("counter"), 2);
//! ```

mod types;

pub use types::{Cpu, RunOutcome, RunReport, SchedulerConfig, DEFAULT_MAX_TICKS};

use crate::trace::EventKind;
use crate::{
    Instruction, Mutex, MutexId, Result, Semaphore, SemaphoreId, SimError, SimThread, ThreadId,
    ThreadState, Trace,
};
use std::collections::BTreeMap;

/// One simulation run: threads, primitives and the shared counter map
#[derive(Debug, Default)]
pub struct Scheduler {
    cpu: Cpu,
    mutexes: Vec<Mutex>,
    semaphores: Vec<Semaphore>,

    /// Counters written by `INC`/`STORE`
    shared: BTreeMap<String, i64>,

    /// Set once `run` has been entered
    halted: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a mutex referenced by later instructions
    pub fn add_mutex(&mut self, name: &str) -> Result<MutexId> {
        if self.mutex_id(name).is_some() {
            return Err(SimError::DuplicatePrimitive(name.to_string()));
        }
        self.mutexes.push(Mutex::new(name));
        Ok(MutexId(self.mutexes.len() - 1))
    }

    /// Declare a semaphore with its initial value
    pub fn add_semaphore(&mut self, name: &str, initial: u32) -> Result<SemaphoreId> {
        if self.semaphore_id(name).is_some() {
            return Err(SimError::DuplicatePrimitive(name.to_string()));
        }
        self.semaphores.push(Semaphore::new(name, initial));
        Ok(SemaphoreId(self.semaphores.len() - 1))
    }

    pub fn mutex_id(&self, name: &str) -> Option<MutexId> {
        self.mutexes.iter().position(|m| m.name() == name).map(MutexId)
    }

    pub fn semaphore_id(&self, name: &str) -> Option<SemaphoreId> {
        self.semaphores.iter().position(|s| s.name() == name).map(SemaphoreId)
    }

    /// Admit a thread into the ready queue
    ///
    /// # Errors
    /// Rejects a duplicate `tid` and instructions naming primitives that were
    /// not declared on this scheduler.
    pub fn add_thread(
        &mut self,
        tid: &str,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Result<ThreadId> {
        if self.cpu.find(tid).is_some() {
            return Err(SimError::DuplicateThread(tid.to_string()));
        }

        let instructions: Vec<Instruction> = instructions.into_iter().collect();
        for inst in &instructions {
            self.check_operand(inst)?;
        }

        Ok(self.cpu.admit(SimThread::new(tid, instructions)))
    }

    fn check_operand(&self, inst: &Instruction) -> Result<()> {
        match inst {
            Instruction::EnterMutex(m) | Instruction::ExitMutex(m) if m.0 >= self.mutexes.len() => {
                Err(SimError::UnknownMutex(format!("#{}", m.0)))
            }
            Instruction::WaitSem(s) | Instruction::SignalSem(s) if s.0 >= self.semaphores.len() => {
                Err(SimError::UnknownSemaphore(format!("#{}", s.0)))
            }
            _ => Ok(()),
        }
    }

    /// Parse `TAG [operand]` against the primitives declared so far
    ///
    /// Tags are case-insensitive: `COMPUTE`, `YIELD`, `ENTER_MUTEX <m>`,
    /// `EXIT_MUTEX <m>`, `WAIT_SEM <s>`, `SIGNAL_SEM <s>`, `INC <key>`,
    /// `LOAD <key>`, `STORE <key>`.
    pub fn parse_instruction(&self, text: &str) -> Result<Instruction> {
        let mut parts = text.split_whitespace();
        let tag = parts
            .next()
            .ok_or_else(|| SimError::UnknownInstruction(text.to_string()))?
            .to_ascii_uppercase();
        let operand = parts.next();
        if parts.next().is_some() {
            return Err(SimError::Scenario(format!("trailing operands in `{text}`")));
        }

        let required = |op: &str| {
            operand.ok_or_else(|| SimError::MissingOperand { op: op.to_string() })
        };
        let nullary = |inst: Instruction| match operand {
            Some(_) => Err(SimError::Scenario(format!("{} takes no operand", inst.tag()))),
            None => Ok(inst),
        };

        match tag.as_str() {
            "COMPUTE" => nullary(Instruction::Compute),
            "YIELD" => nullary(Instruction::Yield),
            "ENTER_MUTEX" => Ok(Instruction::EnterMutex(self.lookup_mutex(required(&tag)?)?)),
            "EXIT_MUTEX" => Ok(Instruction::ExitMutex(self.lookup_mutex(required(&tag)?)?)),
            "WAIT_SEM" => Ok(Instruction::WaitSem(self.lookup_semaphore(required(&tag)?)?)),
            "SIGNAL_SEM" => Ok(Instruction::SignalSem(self.lookup_semaphore(required(&tag)?)?)),
            "INC" => Ok(Instruction::Inc(required(&tag)?.to_string())),
            "LOAD" => Ok(Instruction::Load(required(&tag)?.to_string())),
            "STORE" => Ok(Instruction::Store(required(&tag)?.to_string())),
            _ => Err(SimError::UnknownInstruction(tag.clone())),
        }
    }

    fn lookup_mutex(&self, name: &str) -> Result<MutexId> {
        self.mutex_id(name).ok_or_else(|| SimError::UnknownMutex(name.to_string()))
    }

    fn lookup_semaphore(&self, name: &str) -> Result<SemaphoreId> {
        self.semaphore_id(name)
            .ok_or_else(|| SimError::UnknownSemaphore(name.to_string()))
    }

    /// Render an instruction with primitive names, e.g. `ENTER_MUTEX M`
    pub fn describe(&self, inst: &Instruction) -> String {
        let operand = match inst {
            Instruction::Compute | Instruction::Yield => return inst.tag().to_string(),
            Instruction::EnterMutex(m) | Instruction::ExitMutex(m) => {
                self.mutexes.get(m.0).map_or("?", Mutex::name)
            }
            Instruction::WaitSem(s) | Instruction::SignalSem(s) => {
                self.semaphores.get(s.0).map_or("?", Semaphore::name)
            }
            Instruction::Inc(key) | Instruction::Load(key) | Instruction::Store(key) => key.as_str(),
        };
        format!("{} {}", inst.tag(), operand)
    }

    /// Run until the ready queue drains or `max_ticks` ticks have elapsed
    ///
    /// # Errors
    /// - [`SimError::NotOwner`] when a thread releases a mutex it does not hold;
    ///   the run stops at that instruction
    /// - [`SimError::Halted`] if this scheduler already ran
    pub fn run(&mut self, max_ticks: u64) -> Result<RunReport> {
        if self.halted {
            return Err(SimError::Halted);
        }
        self.halted = true;

        let mut ticks = 0;
        while ticks < max_ticks {
            let Some(id) = self.cpu.next_ready() else {
                break;
            };

            if self.cpu.thread(id).state() == ThreadState::Blocked {
                continue;
            }

            self.dispatch(id)?;

            self.cpu.advance();
            ticks += 1;
        }

        let outcome = if self.cpu.has_ready() {
            log::warn!("[sched] reached max ticks ({max_ticks}), stopping simulation");
            self.cpu.record(EventKind::Truncated);
            RunOutcome::Truncated
        } else {
            RunOutcome::Completed
        };

        Ok(RunReport { outcome, ticks })
    }

    /// Execute one instruction for `id` and settle its next state
    fn dispatch(&mut self, id: ThreadId) -> Result<()> {
        let thread = self.cpu.thread_mut(id);
        thread.set_state(ThreadState::Running);

        // A thread woken after blocking on its last instruction arrives empty
        if let Some(inst) = thread.pop_instruction() {
            let tid = thread.tid().to_string();
            let instruction = self.describe(&inst);
            self.cpu.record(EventKind::Dispatch { tid, instruction });
            self.execute(id, inst)?;
        }

        let thread = self.cpu.thread(id);
        match thread.state() {
            ThreadState::Blocked => {}
            _ if thread.is_done() => {
                let tid = thread.tid().to_string();
                self.cpu.thread_mut(id).set_state(ThreadState::Terminated);
                self.cpu.record(EventKind::Terminated { tid });
            }
            _ => self.cpu.requeue(id),
        }

        Ok(())
    }

    fn execute(&mut self, id: ThreadId, inst: Instruction) -> Result<()> {
        match inst {
            Instruction::Compute | Instruction::Yield => {}
            Instruction::EnterMutex(m) => {
                self.mutexes[m.0].acquire(id, &mut self.cpu);
            }
            Instruction::ExitMutex(m) => self.mutexes[m.0].release(id, &mut self.cpu)?,
            Instruction::WaitSem(s) => {
                self.semaphores[s.0].wait(id, &mut self.cpu);
            }
            Instruction::SignalSem(s) => self.semaphores[s.0].signal(&mut self.cpu)?,
            Instruction::Inc(key) => {
                let slot = self.shared.entry(key.clone()).or_insert(0);
                *slot += 1;
                let value = *slot;
                let tid = self.cpu.thread(id).tid().to_string();
                self.cpu.record(EventKind::Increment { tid, key, value });
            }
            Instruction::Load(key) => {
                let value = self.counter(&key);
                let thread = self.cpu.thread_mut(id);
                thread.set_register(value);
                let tid = thread.tid().to_string();
                self.cpu.record(EventKind::Load { tid, key, value });
            }
            Instruction::Store(key) => {
                let thread = self.cpu.thread(id);
                let value = thread.register() + 1;
                let tid = thread.tid().to_string();
                self.shared.insert(key.clone(), value);
                self.cpu.record(EventKind::Store { tid, key, value });
            }
        }
        Ok(())
    }

    /// Current tick
    pub fn time(&self) -> u64 {
        self.cpu.time()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn trace(&self) -> &Trace {
        self.cpu.trace()
    }

    pub fn thread(&self, id: ThreadId) -> &SimThread {
        self.cpu.thread(id)
    }

    pub fn mutex(&self, id: MutexId) -> &Mutex {
        &self.mutexes[id.0]
    }

    pub fn semaphore(&self, id: SemaphoreId) -> &Semaphore {
        &self.semaphores[id.0]
    }

    /// Shared counter map
    pub fn shared(&self) -> &BTreeMap<String, i64> {
        &self.shared
    }

    /// Value of one shared counter (0 if never written)
    pub fn counter(&self, key: &str) -> i64 {
        self.shared.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_order() {
        let mut sched = Scheduler::new();
        sched.add_thread("A", [Instruction::Compute, Instruction::Compute]).unwrap();
        sched.add_thread("B", [Instruction::Compute]).unwrap();

        let report = sched.run(100).unwrap();
        assert_eq!(report, RunReport { outcome: RunOutcome::Completed, ticks: 3 });

        let lines: Vec<String> = sched.trace().lines().collect();
        assert_eq!(
            lines,
            vec![
                "[000] RUNNING A -> COMPUTE",
                "[001] RUNNING B -> COMPUTE",
                "[001] B terminated",
                "[002] RUNNING A -> COMPUTE",
                "[002] A terminated",
            ]
        );
    }

    #[test]
    fn test_every_instruction_costs_one_tick() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("M").unwrap();
        sched
            .add_thread(
                "T1",
                [
                    Instruction::EnterMutex(m),
                    Instruction::Yield,
                    Instruction::Inc("k".into()),
                    Instruction::ExitMutex(m),
                ],
            )
            .unwrap();

        let report = sched.run(100).unwrap();
        assert_eq!(report.ticks, 4);
        assert_eq!(sched.time(), 4);
    }

    #[test]
    fn test_blocked_instruction_is_not_retried() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("M").unwrap();
        let t1 = sched
            .add_thread("T1", [Instruction::EnterMutex(m), Instruction::Compute, Instruction::ExitMutex(m)])
            .unwrap();
        let t2 = sched
            .add_thread("T2", [Instruction::EnterMutex(m), Instruction::ExitMutex(m)])
            .unwrap();

        sched.run(100).unwrap();

        // T2 popped ENTER_MUTEX once, blocked, and was granted on release
        let dispatched_enter = sched
            .trace()
            .lines()
            .filter(|l| l.contains("RUNNING T2 -> ENTER_MUTEX"))
            .count();
        assert_eq!(dispatched_enter, 1);
        assert_eq!(sched.thread(t1).state(), ThreadState::Terminated);
        assert_eq!(sched.thread(t2).state(), ThreadState::Terminated);
        assert_eq!(sched.thread(t2).pc(), 2);
        assert_eq!(sched.mutex(m).owner(), None);
    }

    #[test]
    fn test_wake_after_blocking_on_last_instruction() {
        let mut sched = Scheduler::new();
        let s = sched.add_semaphore("S", 0).unwrap();
        let waiter = sched.add_thread("W", [Instruction::WaitSem(s)]).unwrap();
        sched.add_thread("P", [Instruction::Compute, Instruction::SignalSem(s)]).unwrap();

        let report = sched.run(100).unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(sched.thread(waiter).state(), ThreadState::Terminated);
        assert_eq!(sched.semaphore(s).value(), 0);
    }

    #[test]
    fn test_unreleased_block_leaves_thread_parked() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("M").unwrap();
        sched.add_thread("Holder", [Instruction::EnterMutex(m)]).unwrap();
        let stuck = sched
            .add_thread("Stuck", [Instruction::EnterMutex(m), Instruction::Compute])
            .unwrap();

        let report = sched.run(100).unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(sched.thread(stuck).state(), ThreadState::Blocked);
        assert_eq!(sched.thread(stuck).remaining(), 1);
    }

    #[test]
    fn test_truncation_is_reported() {
        let mut sched = Scheduler::new();
        sched.add_thread("T1", vec![Instruction::Compute; 10]).unwrap();

        let report = sched.run(4).unwrap();
        assert_eq!(report, RunReport { outcome: RunOutcome::Truncated, ticks: 4 });
        assert_eq!(
            sched.trace().last().unwrap().to_string(),
            "[!] reached max ticks, stopping simulation"
        );
        assert!(matches!(sched.run(4), Err(SimError::Halted)));
    }

    #[test]
    fn test_finishing_exactly_at_cap_is_completion() {
        let mut sched = Scheduler::new();
        sched.add_thread("T1", vec![Instruction::Compute; 4]).unwrap();

        let report = sched.run(4).unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[test]
    fn test_release_without_ownership_stops_run() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("M").unwrap();
        sched.add_thread("T1", [Instruction::ExitMutex(m)]).unwrap();

        let err = sched.run(10).unwrap_err();
        assert_eq!(err.to_string(), "T1 tried to release mutex M but is not owner");
    }

    #[test]
    fn test_split_increment() {
        let mut sched = Scheduler::new();
        let t = sched
            .add_thread("T1", [Instruction::Load("c".into()), Instruction::Store("c".into())])
            .unwrap();
        sched.run(10).unwrap();

        assert_eq!(sched.counter("c"), 1);
        assert_eq!(sched.thread(t).register(), 0);
        let lines: Vec<String> = sched.trace().lines().collect();
        assert!(lines.contains(&"[000] T1 loaded c = 0".to_string()));
        assert!(lines.contains(&"[001] T1 stored c -> 1".to_string()));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut sched = Scheduler::new();
        sched.add_mutex("M").unwrap();
        assert!(matches!(sched.add_mutex("M"), Err(SimError::DuplicatePrimitive(_))));
        sched.add_thread("T1", Vec::new()).unwrap();
        assert!(matches!(sched.add_thread("T1", Vec::new()), Err(SimError::DuplicateThread(_))));
    }

    #[test]
    fn test_foreign_primitive_rejected() {
        let mut other = Scheduler::new();
        other.add_mutex("A").unwrap();
        let foreign = other.add_mutex("B").unwrap();

        let mut sched = Scheduler::new();
        sched.add_mutex("M").unwrap();
        let result = sched.add_thread("T1", [Instruction::EnterMutex(foreign)]);
        assert!(matches!(result, Err(SimError::UnknownMutex(_))));
    }

    #[test]
    fn test_parse_instruction() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("M").unwrap();
        let s = sched.add_semaphore("full", 0).unwrap();

        assert_eq!(sched.parse_instruction("compute").unwrap(), Instruction::Compute);
        assert_eq!(sched.parse_instruction("ENTER_MUTEX M").unwrap(), Instruction::EnterMutex(m));
        assert_eq!(sched.parse_instruction("signal_sem full").unwrap(), Instruction::SignalSem(s));
        assert_eq!(sched.parse_instruction("INC counter").unwrap(), Instruction::Inc("counter".into()));

        assert!(matches!(sched.parse_instruction("JUMP 4"), Err(SimError::UnknownInstruction(t)) if t == "JUMP"));
        assert!(matches!(sched.parse_instruction("WAIT_SEM"), Err(SimError::MissingOperand { .. })));
        assert!(matches!(sched.parse_instruction("ENTER_MUTEX X"), Err(SimError::UnknownMutex(_))));
        assert!(matches!(sched.parse_instruction("YIELD now"), Err(SimError::Scenario(_))));
        assert!(matches!(sched.parse_instruction(""), Err(SimError::UnknownInstruction(_))));
    }

    #[test]
    fn test_describe_uses_names() {
        let mut sched = Scheduler::new();
        let m = sched.add_mutex("buf_mutex").unwrap();
        assert_eq!(sched.describe(&Instruction::ExitMutex(m)), "EXIT_MUTEX buf_mutex");
        assert_eq!(sched.describe(&Instruction::Yield), "YIELD");
    }
}
