//! Simulator - driver facade
//!
//! Owns the process table and console and hands out [`ProcEnv`] handles.
//!
//! ```rust
//! use osim_proc::{programs, ProcConfig, Simulator};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(programs::builtin_registry().unwrap());
//! let sim = Simulator::new(registry, ProcConfig::default());
//! let pid = sim.spawn("prog_echo", ["hello"]).unwrap();
//! assert_eq!(sim.wait(pid, None).unwrap(), Some(0));
//! assert_eq!(sim.console().recv().unwrap(), format!("[pid {pid}] echo: hello"));
//! ```

use crate::env::{Image, ProcEnv};
use crate::process::{ProcessInfo, TreeLine};
use crate::registry::ProgramRegistry;
use crate::runner::{self, Machine};
use crate::table::ProcessTable;
use crate::{Pid, Result, DEFAULT_FIRST_PID, INIT_PID};
use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process engine configuration (`[process]` table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcConfig {
    /// First pid handed to user processes (init is pid 1)
    pub first_pid: Pid,

    /// Default timeout, in seconds, for driver-side waits; none blocks forever
    pub wait_timeout_secs: Option<f64>,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            first_pid: DEFAULT_FIRST_PID,
            wait_timeout_secs: None,
        }
    }
}

impl ProcConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Simulator
pub struct Simulator {
    machine: Arc<Machine>,
    console: Receiver<String>,
    config: ProcConfig,
}

impl Simulator {
    /// Create a simulator whose table holds only init
    pub fn new(registry: Arc<ProgramRegistry>, config: ProcConfig) -> Self {
        if config.first_pid <= INIT_PID {
            log::warn!(
                "[proc] first_pid {} collides with init, allocating from {}",
                config.first_pid,
                INIT_PID + 1
            );
        }

        let (tx, rx) = channel::unbounded();
        let machine = Arc::new(Machine {
            table: ProcessTable::new(config.first_pid),
            registry,
            console: tx,
            units: Mutex::new(Vec::new()),
        });

        Self { machine, console: rx, config }
    }

    pub fn config(&self) -> &ProcConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.machine.registry
    }

    pub fn table(&self) -> &ProcessTable {
        &self.machine.table
    }

    /// Start `program` as a child of init
    ///
    /// An unregistered program still gets a pid; its process exits with
    /// code 1 after reporting the missing program on the console.
    pub fn spawn<I, S>(&self, program: &str, args: I) -> Result<Pid>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let image = Image::new(program, args);
        let pid = self.machine.table.create(INIT_PID, image)?;
        log::info!("[proc] spawned {pid} running {program}");
        runner::launch(&self.machine, pid, None)?;
        Ok(pid)
    }

    /// Block until `pid` exits or `timeout` elapses
    ///
    /// Returns the exit code, or `None` on timeout. Any process may be
    /// waited on here; the parent/child check applies to [`ProcEnv::wait`].
    pub fn wait(&self, pid: Pid, timeout: Option<Duration>) -> Result<Option<i32>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.machine.table.wait_for_exit(pid, deadline)
    }

    /// Handle that acts as `pid` from the driver's thread
    pub fn attach(&self, pid: Pid) -> Result<ProcEnv> {
        self.machine.table.info(pid)?;
        Ok(ProcEnv::new(pid, Arc::clone(&self.machine), None))
    }

    /// Process output lines, in send order
    pub fn console(&self) -> &Receiver<String> {
        &self.console
    }

    /// Every process ordered by pid
    pub fn ps(&self) -> Vec<ProcessInfo> {
        self.machine.table.snapshot()
    }

    pub fn tree(&self) -> Vec<TreeLine> {
        self.machine.table.tree()
    }

    pub fn render_tree(&self) -> String {
        self.tree().iter().map(|line| format!("{line}\n")).collect()
    }

    /// Join every process thread, including ones forked while joining
    pub fn join(&self) {
        loop {
            let units = std::mem::take(&mut *self.machine.units.lock());
            if units.is_empty() {
                break;
            }
            for unit in units {
                let name = unit.thread().name().unwrap_or("proc").to_string();
                if unit.join().is_err() {
                    log::warn!("[proc] {name} terminated abnormally");
                }
            }
        }
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("processes", &self.machine.table.len())
            .field("registry", &self.machine.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: ProcConfig = toml::from_str("").unwrap();
        assert_eq!(config.first_pid, 100);
        assert_eq!(config.wait_timeout(), None);

        let config: ProcConfig = toml::from_str("first_pid = 500\nwait_timeout_secs = 1.5").unwrap();
        assert_eq!(config.first_pid, 500);
        assert_eq!(config.wait_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        assert!(toml::from_str::<ProcConfig>("max_procs = 3").is_err());
    }

    #[test]
    fn test_negative_timeout_ignored() {
        let config = ProcConfig { wait_timeout_secs: Some(-1.0), ..ProcConfig::default() };
        assert_eq!(config.wait_timeout(), None);
    }

    #[test]
    fn test_new_has_only_init() {
        let sim = Simulator::new(Arc::new(ProgramRegistry::default()), ProcConfig::default());
        let ps = sim.ps();
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].pid, INIT_PID);
        assert_eq!(sim.render_tree(), "1 (init) [RUNNING]\n");
    }

    #[test]
    fn test_attach_unknown_pid() {
        let sim = Simulator::new(Arc::new(ProgramRegistry::default()), ProcConfig::default());
        assert!(sim.attach(4242).is_err());
        assert_eq!(sim.attach(INIT_PID).unwrap().getpid(), INIT_PID);
    }
}
