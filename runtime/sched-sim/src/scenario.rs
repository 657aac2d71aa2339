//! Scenario files
//!
//! A scenario declares primitives and thread programs in TOML:
//!
//! ```toml
//! max_ticks = 500
//!
//! [[mutex]]
//! name = "M"
//!
//! [[semaphore]]
//! name = "empty"
//! initial = 2
//!
//! [[thread]]
//! tid = "T1"
//! instructions = ["ENTER_MUTEX M", "INC counter", "EXIT_MUTEX M"]
//! ```
//!
//! Primitives are declared before any thread is parsed, so instruction order
//! inside the file does not matter.

use crate::{Result, Scheduler, SimError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutexDecl {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemaphoreDecl {
    pub name: String,
    #[serde(default)]
    pub initial: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadDecl {
    pub tid: String,
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Parsed scenario file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Optional tick cap overriding the configured default
    #[serde(default)]
    pub max_ticks: Option<u64>,

    #[serde(default, rename = "mutex")]
    pub mutexes: Vec<MutexDecl>,

    #[serde(default, rename = "semaphore")]
    pub semaphores: Vec<SemaphoreDecl>,

    #[serde(default, rename = "thread")]
    pub threads: Vec<ThreadDecl>,
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SimError::Scenario(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    /// Build a scheduler with every primitive declared and every thread admitted
    ///
    /// # Errors
    /// Unknown instruction tags and references to undeclared primitives are
    /// reported with the thread and instruction position.
    pub fn build(&self) -> Result<Scheduler> {
        let mut sched = Scheduler::new();

        for m in &self.mutexes {
            sched.add_mutex(&m.name)?;
        }
        for s in &self.semaphores {
            sched.add_semaphore(&s.name, s.initial)?;
        }

        for thread in &self.threads {
            let instructions = thread
                .instructions
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    sched.parse_instruction(text).inspect_err(|e| {
                        log::error!("[scenario] {} instruction {}: {e}", thread.tid, i + 1);
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sched.add_thread(&thread.tid, instructions)?;
        }

        Ok(sched)
    }
}
