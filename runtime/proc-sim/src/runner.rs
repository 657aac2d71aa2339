//! Per-process run loop
//!
//! Runs a process's program on its own thread until the body returns,
//! exits, or fails. `exec` re-enters the loop with the new image. Faults,
//! missing programs and panics all become exit code 1 and are reported on
//! the console, so the table stays consistent and waiters always wake.

use crate::env::{Ended, Image, ProcEnv, Signal};
use crate::process::ProcessState;
use crate::registry::ProgramRegistry;
use crate::table::ProcessTable;
use crate::{Pid, ProcError, Result};
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State shared by the simulator and every process thread
pub(crate) struct Machine {
    pub(crate) table: ProcessTable,
    pub(crate) registry: Arc<ProgramRegistry>,
    pub(crate) console: Sender<String>,

    /// Handles of every started process thread not yet joined
    pub(crate) units: Mutex<Vec<JoinHandle<()>>>,
}

/// Start the thread for `pid`
///
/// If the thread cannot be started the entry is marked exited with code 1.
pub(crate) fn launch(machine: &Arc<Machine>, pid: Pid, fork_return: Option<Pid>) -> Result<()> {
    let shared = Arc::clone(machine);
    let spawned = thread::Builder::new()
        .name(format!("proc-{pid}"))
        .spawn(move || run(shared, pid, fork_return));

    match spawned {
        Ok(handle) => {
            machine.units.lock().push(handle);
            Ok(())
        }
        Err(err) => Err(abandon(machine, pid, err)),
    }
}

/// Finish a process whose thread never started
fn abandon(machine: &Machine, pid: Pid, err: io::Error) -> ProcError {
    log::warn!("[proc] {pid} could not be started: {err}");
    if let Err(finish_err) = machine.table.finish(pid, Some(1)) {
        log::warn!("[proc] {pid} could not be marked exited: {finish_err}");
    }
    ProcError::Spawn(err)
}

fn run(machine: Arc<Machine>, pid: Pid, fork_return: Option<Pid>) {
    let code = match run_images(&machine, pid, fork_return) {
        Ok(code) => code,
        Err(err) => {
            log::warn!("[proc] {pid} lost its table entry: {err}");
            return;
        }
    };

    if let Err(err) = machine.table.finish(pid, code) {
        log::warn!("[proc] {pid} could not be marked exited: {err}");
        return;
    }
    log::info!("[proc] {pid} exited (code {})", code.map_or("unset".into(), |c| c.to_string()));
}

/// Run images until the process ends; returns the exit code to record
fn run_images(machine: &Arc<Machine>, pid: Pid, fork_return: Option<Pid>) -> Result<Option<i32>> {
    machine.table.set_state(pid, ProcessState::Running)?;
    let mut env = ProcEnv::new(pid, Arc::clone(machine), fork_return);
    let mut image: Image = machine.table.image(pid)?;

    loop {
        let Some(program) = machine.registry.get(&image.program) else {
            let _ = machine
                .console
                .send(format!("[proc {pid}] program '{}' not found", image.program));
            return Ok(Some(1));
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| program(&mut env)));

        // A recorded exit or exec wins over whatever the body did afterwards
        match env.take_ended() {
            Some(Ended::Exit(code)) => return Ok(Some(code)),
            Some(Ended::Exec(next)) => {
                image = next;
                continue;
            }
            None => {}
        }

        match outcome {
            Ok(Ok(())) => return Ok(None),
            Ok(Err(Signal::Exec(next))) => image = next,
            Ok(Err(Signal::Exit(code))) => return Ok(Some(code)),
            Ok(Err(Signal::Fault(err))) => {
                log::warn!("[proc] {pid} ({}) failed: {err}", image.program);
                let _ = machine.console.send(format!("[proc {pid}] crashed: {err}"));
                return Ok(Some(1));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::warn!("[proc] {pid} ({}) panicked: {message}", image.program);
                let _ = machine.console.send(format!("[proc {pid}] crashed: {message}"));
                return Ok(Some(1));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProgramRegistry, INIT_PID};
    use std::time::{Duration, Instant};

    fn machine() -> Machine {
        Machine {
            table: ProcessTable::new(100),
            registry: Arc::new(ProgramRegistry::builder().build()),
            console: crossbeam::channel::unbounded().0,
            units: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_abandoned_process_wakes_waiters() {
        let machine = machine();
        let pid = machine
            .table
            .create(INIT_PID, Image::new("prog_echo", Vec::<String>::new()))
            .unwrap();

        let err = abandon(&machine, pid, io::Error::new(io::ErrorKind::WouldBlock, "no threads"));
        assert!(matches!(err, ProcError::Spawn(_)));

        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(machine.table.wait_for_exit(pid, Some(deadline)).unwrap(), Some(1));
        assert_eq!(machine.table.state(pid).unwrap(), ProcessState::Exited);
        assert!(machine.table.is_child(INIT_PID, pid).unwrap());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panic");
    }
}
