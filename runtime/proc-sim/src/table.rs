//! Process Table
//!
//! Shared map from pid to [`Process`], plus the pid allocator. A single
//! table-wide lock serializes every mutation; each entry's exit condvar is
//! always waited on with that same lock.

use crate::env::Image;
use crate::process::{Process, ProcessInfo, ProcessState, TreeLine};
use crate::{Pid, ProcError, Result, INIT_PID};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
struct TableInner {
    next_pid: Pid,
    procs: BTreeMap<Pid, Process>,
}

impl TableInner {
    fn get(&self, pid: Pid) -> Result<&Process> {
        self.procs.get(&pid).ok_or(ProcError::NoSuchProcess { pid })
    }

    fn get_mut(&mut self, pid: Pid) -> Result<&mut Process> {
        self.procs.get_mut(&pid).ok_or(ProcError::NoSuchProcess { pid })
    }

    fn insert_child(&mut self, ppid: Pid, image: Image) -> Result<Pid> {
        self.get(ppid)?;

        let pid = self.next_pid;
        self.next_pid += 1;
        self.procs.insert(pid, Process::new(pid, ppid, image.program, image.args));
        self.get_mut(ppid)?.children.push(pid);
        Ok(pid)
    }

    /// Exit code as seen by a waiter, or `None` while still alive
    fn exit_status(&self, pid: Pid) -> Result<Option<i32>> {
        let proc = self.get(pid)?;
        Ok((proc.state == ProcessState::Exited).then(|| proc.exit_code.unwrap_or(0)))
    }
}

/// Process Table
#[derive(Debug)]
pub struct ProcessTable {
    inner: Mutex<TableInner>,
}

impl ProcessTable {
    /// Create a table holding only init (pid 1, ppid 0, RUNNING)
    ///
    /// User pids are allocated from `first_pid` upward.
    pub fn new(first_pid: Pid) -> Self {
        let mut init = Process::new(INIT_PID, 0, "init".to_string(), Vec::new());
        init.state = ProcessState::Running;

        let mut procs = BTreeMap::new();
        procs.insert(INIT_PID, init);

        Self {
            inner: Mutex::new(TableInner {
                next_pid: first_pid.max(INIT_PID + 1),
                procs,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock()
    }

    /// Allocate a pid and register a READY child of `ppid` running `image`
    ///
    /// The entry and the parent's child list are updated under one lock.
    pub fn create(&self, ppid: Pid, image: Image) -> Result<Pid> {
        self.lock().insert_child(ppid, image)
    }

    /// Register a child of `parent` that copies the parent's current image
    pub fn fork(&self, parent: Pid) -> Result<Pid> {
        let mut inner = self.lock();
        let proc = inner.get(parent)?;
        let image = Image { program: proc.program.clone(), args: proc.args.clone() };
        inner.insert_child(parent, image)
    }

    pub fn info(&self, pid: Pid) -> Result<ProcessInfo> {
        Ok(self.lock().get(pid)?.info())
    }

    pub fn ppid(&self, pid: Pid) -> Result<Pid> {
        Ok(self.lock().get(pid)?.ppid)
    }

    pub fn state(&self, pid: Pid) -> Result<ProcessState> {
        Ok(self.lock().get(pid)?.state)
    }

    /// Current program and arguments
    pub fn image(&self, pid: Pid) -> Result<Image> {
        let inner = self.lock();
        let proc = inner.get(pid)?;
        Ok(Image { program: proc.program.clone(), args: proc.args.clone() })
    }

    /// Overwrite program and arguments in place
    pub fn set_image(&self, pid: Pid, image: Image) -> Result<()> {
        let mut inner = self.lock();
        let proc = inner.get_mut(pid)?;
        proc.program = image.program;
        proc.args = image.args;
        Ok(())
    }

    pub fn set_state(&self, pid: Pid, state: ProcessState) -> Result<()> {
        self.lock().get_mut(pid)?.state = state;
        Ok(())
    }

    /// Move `pid` from `from` to `to`; returns whether it was in `from`
    pub fn transition(&self, pid: Pid, from: ProcessState, to: ProcessState) -> Result<bool> {
        let mut inner = self.lock();
        let proc = inner.get_mut(pid)?;
        if proc.state != from {
            return Ok(false);
        }
        proc.state = to;
        Ok(true)
    }

    pub fn is_child(&self, parent: Pid, child: Pid) -> Result<bool> {
        Ok(self.lock().get(parent)?.children.contains(&child))
    }

    /// Mark `pid` EXITED and wake every waiter
    ///
    /// `code` overwrites the stored exit code when given; `None` keeps
    /// whatever an earlier `exit` recorded.
    pub fn finish(&self, pid: Pid, code: Option<i32>) -> Result<()> {
        let mut inner = self.lock();
        let proc = inner.get_mut(pid)?;
        if code.is_some() {
            proc.exit_code = code;
        }
        proc.state = ProcessState::Exited;
        proc.exited.notify_all();
        Ok(())
    }

    /// Block until `pid` has exited or `deadline` passes
    ///
    /// Returns the exit code (0 if never set), or `None` on timeout.
    pub fn wait_for_exit(&self, pid: Pid, deadline: Option<Instant>) -> Result<Option<i32>> {
        let mut inner = self.lock();
        loop {
            if let Some(code) = inner.exit_status(pid)? {
                return Ok(Some(code));
            }

            let exited = Arc::clone(&inner.get(pid)?.exited);
            match deadline {
                None => exited.wait(&mut inner),
                Some(deadline) => {
                    if exited.wait_until(&mut inner, deadline).timed_out() {
                        return inner.exit_status(pid);
                    }
                }
            }
        }
    }

    /// Every process ordered by pid
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        self.lock().procs.values().map(Process::info).collect()
    }

    /// Depth-first parent → children listing from every root (ppid 0)
    pub fn tree(&self) -> Vec<TreeLine> {
        let inner = self.lock();
        let mut lines = Vec::new();
        let mut stack: Vec<(Pid, usize)> = inner
            .procs
            .values()
            .filter(|p| p.ppid == 0)
            .rev()
            .map(|p| (p.pid, 0))
            .collect();

        while let Some((pid, depth)) = stack.pop() {
            let Some(proc) = inner.procs.get(&pid) else {
                continue;
            };
            lines.push(TreeLine {
                depth,
                pid,
                program: proc.program.clone(),
                state: proc.state,
            });
            stack.extend(proc.children.iter().rev().map(|&c| (c, depth + 1)));
        }
        lines
    }

    pub fn len(&self) -> usize {
        self.lock().procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().procs.is_empty()
    }
}
