//! Registry of live child processes.
//!
//! The most recently registered child is the foreground child: it receives
//! keystrokes typed into the console. The registry lock is disjoint from every
//! mailbox lock; code holding it may post to a mailbox, never the reverse.
//!
//! Each child's stdin is owned by its own writer thread. Submitting a line
//! only queues it, so neither the registry lock nor the owning thread ever
//! waits on a child that stops reading.

use std::io::{self, Write};
use std::process::ChildStdin;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crate::mailbox::lock;

/// Identifies a registered child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildId(u64);

/// Signal sent by [`ProcessRegistry::kill_last`] / [`ProcessRegistry::kill_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// Ask politely (SIGINT).
    Interrupt,
    /// Terminate (SIGTERM).
    Terminate,
}

impl KillSignal {
    pub fn from_force(force: bool) -> Self {
        if force { Self::Terminate } else { Self::Interrupt }
    }
}

struct ChildEntry {
    id: ChildId,
    pid: u32,
    command: String,
    /// Queue feeding the child's stdin writer; dropping it closes the pipe.
    input: Option<Sender<String>>,
}

#[derive(Default)]
struct RegistryState {
    children: Vec<ChildEntry>,
    next_id: u64,
    /// Keystrokes typed since the last enter.
    line: String,
}

/// Shared, ordered registry of live children.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned child; it becomes the foreground child.
    pub fn register(&self, pid: u32, command: &str, stdin: Option<ChildStdin>) -> ChildId {
        let mut state = lock(&self.inner);
        let id = ChildId(state.next_id);
        state.next_id += 1;
        state.line.clear();
        state.children.push(ChildEntry {
            id,
            pid,
            command: command.to_string(),
            input: stdin.and_then(|stdin| spawn_input_writer(pid, stdin)),
        });
        tracing::debug!("Registered child {} (`{}`)", pid, command);
        id
    }

    /// Remove a child. Its input pipe closes once queued input is written.
    ///
    /// Returns `false` if it was not registered.
    pub fn deregister(&self, id: ChildId) -> bool {
        let mut state = lock(&self.inner);
        let Some(index) = state.children.iter().position(|c| c.id == id) else {
            return false;
        };
        let entry = state.children.remove(index);
        state.line.clear();
        tracing::debug!("Deregistered child {} (`{}`)", entry.pid, entry.command);
        true
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).children.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).children.is_empty()
    }

    /// Process ids of all live children, oldest first.
    pub fn pids(&self) -> Vec<u32> {
        lock(&self.inner).children.iter().map(|c| c.pid).collect()
    }

    /// Lock the registry for keystroke forwarding.
    ///
    /// Returns `None` when no child is running.
    pub fn foreground(&self) -> Option<Foreground<'_>> {
        let state = lock(&self.inner);
        if state.children.is_empty() {
            None
        } else {
            Some(Foreground { state })
        }
    }

    /// Signal the most recently spawned child. No-op on an empty registry.
    pub fn kill_last(&self, force: bool) -> bool {
        let state = lock(&self.inner);
        match state.children.last() {
            Some(child) => signal(child.pid, KillSignal::from_force(force)),
            None => false,
        }
    }

    /// Signal every live child. Returns how many were signaled.
    pub fn kill_all(&self, force: bool) -> usize {
        let state = lock(&self.inner);
        let kind = KillSignal::from_force(force);
        state
            .children
            .iter()
            .filter(|child| signal(child.pid, kind))
            .count()
    }
}

/// Exclusive access to the foreground child's input.
pub struct Foreground<'a> {
    state: MutexGuard<'a, RegistryState>,
}

impl Foreground<'_> {
    pub fn pid(&self) -> u32 {
        self.entry().pid
    }

    /// Keystrokes typed since the last submit.
    pub fn line(&self) -> &str {
        &self.state.line
    }

    pub fn push(&mut self, c: char) {
        self.state.line.push(c);
    }

    pub fn pop(&mut self) -> Option<char> {
        self.state.line.pop()
    }

    /// Queue the pending line plus a newline for the child and clear it.
    ///
    /// Never blocks on the child. Returns the queued text.
    pub fn submit(&mut self) -> io::Result<String> {
        let mut line = std::mem::take(&mut self.state.line);
        line.push('\n');

        let closed = || io::Error::new(io::ErrorKind::BrokenPipe, "child input closed");
        let input = self.entry().input.as_ref().ok_or_else(closed)?;
        input.send(line.clone()).map_err(|_| closed())?;
        Ok(line)
    }

    fn entry(&self) -> &ChildEntry {
        // Constructed only when at least one child is registered.
        &self.state.children[self.state.children.len() - 1]
    }
}

/// Start the thread that owns `stdin` and writes queued lines to it.
fn spawn_input_writer(pid: u32, mut stdin: ChildStdin) -> Option<Sender<String>> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name(format!("stdin-writer: {}", pid))
        .spawn(move || {
            for line in rx {
                if let Err(e) = stdin.write_all(line.as_bytes()).and_then(|()| stdin.flush()) {
                    tracing::debug!("Input pipe of process {} closed: {}", pid, e);
                    break;
                }
            }
        })
        .map_err(|e| tracing::warn!("Process {} will not receive input: {}", pid, e))
        .ok()?;
    Some(tx)
}

#[cfg(unix)]
fn signal(pid: u32, kind: KillSignal) -> bool {
    let sig = match kind {
        KillSignal::Interrupt => libc::SIGINT,
        KillSignal::Terminate => libc::SIGTERM,
    };
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Children lead their own process group; signal the whole pipeline.
    let rc = unsafe { libc::kill(-pid, sig) };
    if rc != 0 {
        tracing::warn!(
            "Failed to signal process group {}: {}",
            pid,
            io::Error::last_os_error()
        );
    }
    rc == 0
}

#[cfg(not(unix))]
fn signal(pid: u32, kind: KillSignal) -> bool {
    tracing::warn!("Cannot send {:?} to {}: signals unsupported on this platform", kind, pid);
    false
}
