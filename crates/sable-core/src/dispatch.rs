//! Owning-thread dispatcher.
//!
//! The dispatcher is the owning thread's notification channel. Each
//! [`Mailbox`] it creates arms it through a wakeup channel; the owner then
//! calls [`Dispatcher::pump`] (or one of its blocking variants) from its event
//! loop to run the flushes.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::mailbox::{Mailbox, MailboxId};

/// Granularity of [`Dispatcher::run_until`] predicate checks.
const RUN_UNTIL_SLICE: Duration = Duration::from_millis(10);

/// Flush and close steps for one registered mailbox.
struct Handler {
    flush: Box<dyn FnMut() -> usize>,
    close: Box<dyn Fn()>,
}

/// Runs mailbox flushes on the thread that created it.
///
/// Not `Send`: handlers may capture owning-thread state such as
/// `Rc<RefCell<_>>`.
pub struct Dispatcher {
    owner: ThreadId,
    tx: Sender<MailboxId>,
    rx: Receiver<MailboxId>,
    handlers: FxHashMap<MailboxId, Handler>,
    next_id: u64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher owned by the calling thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            owner: thread::current().id(),
            tx,
            rx,
            handlers: FxHashMap::default(),
            next_id: 0,
        }
    }

    /// Create a mailbox whose items are applied by `handler` on this thread.
    pub fn mailbox<T, F>(&mut self, mut handler: F) -> Mailbox<T>
    where
        T: Send + 'static,
        F: FnMut(T) + 'static,
    {
        let id = MailboxId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let mailbox = Mailbox::new(id, self.owner, move |id| tx.send(id).is_ok());

        let drain = mailbox.clone();
        let closing = mailbox.clone();
        self.handlers.insert(
            id,
            Handler {
                flush: Box::new(move || drain.flush(&mut handler)),
                close: Box::new(move || closing.close()),
            },
        );

        mailbox
    }

    /// Stop flushing a mailbox. Pending and later posts are dropped.
    pub fn remove<T>(&mut self, mailbox: &Mailbox<T>) {
        self.handlers.remove(&mailbox.id());
        mailbox.close();
    }

    /// Whether the caller runs on the owning thread.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run every flush whose wakeup has already arrived. Never blocks.
    ///
    /// Returns the number of items applied. Wakeups that arrive while
    /// pumping are left for the next call.
    pub fn pump(&mut self) -> usize {
        let ready: Vec<MailboxId> = self.rx.try_iter().collect();
        ready.into_iter().map(|id| self.flush(id)).sum()
    }

    /// Wait up to `timeout` for a wakeup, then pump.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(id) => self.flush(id) + self.pump(),
            // The dispatcher holds a sender, so the channel cannot disconnect.
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pump until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until(&mut self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump_timeout((deadline - now).min(RUN_UNTIL_SLICE));
        }
    }

    fn flush(&mut self, id: MailboxId) -> usize {
        debug_assert!(self.is_owner_thread(), "dispatcher pumped off its owning thread");
        match self.handlers.get_mut(&id) {
            Some(handler) => (handler.flush)(),
            None => {
                tracing::warn!("Wakeup for unknown mailbox {:?}", id);
                0
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for handler in self.handlers.values() {
            (handler.close)();
        }
    }
}
