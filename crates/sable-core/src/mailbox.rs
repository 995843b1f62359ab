//! Coalescing cross-thread mailbox.
//!
//! Worker threads `post` items; the owning thread drains them in one flush.
//! A mailbox arms its owner at most once per flush: the first post after a
//! flush schedules the next one, later posts only append.
//!
//! ```text
//! worker ──post──▶ [pending: a b c | scheduled] ──arm (once)──▶ Dispatcher
//!                                                                  │
//!                      owning thread ◀── flush: swap + apply a,b,c ┘
//! ```

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Identifies a mailbox within its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailboxId(pub(crate) u64);

impl MailboxId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Arms the owning thread. Returns `false` if the owner is gone.
type ArmFn = dyn Fn(MailboxId) -> bool + Send + Sync;

struct MailboxState<T> {
    pending: Vec<T>,
    scheduled: bool,
    /// Owner gone or mailbox removed; posts are dropped.
    closed: bool,
}

struct MailboxInner<T> {
    id: MailboxId,
    owner: ThreadId,
    state: Mutex<MailboxState<T>>,
    arm: Box<ArmFn>,
}

/// Thread-safe coalescing queue with a single-consumer flush.
///
/// Cloning yields another reference to the same queue.
pub struct Mailbox<T> {
    inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.inner.id)
            .field("pending", &self.pending_len())
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Mailbox<T> {
    /// Create a mailbox owned by `owner`, armed through `arm`.
    pub(crate) fn new(
        id: MailboxId,
        owner: ThreadId,
        arm: impl Fn(MailboxId) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(MailboxInner {
                id,
                owner,
                state: Mutex::new(MailboxState {
                    pending: Vec::new(),
                    scheduled: false,
                    closed: false,
                }),
                arm: Box::new(arm),
            }),
        }
    }

    pub fn id(&self) -> MailboxId {
        self.inner.id
    }

    /// Append an item, arming a flush if none is scheduled.
    ///
    /// Returns `true` if this call armed the owner. Items posted to a closed
    /// mailbox are dropped.
    pub fn post(&self, item: T) -> bool {
        let arm = {
            let mut state = lock(&self.inner.state);
            if state.closed {
                tracing::trace!("Dropping item posted to closed mailbox {:?}", self.inner.id);
                return false;
            }
            state.pending.push(item);
            !mem::replace(&mut state.scheduled, true)
        };

        if arm && !(self.inner.arm)(self.inner.id) {
            tracing::trace!("Mailbox {:?} posted after its owner went away", self.inner.id);
            self.close();
            return false;
        }
        arm
    }

    /// Stop accepting items and drop everything pending.
    pub(crate) fn close(&self) {
        let dropped = {
            let mut state = lock(&self.inner.state);
            state.closed = true;
            state.scheduled = false;
            mem::take(&mut state.pending)
        };
        if !dropped.is_empty() {
            tracing::trace!(
                "Closed mailbox {:?} with {} undelivered items",
                self.inner.id,
                dropped.len()
            );
        }
    }

    /// Whether the mailbox has stopped accepting items.
    pub fn is_closed(&self) -> bool {
        lock(&self.inner.state).closed
    }

    /// Swap out everything pending and clear the scheduled flag.
    ///
    /// Items posted after this returns belong to the next flush.
    pub(crate) fn take(&self) -> Vec<T> {
        let mut state = lock(&self.inner.state);
        state.scheduled = false;
        mem::take(&mut state.pending)
    }

    /// Drain the mailbox and apply every item in post order.
    ///
    /// Must run on the owning thread. `apply` runs outside the lock, so it
    /// may post to this same mailbox; those items wait for the next flush.
    pub fn flush(&self, mut apply: impl FnMut(T)) -> usize {
        debug_assert!(
            self.is_owner_thread(),
            "mailbox {:?} flushed off its owning thread",
            self.inner.id
        );
        let items = self.take();
        let count = items.len();
        for item in items {
            apply(item);
        }
        count
    }

    /// Number of items waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }

    /// Whether a flush is currently armed.
    pub fn is_scheduled(&self) -> bool {
        lock(&self.inner.state).scheduled
    }

    /// Whether the caller runs on the thread that flushes this mailbox.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.inner.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_mailbox<T>() -> (Mailbox<T>, Arc<AtomicUsize>) {
        let arms = Arc::new(AtomicUsize::new(0));
        let counter = arms.clone();
        let mailbox = Mailbox::new(MailboxId(7), thread::current().id(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
        (mailbox, arms)
    }

    #[test]
    fn test_post_coalesces_arming() {
        let (mailbox, arms) = counting_mailbox();

        assert!(mailbox.post(1));
        assert!(!mailbox.post(2));
        assert!(!mailbox.post(3));
        assert_eq!(arms.load(Ordering::SeqCst), 1);
        assert!(mailbox.is_scheduled());
        assert_eq!(mailbox.pending_len(), 3);
    }

    #[test]
    fn test_flush_drains_in_order_and_rearms() {
        let (mailbox, arms) = counting_mailbox();
        mailbox.post("a");
        mailbox.post("b");

        let mut seen = Vec::new();
        assert_eq!(mailbox.flush(|item| seen.push(item)), 2);
        assert_eq!(seen, vec!["a", "b"]);
        assert!(!mailbox.is_scheduled());

        assert!(mailbox.post("c"));
        assert_eq!(arms.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_post_during_flush_is_deferred() {
        let (mailbox, _arms) = counting_mailbox();
        mailbox.post(1);

        let inner = mailbox.clone();
        let mut seen = Vec::new();
        mailbox.flush(|item| {
            seen.push(item);
            inner.post(item + 1);
        });

        assert_eq!(seen, vec![1]);
        assert_eq!(mailbox.pending_len(), 1);
        assert!(mailbox.is_scheduled());
    }

    #[test]
    fn test_empty_flush() {
        let (mailbox, arms) = counting_mailbox::<u8>();
        assert_eq!(mailbox.flush(|_| panic!("nothing pending")), 0);
        assert_eq!(arms.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_post_after_owner_gone() {
        let mailbox = Mailbox::new(MailboxId(1), thread::current().id(), |_| false);
        assert!(!mailbox.post(1));
        assert!(mailbox.is_closed());
        for i in 0..1000 {
            assert!(!mailbox.post(i));
        }
        assert_eq!(mailbox.pending_len(), 0);
        assert!(!mailbox.is_scheduled());
    }

    #[test]
    fn test_close_drops_pending_and_later_posts() {
        let (mailbox, arms) = counting_mailbox();
        mailbox.post(1);
        mailbox.post(2);
        mailbox.close();

        assert_eq!(mailbox.pending_len(), 0);
        assert!(!mailbox.post(3));
        assert_eq!(mailbox.pending_len(), 0);
        assert_eq!(arms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_owner_thread_detection() {
        let (mailbox, _arms) = counting_mailbox::<u8>();
        assert!(mailbox.is_owner_thread());

        let remote = mailbox.clone();
        let off_owner = thread::spawn(move || remote.is_owner_thread())
            .join()
            .unwrap();
        assert!(!off_owner);
    }
}
