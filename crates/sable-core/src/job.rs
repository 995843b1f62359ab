//! Single-flight background jobs with owning-thread delivery.
//!
//! Used for on-demand work such as completion lookups: at most one job runs
//! at a time, a new start while one is running is refused, and a cancelled
//! job's result is dropped instead of delivered.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::mailbox::Mailbox;

/// Cancellation view handed to running work.
#[derive(Debug, Clone)]
pub struct CancelToken {
    id: u64,
    wanted: Arc<AtomicU64>,
}

impl CancelToken {
    /// Whether the owner no longer wants this job's result.
    pub fn is_cancelled(&self) -> bool {
        self.wanted.load(Ordering::Acquire) != self.id
    }
}

/// Runs one job at a time off the owning thread and delivers its result
/// through a mailbox.
pub struct BackgroundJob<T> {
    name: String,
    running: Arc<AtomicBool>,
    /// Id of the job whose result should be delivered, `0` for none.
    wanted: Arc<AtomicU64>,
    next_id: u64,
    results: Mailbox<(u64, T)>,
}

impl<T: Send + 'static> BackgroundJob<T> {
    /// Create a job slot whose results are applied by `handler` on the
    /// dispatcher's thread.
    pub fn new<F>(name: &str, dispatcher: &mut Dispatcher, mut handler: F) -> Self
    where
        F: FnMut(T) + 'static,
    {
        let wanted = Arc::new(AtomicU64::new(0));
        let check = wanted.clone();
        let label = name.to_string();
        let results = dispatcher.mailbox(move |(id, result): (u64, T)| {
            if check.compare_exchange(id, 0, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                handler(result);
            } else {
                tracing::debug!("Dropping cancelled {} job {}", label, id);
            }
        });

        Self {
            name: name.to_string(),
            running: Arc::new(AtomicBool::new(false)),
            wanted,
            next_id: 0,
            results,
        }
    }

    /// Start `work` on a new thread unless a job is already running.
    ///
    /// Returns the job id, or `None` if refused.
    pub fn start<W>(&mut self, work: W) -> Result<Option<u64>>
    where
        W: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("{} job already running", self.name);
            return Ok(None);
        }

        self.next_id += 1;
        let id = self.next_id;
        self.wanted.store(id, Ordering::Release);

        let token = CancelToken {
            id,
            wanted: self.wanted.clone(),
        };
        let running = self.running.clone();
        let results = self.results.clone();
        let spawned = thread::Builder::new()
            .name(format!("job: {}", self.name))
            .spawn(move || {
                let result = work(&token);
                running.store(false, Ordering::Release);
                if token.is_cancelled() {
                    tracing::trace!("Job {} finished after cancellation", token.id);
                } else {
                    results.post((token.id, result));
                }
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::Release);
            self.wanted.store(0, Ordering::Release);
            return Err(e.into());
        }
        Ok(Some(id))
    }

    /// Drop the result of the current job, if any. The job itself runs to
    /// completion unless it polls its [`CancelToken`].
    pub fn cancel(&self) {
        let id = self.wanted.swap(0, Ordering::AcqRel);
        if id != 0 {
            tracing::debug!("Cancelled {} job {}", self.name, id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::time::Duration;

    fn job(dispatcher: &mut Dispatcher) -> (BackgroundJob<String>, Rc<RefCell<Vec<String>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let job = BackgroundJob::new("complete", dispatcher, move |r: String| {
            sink.borrow_mut().push(r)
        });
        (job, seen)
    }

    #[test]
    fn test_result_is_delivered_on_owner() {
        let mut dispatcher = Dispatcher::new();
        let (mut job, seen) = job(&mut dispatcher);

        assert_eq!(job.start(|_| "push_back".to_string()).unwrap(), Some(1));
        assert!(dispatcher.run_until(Duration::from_secs(5), || !seen.borrow().is_empty()));
        assert_eq!(seen.borrow().as_slice(), ["push_back"]);
        assert!(!job.is_running());
    }

    #[test]
    fn test_second_start_is_refused_while_running() {
        let mut dispatcher = Dispatcher::new();
        let (mut job, seen) = job(&mut dispatcher);
        let (release, gate) = mpsc::channel::<()>();

        assert!(
            job.start(move |_| {
                let _ = gate.recv();
                "first".to_string()
            })
            .unwrap()
            .is_some()
        );
        assert_eq!(job.start(|_| "second".to_string()).unwrap(), None);

        release.send(()).unwrap();
        assert!(dispatcher.run_until(Duration::from_secs(5), || !seen.borrow().is_empty()));
        assert_eq!(seen.borrow().as_slice(), ["first"]);
    }

    #[test]
    fn test_cancelled_result_is_dropped() {
        let mut dispatcher = Dispatcher::new();
        let (mut job, seen) = job(&mut dispatcher);
        let (release, gate) = mpsc::channel::<()>();
        let (observed_tx, observed) = mpsc::channel::<bool>();

        job.start(move |token| {
            let _ = gate.recv();
            let _ = observed_tx.send(token.is_cancelled());
            "stale".to_string()
        })
        .unwrap();
        job.cancel();
        release.send(()).unwrap();

        assert!(observed.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(dispatcher.run_until(Duration::from_secs(5), || !job.is_running()));
        dispatcher.pump_timeout(Duration::from_millis(50));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_cancel_after_post_drops_on_owner() {
        let mut dispatcher = Dispatcher::new();
        let (mut job, seen) = job(&mut dispatcher);

        job.start(|_| "late".to_string()).unwrap();
        while job.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        // Queued (or about to be) but not applied yet.
        job.cancel();
        dispatcher.pump_timeout(Duration::from_millis(50));
        assert!(seen.borrow().is_empty());

        job.start(|_| "fresh".to_string()).unwrap();
        assert!(dispatcher.run_until(Duration::from_secs(5), || !seen.borrow().is_empty()));
        assert_eq!(seen.borrow().as_slice(), ["fresh"]);
    }
}
