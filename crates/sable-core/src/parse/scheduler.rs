//! Background parse scheduling.
//!
//! One long-lived worker thread runs the analysis engine. Requests replace
//! each other rather than queueing: the worker always parses the newest
//! snapshot, and a parse whose request was superseded while it ran has its
//! result dropped.
//!
//! ```text
//!            request               debounce elapsed
//!   Idle ───────────────▶ Requested ────────────────▶ Parsing
//!    ▲                     │   ▲ request                │
//!    │                     └───┘ (supersede)            │ request
//!    │                                                  ▼
//!    └──────── engine returns, nothing queued ──── Parsing + queued
//!                                                       │ engine returns
//!                                                       ▼
//!                                                   Requested
//!
//!   any ── stop ──▶ Stopped
//! ```

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ParseConfig;
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, lock};

use super::engine::AnalysisEngine;
use super::types::{ParseEvent, ParseRequest, ParseResult};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Requested,
    Parsing,
    Stopped,
}

/// Monotonic request counter shared by the scheduler and result consumers.
///
/// Results whose sequence number is below [`RequestCounter::latest`] are
/// stale.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter {
    latest: Arc<AtomicU64>,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the newest issued request, `0` if none.
    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Whether `seq` is the newest issued request.
    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.latest()
    }

    pub(crate) fn advance(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::AcqRel) + 1
    }
}

struct Pending {
    request: ParseRequest,
    since: Instant,
}

enum Phase {
    Idle,
    Requested(Pending),
    Parsing { seq: u64, queued: Option<Pending> },
    Stopped,
}

struct Shared {
    phase: Mutex<Phase>,
    wake: Condvar,
}

impl Shared {
    /// Block until a request has waited out the debounce, or until stopped.
    fn next_request(&self, debounce: Duration, poll: Duration) -> Option<ParseRequest> {
        let mut phase = lock(&self.phase);
        loop {
            match mem::replace(&mut *phase, Phase::Idle) {
                Phase::Stopped => {
                    *phase = Phase::Stopped;
                    return None;
                }
                Phase::Requested(pending) if pending.since.elapsed() >= debounce => {
                    *phase = Phase::Parsing {
                        seq: pending.request.seq(),
                        queued: None,
                    };
                    return Some(pending.request);
                }
                other => *phase = other,
            }
            phase = self
                .wake
                .wait_timeout(phase, poll)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Leave `Parsing`. Returns `true` if no newer request arrived meanwhile.
    fn finish_parse(&self) -> bool {
        let mut phase = lock(&self.phase);
        let (next, current) = match mem::replace(&mut *phase, Phase::Idle) {
            Phase::Parsing { queued: None, .. } => (Phase::Idle, true),
            Phase::Parsing {
                queued: Some(pending),
                ..
            } => (Phase::Requested(pending), false),
            Phase::Stopped => (Phase::Stopped, false),
            other => (other, true),
        };
        *phase = next;
        current
    }
}

/// Runs an [`AnalysisEngine`] on a dedicated worker thread.
pub struct ParseScheduler {
    shared: Arc<Shared>,
    counter: RequestCounter,
    thread: Option<JoinHandle<()>>,
}

impl ParseScheduler {
    /// Move `engine` onto a new worker thread.
    ///
    /// Lifecycle events are posted to `events`; `counter` numbers requests
    /// and is typically shared with whoever applies the results.
    pub fn spawn<E: AnalysisEngine>(
        engine: E,
        events: Mailbox<ParseEvent>,
        counter: RequestCounter,
        config: &ParseConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            phase: Mutex::new(Phase::Idle),
            wake: Condvar::new(),
        });

        let worker = Worker {
            shared: shared.clone(),
            events,
            debounce: config.debounce(),
            poll: config.poll_interval(),
        };
        let thread = thread::Builder::new()
            .name("parse-worker".to_string())
            .spawn(move || worker.run(engine))?;

        Ok(Self {
            shared,
            counter,
            thread: Some(thread),
        })
    }

    /// Issue a new request, superseding any that has not started yet.
    ///
    /// Returns the request's sequence number.
    pub fn request(&self, mut request: ParseRequest) -> Result<u64> {
        let mut phase = lock(&self.shared.phase);
        if matches!(*phase, Phase::Stopped) {
            return Err(Error::SchedulerStopped);
        }

        let seq = self.counter.advance();
        request.set_seq(seq);
        let pending = Pending {
            request,
            since: Instant::now(),
        };

        *phase = match mem::replace(&mut *phase, Phase::Idle) {
            Phase::Requested(old) => {
                tracing::debug!("Parse request {} superseded by {}", old.request.seq(), seq);
                Phase::Requested(pending)
            }
            Phase::Parsing {
                seq: running,
                queued,
            } => {
                if let Some(old) = queued {
                    tracing::debug!("Parse request {} superseded by {}", old.request.seq(), seq);
                }
                Phase::Parsing {
                    seq: running,
                    queued: Some(pending),
                }
            }
            Phase::Idle | Phase::Stopped => Phase::Requested(pending),
        };
        drop(phase);

        self.shared.wake.notify_one();
        Ok(seq)
    }

    pub fn state(&self) -> SchedulerState {
        match *lock(&self.shared.phase) {
            Phase::Idle => SchedulerState::Idle,
            Phase::Requested(_) => SchedulerState::Requested,
            Phase::Parsing { .. } => SchedulerState::Parsing,
            Phase::Stopped => SchedulerState::Stopped,
        }
    }

    /// Sequence number of the request currently being parsed.
    pub fn parsing_seq(&self) -> Option<u64> {
        match *lock(&self.shared.phase) {
            Phase::Parsing { seq, .. } => Some(seq),
            _ => None,
        }
    }

    pub fn counter(&self) -> &RequestCounter {
        &self.counter
    }

    /// Ask the worker to exit at its next poll. Irreversible.
    pub fn stop(&self) {
        *lock(&self.shared.phase) = Phase::Stopped;
        self.shared.wake.notify_all();
    }
}

impl Drop for ParseScheduler {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("Parse worker panicked");
        }
    }
}

struct Worker {
    shared: Arc<Shared>,
    events: Mailbox<ParseEvent>,
    debounce: Duration,
    poll: Duration,
}

impl Worker {
    fn run<E: AnalysisEngine>(self, mut engine: E) {
        let mut unit: Option<E::Unit> = None;

        while let Some(request) = self.shared.next_request(self.debounce, self.poll) {
            let seq = request.seq();
            self.events.post(ParseEvent::Started { seq });

            let started = Instant::now();
            let previous = unit.take();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.parse(&request, previous)))
                .unwrap_or_else(|_| Err(Error::engine("analysis engine panicked")));
            let elapsed = started.elapsed();

            let current = self.shared.finish_parse();
            let event = match outcome {
                Ok(analysis) => {
                    unit = Some(analysis.unit);
                    if current {
                        tracing::debug!("Parse {} finished in {:?}", seq, elapsed);
                        ParseEvent::Finished(ParseResult {
                            seq,
                            tokens: analysis.tokens,
                            diagnostics: analysis.diagnostics,
                            types: analysis.types,
                            elapsed,
                        })
                    } else {
                        tracing::debug!("Discarding stale parse {}", seq);
                        ParseEvent::Superseded { seq }
                    }
                }
                Err(e) if current => ParseEvent::Failed {
                    seq,
                    message: e.to_string(),
                },
                Err(e) => {
                    tracing::debug!("Stale parse {} failed: {}", seq, e);
                    ParseEvent::Superseded { seq }
                }
            };
            self.events.post(event);
        }

        tracing::debug!("Parse worker exiting");
    }
}
