//! In-place progress lines for long-running operations.
//!
//! A [`ProgressHandle`] owns a timer thread that appends a `.` to its console
//! line every `ticks_per_report` polls. The first of `done`, `cancel` or drop
//! stops the timer; `done`/`cancel` also replace the line with a final
//! message. Later calls do nothing.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ProgressConfig;
use crate::console::ConsoleWriter;
use crate::mailbox::lock;

struct Ticker {
    /// Held while posting a tick so a final message can never precede one.
    stopped: Mutex<bool>,
    writer: ConsoleWriter,
    line: usize,
}

impl Ticker {
    /// Post a tick unless stopped. Returns `false` once stopped.
    fn tick(&self) -> bool {
        let stopped = lock(&self.stopped);
        if *stopped {
            return false;
        }
        self.writer.write_at_line(self.line, ".");
        true
    }

    fn is_stopped(&self) -> bool {
        *lock(&self.stopped)
    }

    /// Stop, posting `message` as the line's final content.
    fn finish(&self, message: Option<&str>) -> bool {
        let mut stopped = lock(&self.stopped);
        if *stopped {
            return false;
        }
        *stopped = true;
        if let Some(message) = message {
            self.writer.replace_line(self.line, message);
        }
        true
    }
}

/// Handle to a ticking progress line.
pub struct ProgressHandle {
    label: String,
    ticker: Arc<Ticker>,
    thread: Option<JoinHandle<()>>,
}

impl ProgressHandle {
    /// Start ticking line `line`, which already shows `label...`.
    pub fn start(
        label: &str,
        line: usize,
        writer: ConsoleWriter,
        config: &ProgressConfig,
    ) -> Self {
        let ticker = Arc::new(Ticker {
            stopped: Mutex::new(false),
            writer,
            line,
        });

        let poll = config.poll_interval();
        let every = u64::from(config.ticks_per_report.max(1));
        let thread_ticker = ticker.clone();
        let thread = thread::Builder::new()
            .name(format!("progress: {}", label))
            .spawn(move || run_ticker(&thread_ticker, poll, every))
            .map_err(|e| tracing::warn!("Progress line `{}` will not tick: {}", label, e))
            .ok();

        Self {
            label: label.to_string(),
            ticker,
            thread,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Console line this progress reports on.
    pub fn line(&self) -> usize {
        self.ticker.line
    }

    pub fn is_stopped(&self) -> bool {
        self.ticker.is_stopped()
    }

    /// Finish successfully. Returns `false` if already stopped.
    pub fn done(&self, message: &str) -> bool {
        self.ticker.finish(Some(message))
    }

    /// Finish unsuccessfully. Returns `false` if already stopped.
    pub fn cancel(&self, message: &str) -> bool {
        let stopped = self.ticker.finish(Some(message));
        if stopped {
            tracing::debug!("Progress `{}` cancelled: {}", self.label, message);
        }
        stopped
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.ticker.finish(None);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("Progress thread for `{}` panicked", self.label);
        }
    }
}

fn run_ticker(ticker: &Ticker, poll: Duration, every: u64) {
    let mut polls: u64 = 0;
    loop {
        polls += 1;
        thread::sleep(poll);
        if polls % every == 0 {
            if !ticker.tick() {
                return;
            }
        } else if ticker.is_stopped() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::dispatch::Dispatcher;
    use crate::process::ProcessRegistry;
    use std::time::Instant;

    fn fast_config() -> ProgressConfig {
        ProgressConfig {
            poll_ms: 2,
            ticks_per_report: 5,
        }
    }

    fn console(config: ProgressConfig) -> (Dispatcher, Console) {
        let mut dispatcher = Dispatcher::new();
        let console = Console::new(&mut dispatcher, ProcessRegistry::new(), config);
        (dispatcher, console)
    }

    #[test]
    fn test_done_replaces_line() {
        let (mut dispatcher, console) = console(ProgressConfig::default());
        let progress = console.start_progress("Building");
        assert_eq!(console.log().line(progress.line()).unwrap().text(), "Building...");

        assert!(progress.done("Build succeeded"));
        dispatcher.pump();
        assert_eq!(console.text(), "Build succeeded\n");
    }

    #[test]
    fn test_second_terminal_call_is_noop() {
        let (mut dispatcher, console) = console(ProgressConfig::default());
        let progress = console.start_progress("Building");

        assert!(progress.done("Build succeeded"));
        assert!(!progress.cancel("Build cancelled"));
        assert!(!progress.done("Build succeeded again"));
        dispatcher.pump();

        assert_eq!(console.text(), "Build succeeded\n");
    }

    #[test]
    fn test_ticks_then_no_more_after_done() {
        let (mut dispatcher, console) = console(fast_config());
        let progress = console.start_progress("Indexing");
        let line = progress.line();

        let ticked = dispatcher.run_until(Duration::from_secs(2), || {
            console.log().line(line).unwrap().text().ends_with("....")
        });
        assert!(ticked, "progress line never ticked");

        assert!(progress.cancel("Indexing cancelled"));
        dispatcher.pump();
        thread::sleep(Duration::from_millis(40));
        dispatcher.pump();

        assert_eq!(console.log().line(line).unwrap().text(), "Indexing cancelled");
    }

    #[test]
    fn test_drop_stops_thread_promptly() {
        let (mut dispatcher, console) = console(ProgressConfig::default());
        let progress = console.start_progress("Waiting");
        assert!(!progress.is_stopped());

        let start = Instant::now();
        drop(progress);
        assert!(start.elapsed() < Duration::from_millis(500));

        dispatcher.pump();
        assert_eq!(console.text(), "Waiting...\n");
    }
}
