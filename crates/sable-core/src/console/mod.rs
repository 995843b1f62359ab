//! Console: ordered output sink with keystroke forwarding.
//!
//! The console owns an [`OutputLog`] that only the owning thread mutates.
//! Other threads write through a [`ConsoleWriter`], which queues records in
//! two independent mailboxes:
//!
//! - end appends ([`OutputRecord`]), used by process readers and messages,
//! - line edits ([`LineEdit`]), used by progress lines updating in place.
//!
//! Each stream keeps its own submission order; the two streams may
//! interleave freely.

mod log;

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::config::ProgressConfig;
use crate::dispatch::Dispatcher;
use crate::mailbox::Mailbox;
use crate::process::ProcessRegistry;
use crate::progress::ProgressHandle;

pub use log::{LogLine, OutputLog, Span};

/// Text appended at the end of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub text: String,
    pub emphasis: bool,
}

/// Edit targeting an existing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEdit {
    /// Append text at the end of the line.
    Append { line: usize, text: String },
    /// Replace the line's content.
    Replace { line: usize, text: String },
}

/// Key press delivered to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Char(char),
    Backspace,
    Enter,
    /// Anything without console meaning (arrows, function keys...).
    Other,
}

/// Thread-safe handle for writing to the console from any thread.
///
/// Every write is queued, even on the owning thread, and shows up at the
/// next dispatcher pump. Use [`Console`] for immediate owning-thread writes.
#[derive(Clone, Debug)]
pub struct ConsoleWriter {
    appends: Mailbox<OutputRecord>,
    edits: Mailbox<LineEdit>,
}

impl ConsoleWriter {
    /// Queue text for the end of the log.
    pub fn write(&self, text: impl Into<String>, emphasis: bool) {
        self.appends.post(OutputRecord {
            text: text.into(),
            emphasis,
        });
    }

    /// Queue text for the end of line `line`.
    pub fn write_at_line(&self, line: usize, text: impl Into<String>) {
        self.edits.post(LineEdit::Append {
            line,
            text: text.into(),
        });
    }

    /// Queue a replacement of line `line`.
    pub fn replace_line(&self, line: usize, text: impl Into<String>) {
        self.edits.post(LineEdit::Replace {
            line,
            text: text.into(),
        });
    }
}

/// Owning-thread side of the console.
///
/// Writes made here apply immediately; writes from other threads go through
/// [`Console::writer`] and apply when the dispatcher pumps.
pub struct Console {
    log: Rc<RefCell<OutputLog>>,
    writer: ConsoleWriter,
    registry: ProcessRegistry,
    progress: ProgressConfig,
}

impl Console {
    /// Create a console flushed by `dispatcher`.
    pub fn new(
        dispatcher: &mut Dispatcher,
        registry: ProcessRegistry,
        progress: ProgressConfig,
    ) -> Self {
        let log = Rc::new(RefCell::new(OutputLog::new()));

        let append_log = log.clone();
        let appends = dispatcher.mailbox(move |record: OutputRecord| {
            append_log.borrow_mut().append(&record.text, record.emphasis);
        });

        let edit_log = log.clone();
        let edits = dispatcher.mailbox(move |edit: LineEdit| {
            let mut log = edit_log.borrow_mut();
            let applied = match &edit {
                LineEdit::Append { line, text } => log.append_at_line(*line, text),
                LineEdit::Replace { line, text } => log.replace_line(*line, text),
            };
            if !applied {
                tracing::warn!("Dropped console edit for missing line: {:?}", edit);
            }
        });

        Self {
            log,
            writer: ConsoleWriter { appends, edits },
            registry,
            progress,
        }
    }

    /// Handle for writing from other threads.
    pub fn writer(&self) -> ConsoleWriter {
        self.writer.clone()
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Append text at the end of the log.
    ///
    /// Returns the line the text started on.
    pub fn write(&self, text: &str, emphasis: bool) -> usize {
        self.log.borrow_mut().append(text, emphasis)
    }

    /// Append text at the end of line `line`.
    pub fn write_at_line(&self, line: usize, text: &str) -> bool {
        self.log.borrow_mut().append_at_line(line, text)
    }

    pub fn log(&self) -> Ref<'_, OutputLog> {
        self.log.borrow()
    }

    /// Plain text of the whole log.
    pub fn text(&self) -> String {
        self.log.borrow().text()
    }

    /// Print `label...` and keep it ticking until the handle finishes.
    ///
    /// The label always gets a line of its own, so finishing it never
    /// overwrites earlier output such as an unterminated prompt.
    pub fn start_progress(&self, label: &str) -> ProgressHandle {
        let mut log = self.log.borrow_mut();
        let last = log.line_count().saturating_sub(1);
        if log.line(last).is_some_and(|l| !l.text().is_empty()) {
            log.append("\n", false);
        }
        let line = log.append(&format!("{}...\n", label), false);
        drop(log);
        ProgressHandle::start(label, line, self.writer(), &self.progress)
    }

    /// Route a key press to the foreground child, if any.
    ///
    /// Printable ASCII is buffered and echoed, backspace removes the last
    /// buffered character, enter sends the buffered line plus a newline to
    /// the child. Returns `false` (not consumed) when no child is running.
    pub fn read_key(&self, key: KeyEvent) -> bool {
        let Some(mut foreground) = self.registry.foreground() else {
            return false;
        };

        match key {
            KeyEvent::Char(c) if (' '..='~').contains(&c) => {
                foreground.push(c);
                self.log.borrow_mut().append(c.encode_utf8(&mut [0; 4]), false);
            }
            KeyEvent::Backspace => {
                if foreground.pop().is_some() {
                    self.log.borrow_mut().pop_char();
                }
            }
            KeyEvent::Enter => {
                if let Err(e) = foreground.submit() {
                    tracing::warn!(
                        "Failed to forward input to process {}: {}",
                        foreground.pid(),
                        e
                    );
                }
                self.log.borrow_mut().append("\n", false);
            }
            KeyEvent::Char(_) | KeyEvent::Other => {}
        }
        true
    }
}
