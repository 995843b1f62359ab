//! Work scheduling core for the Sable editor shell.
//!
//! This crate provides:
//! - Coalescing mailboxes that hand work from any thread to the owning thread
//! - A dispatcher that runs mailbox flushes on the owning thread
//! - Progress lines that tick in the console while long work runs
//! - Background parsing with supersede-by-latest scheduling
//! - Single-flight, cancellable background jobs such as completion lookups
//! - An ordered console log fed by child process output
//! - Shell command execution with keystroke forwarding and signals
//! - Source file watching

pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod mailbox;
pub mod parse;
pub mod process;
pub mod progress;
pub mod watcher;

pub use config::Config;
pub use console::{Console, ConsoleWriter, KeyEvent, OutputLog};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use job::{BackgroundJob, CancelToken};
pub use mailbox::{Mailbox, MailboxId};
pub use parse::{
    AnalysisEngine, AnalysisState, ParseEvent, ParseRequest, ParseResult, ParseScheduler,
    RequestCounter,
};
pub use process::{ProcessRegistry, ProcessRunner};
pub use progress::ProgressHandle;
pub use watcher::{FileEvent, SourceWatcher};
