//! Background parsing with supersede-by-latest scheduling.
//!
//! The editing surface hands [`ParseRequest`] snapshots to a
//! [`ParseScheduler`], which feeds them one at a time to an
//! [`AnalysisEngine`] on a worker thread. Results come back as
//! [`ParseEvent`]s through a mailbox and are applied to an
//! [`AnalysisState`] on the owning thread.

mod engine;
mod scheduler;
mod state;
mod types;

pub use engine::{Analysis, AnalysisEngine};
pub use scheduler::{ParseScheduler, RequestCounter, SchedulerState};
pub use state::AnalysisState;
pub use types::{
    BufferSnapshot, Diagnostic, Location, ParseEvent, ParseRequest, ParseResult, Range, Severity,
    TypeHint,
};
