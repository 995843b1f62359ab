//! Owning-thread view of the latest analysis.

use crate::console::Console;
use crate::progress::ProgressHandle;

use super::scheduler::RequestCounter;
use super::types::{Diagnostic, Location, ParseEvent, ParseResult, Range, TypeHint};

/// Tokens, diagnostics and types from the newest applied parse.
///
/// Each applied result replaces the previous one wholesale. Results for
/// requests older than the counter's latest are dropped.
pub struct AnalysisState {
    label: String,
    counter: RequestCounter,
    applied_seq: Option<u64>,
    tokens: Vec<Range>,
    diagnostics: Vec<Diagnostic>,
    types: Vec<TypeHint>,
    progress: Option<ProgressHandle>,
}

impl AnalysisState {
    /// `label` names the parsed unit in console progress lines.
    pub fn new(label: impl Into<String>, counter: RequestCounter) -> Self {
        Self {
            label: label.into(),
            counter,
            applied_seq: None,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
            types: Vec::new(),
            progress: None,
        }
    }

    /// Apply a worker event. Returns `true` if a result was applied.
    ///
    /// With a console, a `Parsing <label>` progress line runs from the first
    /// `Started` until a current result or failure arrives.
    pub fn handle(&mut self, event: ParseEvent, console: Option<&Console>) -> bool {
        match event {
            ParseEvent::Started { .. } => {
                if self.progress.is_none()
                    && let Some(console) = console
                {
                    self.progress = Some(console.start_progress(&self.progress_label()));
                }
                false
            }
            ParseEvent::Finished(result) => self.apply(result),
            ParseEvent::Failed { seq, message } => {
                if !self.counter.is_current(seq) {
                    return false;
                }
                tracing::debug!("Parse {} failed: {}", seq, message);
                if let Some(progress) = self.progress.take() {
                    progress.cancel(&format!("{}... failed: {}", self.progress_label(), message));
                }
                false
            }
            ParseEvent::Superseded { seq } => {
                // Normally a newer parse follows and keeps the line alive.
                // If this was the latest request (the scheduler stopped
                // mid-parse), nothing will finish it.
                if self.counter.is_current(seq)
                    && let Some(progress) = self.progress.take()
                {
                    progress.cancel(&format!("{}... cancelled", self.progress_label()));
                }
                false
            }
        }
    }

    /// Replace the current analysis with `result` if it is still current.
    pub fn apply(&mut self, result: ParseResult) -> bool {
        if !self.counter.is_current(result.seq) {
            tracing::debug!(
                "Dropping stale parse result {} (latest {})",
                result.seq,
                self.counter.latest()
            );
            return false;
        }

        self.applied_seq = Some(result.seq);
        self.tokens = result.tokens;
        self.diagnostics = result.diagnostics;
        self.types = result.types;

        if let Some(progress) = self.progress.take() {
            progress.done(&format!("{}... done", self.progress_label()));
        }
        true
    }

    /// Sequence number of the applied result.
    pub fn applied_seq(&self) -> Option<u64> {
        self.applied_seq
    }

    pub fn is_parsing(&self) -> bool {
        self.progress.is_some()
    }

    pub fn tokens(&self) -> &[Range] {
        &self.tokens
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn types(&self) -> &[TypeHint] {
        &self.types
    }

    /// Innermost type hint covering `location`.
    pub fn type_at(&self, location: Location) -> Option<&TypeHint> {
        self.types
            .iter()
            .filter(|hint| hint.range.contains(location))
            .min_by_key(|hint| {
                let r = hint.range;
                (
                    r.end.line.saturating_sub(r.start.line),
                    r.end.column.abs_diff(r.start.column),
                )
            })
    }

    /// Diagnostics covering `location`.
    pub fn diagnostics_at(&self, location: Location) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.range.contains(location))
    }

    fn progress_label(&self) -> String {
        format!("Parsing {}", self.label)
    }
}
