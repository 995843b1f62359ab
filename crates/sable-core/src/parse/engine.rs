//! Analysis engine interface.

use crate::error::Result;

use super::types::{Diagnostic, ParseRequest, Range, TypeHint};

/// Output of one engine run.
#[derive(Debug)]
pub struct Analysis<U> {
    /// Engine state reused by the next parse (e.g. a translation unit).
    pub unit: U,
    pub tokens: Vec<Range>,
    pub diagnostics: Vec<Diagnostic>,
    pub types: Vec<TypeHint>,
}

/// Source analysis backend.
///
/// The scheduler moves the engine onto its worker thread at spawn time and
/// calls it only from there, one parse at a time. `Unit` never leaves that
/// thread.
pub trait AnalysisEngine: Send + 'static {
    /// Incremental state carried between parses.
    type Unit: Send + 'static;

    /// Parse the request's buffers.
    ///
    /// `previous` is the unit from the last successful parse, or `None` for
    /// the first parse and after a failure. May be slow.
    fn parse(
        &mut self,
        request: &ParseRequest,
        previous: Option<Self::Unit>,
    ) -> Result<Analysis<Self::Unit>>;
}
