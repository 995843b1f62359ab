//! Data exchanged between the editing surface, the parse worker and the
//! analysis engine.

use std::collections::BTreeMap;
use std::ops;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full text of every open buffer, keyed by file path.
pub type BufferSnapshot = BTreeMap<PathBuf, String>;

/// Zero-based position in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Span between two locations, tagged with an engine-defined kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Location,
    pub end: Location,
    pub kind: u32,
}

impl Range {
    pub fn new(start: Location, end: Location, kind: u32) -> Self {
        Self { start, end, kind }
    }

    /// Whether `location` falls inside the half-open span.
    pub fn contains(&self, location: Location) -> bool {
        self.start <= location && location < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// Problem reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub range: Range,
    pub severity: Severity,
    pub message: String,
}

/// Type of the expression covering `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeHint {
    pub range: Range,
    pub type_name: String,
}

/// Snapshot of open buffers handed to the parse worker.
///
/// The sequence number is assigned by the scheduler when the request is
/// issued; later requests always carry larger numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    seq: u64,
    buffers: BufferSnapshot,
    hint: Option<ops::Range<usize>>,
}

impl ParseRequest {
    pub fn new(buffers: BufferSnapshot) -> Self {
        Self {
            seq: 0,
            buffers,
            hint: None,
        }
    }

    /// Request for a single buffer.
    pub fn single(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let mut buffers = BufferSnapshot::new();
        buffers.insert(path.into(), text.into());
        Self::new(buffers)
    }

    /// Restrict highlighting work to a byte range of the primary buffer.
    pub fn with_hint(mut self, hint: ops::Range<usize>) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Sequence number, `0` until issued.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn buffers(&self) -> &BufferSnapshot {
        &self.buffers
    }

    pub fn buffer(&self, path: &Path) -> Option<&str> {
        self.buffers.get(path).map(String::as_str)
    }

    pub fn hint(&self) -> Option<ops::Range<usize>> {
        self.hint.clone()
    }
}

/// Everything a finished parse produced, minus the engine's own unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub seq: u64,
    pub tokens: Vec<Range>,
    pub diagnostics: Vec<Diagnostic>,
    pub types: Vec<TypeHint>,
    pub elapsed: Duration,
}

/// Notification posted by the parse worker to the owning thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// The worker picked up request `seq`.
    Started { seq: u64 },
    /// Request `seq` parsed and no newer request was waiting.
    Finished(ParseResult),
    /// The engine failed on request `seq`.
    Failed { seq: u64, message: String },
    /// Request `seq` finished but a newer one had arrived; its result was dropped.
    Superseded { seq: u64 },
}

impl ParseEvent {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Started { seq } | Self::Failed { seq, .. } | Self::Superseded { seq } => *seq,
            Self::Finished(result) => result.seq,
        }
    }
}
