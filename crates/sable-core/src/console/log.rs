//! Append-only, line-addressable output log.

/// A run of text with uniform emphasis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub emphasis: bool,
}

/// One line of the log, without its trailing newline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLine {
    spans: Vec<Span>,
}

impl LogLine {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Plain text of the line.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Whether any part of the line is emphasized.
    pub fn has_emphasis(&self) -> bool {
        self.spans.iter().any(|s| s.emphasis && !s.text.is_empty())
    }

    fn push(&mut self, text: &str, emphasis: bool) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.emphasis == emphasis => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                emphasis,
            }),
        }
    }

    fn pop_char(&mut self) -> Option<char> {
        let last = self.spans.last_mut()?;
        let c = last.text.pop();
        if last.text.is_empty() {
            self.spans.pop();
        }
        c
    }
}

/// The console's text. Always holds at least one (possibly empty) line; the
/// last line is where appends land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLog {
    lines: Vec<LogLine>,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLog {
    pub fn new() -> Self {
        Self {
            lines: vec![LogLine::default()],
        }
    }

    /// Append `text` at the end of the log.
    ///
    /// Returns the index of the line the text started on.
    pub fn append(&mut self, text: &str, emphasis: bool) -> usize {
        let start = self.lines.len() - 1;
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            self.last_line_mut().push(first, emphasis);
        }
        for part in parts {
            let mut line = LogLine::default();
            line.push(part, emphasis);
            self.lines.push(line);
        }
        start
    }

    /// Append `text` to the end of line `line`.
    ///
    /// Returns `false` if the line does not exist. Newlines in `text` are
    /// kept on the same line as spaces.
    pub fn append_at_line(&mut self, line: usize, text: &str) -> bool {
        match self.lines.get_mut(line) {
            Some(target) => {
                target.push(&text.replace('\n', " "), false);
                true
            }
            None => false,
        }
    }

    /// Replace the content of line `line`.
    pub fn replace_line(&mut self, line: usize, text: &str) -> bool {
        match self.lines.get_mut(line) {
            Some(target) => {
                *target = LogLine::default();
                target.push(&text.replace('\n', " "), false);
                true
            }
            None => false,
        }
    }

    /// Remove the last character of the log, if it is not a line break.
    pub fn pop_char(&mut self) -> Option<char> {
        self.last_line_mut().pop_char()
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&LogLine> {
        self.lines.get(index)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Plain text of the whole log.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(LogLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn last_line_mut(&mut self) -> &mut LogLine {
        if self.lines.is_empty() {
            self.lines.push(LogLine::default());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}
