//! Incremental terminal rendering of the console log.

use std::io::{self, Write};

use sable_core::console::OutputLog;

const EMPHASIS: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints the part of the log that has not been printed yet.
#[derive(Debug, Default)]
pub struct Renderer {
    line: usize,
    column: usize,
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Print everything after the cursor and move it to the end of the log.
    pub fn render(&mut self, log: &OutputLog, out: &mut impl Write) -> io::Result<()> {
        let last = log.line_count().saturating_sub(1);
        for (index, line) in log.lines().iter().enumerate().skip(self.line) {
            let mut skip = if index == self.line { self.column } else { 0 };
            for span in line.spans() {
                let count = span.text.chars().count();
                if skip >= count {
                    skip -= count;
                    continue;
                }
                let text: String = span.text.chars().skip(skip).collect();
                skip = 0;
                if span.emphasis && self.color {
                    write!(out, "{}{}{}", EMPHASIS, text, RESET)?;
                } else {
                    out.write_all(text.as_bytes())?;
                }
            }
            if index < last {
                out.write_all(b"\n")?;
            }
        }
        out.flush()?;
        self.skip_to_end(log);
        Ok(())
    }

    /// Treat the whole log as printed, e.g. after echoing typed input that
    /// the terminal already shows.
    pub fn skip_to_end(&mut self, log: &OutputLog) {
        self.line = log.line_count().saturating_sub(1);
        self.column = log.line(self.line).map_or(0, |l| l.text().chars().count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(renderer: &mut Renderer, log: &OutputLog) -> String {
        let mut out = Vec::new();
        renderer.render(log, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_renders_only_new_text() {
        let mut log = OutputLog::new();
        let mut renderer = Renderer::new(false);

        log.append("hel", false);
        assert_eq!(render(&mut renderer, &log), "hel");
        log.append("lo\nwor", false);
        assert_eq!(render(&mut renderer, &log), "lo\nwor");
        assert_eq!(render(&mut renderer, &log), "");
    }

    #[test]
    fn test_emphasis_is_colored() {
        let mut log = OutputLog::new();
        let mut renderer = Renderer::new(true);
        log.append("ok ", false);
        log.append("bad\n", true);
        assert_eq!(render(&mut renderer, &log), "ok \x1b[31mbad\x1b[0m\n");
    }

    #[test]
    fn test_skip_to_end() {
        let mut log = OutputLog::new();
        let mut renderer = Renderer::new(false);
        log.append("typed", false);
        renderer.skip_to_end(&log);
        log.append(" output", false);
        assert_eq!(render(&mut renderer, &log), " output");
    }
}
