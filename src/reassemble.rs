//! Physical lines to logical records.

use crate::boundary::{BoundaryClassifier, DEFAULT_JOIN_TOKEN};
use crate::codec::QuoteGuard;
use std::io;

/// One reconstructed record and its 1-based position in the logical sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    pub ordinal: u64,
    pub text: String,
}

/// Lazily merges continuation lines into the record they belong to.
///
/// Holds at most one pending record. A line that starts a record flushes the
/// pending one; any other line is appended to it with the join token. With no
/// boundary pattern every line is emitted as soon as it is read.
///
/// When a [`QuoteGuard`] is installed and the pending record ends inside an
/// open quoted field, a line that does not start a record is joined with the
/// line break it was read with (`\n` or `\r\n`), restoring the break that was
/// inside the quotes. A line matching the boundary pattern still starts a new
/// record, so an unbalanced qualifier fails only its own record. Without a
/// pattern an open quote holds the record until the quote closes.
pub struct LineReassembler<I> {
    lines: I,
    classifier: BoundaryClassifier,
    join_token: String,
    guard: Option<QuoteGuard>,
    skip_empty: bool,
    pending: Option<String>,
    // Terminator of the last physical line appended to `pending`.
    pending_break: &'static str,
    emitted: u64,
    done: bool,
}

impl<I> LineReassembler<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I, classifier: BoundaryClassifier) -> Self {
        Self {
            lines,
            classifier,
            join_token: DEFAULT_JOIN_TOKEN.to_string(),
            guard: None,
            skip_empty: false,
            pending: None,
            pending_break: "\n",
            emitted: 0,
            done: false,
        }
    }

    #[must_use]
    pub fn with_join_token(mut self, token: impl Into<String>) -> Self {
        self.join_token = token.into();
        self
    }

    #[must_use]
    pub fn with_quote_guard(mut self, guard: Option<QuoteGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Drop blank physical lines, except inside an open quoted field.
    #[must_use]
    pub fn skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Number of records emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn quote_open(&self) -> bool {
        self.pending.is_some() && self.guard.as_ref().is_some_and(QuoteGuard::is_open)
    }

    fn starts_record(&self, line: &str, open: bool) -> bool {
        if self.classifier.is_always() {
            !open
        } else {
            self.classifier.is_record_start(line)
        }
    }

    fn start(&mut self, line: String) {
        if let Some(guard) = self.guard.as_mut() {
            guard.reset();
            guard.feed(&line);
        }
        self.pending = Some(line);
    }

    fn emit(&mut self, text: String) -> LogicalRecord {
        self.emitted += 1;
        LogicalRecord {
            ordinal: self.emitted,
            text,
        }
    }
}

impl<I> Iterator for LineReassembler<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<LogicalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let mut line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    self.pending = None;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return self.pending.take().map(|text| Ok(self.emit(text)));
                }
            };
            let line_break = if line.ends_with('\r') {
                line.pop();
                "\r\n"
            } else {
                "\n"
            };

            let open = self.quote_open();
            if self.skip_empty && !open && line.trim().is_empty() {
                continue;
            }

            let flushed = match self.pending.take() {
                None => {
                    self.start(line);
                    None
                }
                Some(buf) if self.starts_record(&line, open) => {
                    self.start(line);
                    Some(buf)
                }
                Some(mut buf) => {
                    let joiner = if open { self.pending_break } else { self.join_token.as_str() };
                    buf.push_str(joiner);
                    buf.push_str(&line);
                    if let Some(guard) = self.guard.as_mut() {
                        if !open {
                            guard.feed(&self.join_token);
                        }
                        guard.feed(&line);
                    }
                    self.pending = Some(buf);
                    None
                }
            };
            self.pending_break = line_break;
            if let Some(text) = flushed {
                return Some(Ok(self.emit(text)));
            }

            // Without a pattern a complete line needs no lookahead.
            if self.classifier.is_always()
                && !self.quote_open()
                && let Some(text) = self.pending.take()
            {
                return Some(Ok(self.emit(text)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> impl Iterator<Item = io::Result<String>> {
        src.iter().map(|s| Ok(s.to_string())).collect::<Vec<_>>().into_iter()
    }

    fn texts<I: Iterator<Item = io::Result<LogicalRecord>>>(it: I) -> Vec<String> {
        it.map(|r| r.unwrap().text).collect()
    }

    #[test]
    fn no_pattern_emits_each_line_without_lookahead() {
        let mut pulled = 0;
        let src = ["a", "b", "c"].into_iter().map(|s| {
            pulled += 1;
            Ok(s.to_string())
        });
        let mut it = LineReassembler::new(src, BoundaryClassifier::Always);
        assert_eq!(it.next().unwrap().unwrap().text, "a");
        drop(it);
        assert_eq!(pulled, 1);
    }

    #[test]
    fn first_line_always_starts_a_record() {
        let c = BoundaryClassifier::new(Some("^#")).unwrap();
        let got = texts(LineReassembler::new(lines(&["x", "y", "#1", "z"]), c));
        assert_eq!(got, vec!["x y", "#1 z"]);
    }

    #[test]
    fn quote_guard_keeps_line_breaks_inside_quotes() {
        let c = BoundaryClassifier::Always;
        let guard = QuoteGuard::new('"', ",");
        let src = lines(&[r#"1,"two"#, r#"lines",x"#, "2,plain,y"]);
        let got = texts(LineReassembler::new(src, c).with_quote_guard(Some(guard)));
        assert_eq!(got, vec!["1,\"two\nlines\",x", "2,plain,y"]);
    }

    #[test]
    fn matching_line_closes_a_record_left_inside_quotes() {
        let c = BoundaryClassifier::new(Some(r"^\d+,")).unwrap();
        let guard = QuoteGuard::new('"', ",");
        let src = lines(&[r#"1,"abc,x"#, "2,ok,y", r#"3,"multi"#, r#"line",z"#]);
        let got = texts(LineReassembler::new(src, c).with_quote_guard(Some(guard)));
        assert_eq!(got, vec!["1,\"abc,x", "2,ok,y", "3,\"multi\nline\",z"]);
    }

    #[test]
    fn crlf_inside_quotes_is_restored() {
        let guard = QuoteGuard::new('"', ",");
        let src = lines(&["1,\"one\r", "two\",x\r", "2,y,z\r"]);
        let got = texts(LineReassembler::new(src, BoundaryClassifier::Always).with_quote_guard(Some(guard)));
        assert_eq!(got, vec!["1,\"one\r\ntwo\",x", "2,y,z"]);
    }

    #[test]
    fn io_error_ends_the_sequence() {
        let src = vec![
            Ok("a".to_string()),
            Err(io::Error::other("boom")),
            Ok("b".to_string()),
        ];
        let mut it = LineReassembler::new(src.into_iter(), BoundaryClassifier::Always);
        assert!(it.next().unwrap().is_ok());
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }
}
