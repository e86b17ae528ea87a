//! Encoded byte streams to physical lines and back.

use crate::error::FlatFileError;
use encoding_rs::{Encoding, UTF_8};
use std::io::{self, BufRead};

/// Look up an encoding by its WHATWG label (`utf-8`, `latin1`,
/// `windows-1252`, `shift_jis`, ...).
///
/// Only ASCII-compatible encodings are accepted, so that `\n` in the byte
/// stream is always a line break.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, FlatFileError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| FlatFileError::config(format!("unknown encoding `{label}`")))?;
    if !encoding.is_ascii_compatible() {
        return Err(FlatFileError::config(format!(
            "encoding `{}` is not ASCII-compatible",
            encoding.name()
        )));
    }
    Ok(encoding)
}

/// Iterator of decoded physical lines, without their `\n` / `\r\n` endings.
///
/// A UTF-8 byte order mark at the start of the stream is dropped. Bytes that
/// do not decode become U+FFFD and are reported once per line at `warn`.
pub struct PhysicalLines<R> {
    reader: R,
    encoding: &'static Encoding,
    buf: Vec<u8>,
    line_no: u64,
    keep_cr: bool,
}

impl<R: BufRead> PhysicalLines<R> {
    pub fn new(reader: R, encoding: &'static Encoding) -> Self {
        Self {
            reader,
            encoding,
            buf: Vec::new(),
            line_no: 0,
            keep_cr: false,
        }
    }

    /// Leave the `\r` of a `\r\n` ending on the line, so a consumer can
    /// restore line breaks inside quoted values exactly.
    #[must_use]
    pub fn keeping_carriage_returns(mut self) -> Self {
        self.keep_cr = true;
        self
    }

    pub fn utf8(reader: R) -> Self {
        Self::new(reader, UTF_8)
    }

    /// Physical lines read so far.
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> Iterator for PhysicalLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }
        self.line_no += 1;

        let mut bytes = self.buf.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = match rest.strip_suffix(b"\r") {
                Some(bare) if !self.keep_cr => bare,
                _ => rest,
            };
        }
        if self.line_no == 1
            && self.encoding == UTF_8
            && let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF")
        {
            bytes = rest;
        }

        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if had_errors {
            tracing::warn!(
                line = self.line_no,
                encoding = self.encoding.name(),
                "undecodable bytes replaced"
            );
        }
        Some(Ok(text.into_owned()))
    }
}

/// Encode one line of output. `None` when a character has no mapping in the
/// target encoding.
pub fn encode_line(line: &str, encoding: &'static Encoding) -> Option<Vec<u8>> {
    let (bytes, _, unmappable) = encoding.encode(line);
    (!unmappable).then(|| bytes.into_owned())
}
