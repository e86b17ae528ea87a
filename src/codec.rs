//! Field splitting and joining for delimited records.
//!
//! The codec is data-driven: it interprets the entity's field list at run
//! time. In *structured* mode a logical record splits into exactly one raw
//! string per non-system field. In *raw* mode (empty delimiter, one field)
//! the whole record is the single value and nothing is split.
//!
//! Quote handling is char by char. With a qualifier `"` and delimiter `,`:
//!
//! | on disk            | fields            |
//! |--------------------|-------------------|
//! | `a,"b,c",d`        | `a` `b,c` `d`     |
//! | `"say ""hi""",x`   | `say "hi"` `x`    |
//! | `"5" tall",x`      | `5" tall` `x`     |
//! | `"open,x`          | QuoteUnterminated |

use crate::config::ConnectionSpec;
use crate::convert::TypeConverter;
use crate::error::RecordFault;
use crate::schema::{FieldSpec, Row, Schema};
use crate::value::Value;
use std::sync::Arc;

/// Tracks whether the record being reassembled ends inside a quoted field.
///
/// State is carried between calls to [`feed`](Self::feed), so every physical
/// line is scanned exactly once however long the record grows.
#[derive(Debug, Clone)]
pub struct QuoteGuard {
    qualifier: char,
    delimiter: String,
    in_quotes: bool,
    at_field_start: bool,
}

impl QuoteGuard {
    pub fn new(qualifier: char, delimiter: impl Into<String>) -> Self {
        Self {
            qualifier,
            delimiter: delimiter.into(),
            in_quotes: false,
            at_field_start: true,
        }
    }

    /// Start tracking a new record.
    pub fn reset(&mut self) {
        self.in_quotes = false;
        self.at_field_start = true;
    }

    /// Scan the next piece of the current record. The end of `chunk` may
    /// close a quoted field, as the end of the record would.
    pub fn feed(&mut self, chunk: &str) {
        let q = self.qualifier;
        let mut i = 0;
        while i < chunk.len() {
            let rest = &chunk[i..];
            let Some(c) = rest.chars().next() else { break };
            let width = c.len_utf8();

            if self.in_quotes {
                if c == q {
                    let after = &rest[width..];
                    if after.starts_with(q) {
                        i += 2 * width;
                        continue;
                    }
                    if after.is_empty() || after.starts_with(self.delimiter.as_str()) {
                        self.in_quotes = false;
                    }
                }
                i += width;
                continue;
            }

            if !self.delimiter.is_empty() && rest.starts_with(self.delimiter.as_str()) {
                self.at_field_start = true;
                i += self.delimiter.len();
                continue;
            }
            if self.at_field_start && c == q {
                self.in_quotes = true;
            }
            self.at_field_start = false;
            i += width;
        }
    }

    pub fn is_open(&self) -> bool {
        self.in_quotes
    }
}

/// Splits logical records into raw fields and joins formatted fields back.
#[derive(Debug, Clone)]
pub struct DelimitedCodec {
    schema: Arc<Schema>,
    delimiter: String,
    qualifier: Option<char>,
    raw: bool,
}

impl DelimitedCodec {
    pub fn new(schema: Arc<Schema>, conn: &ConnectionSpec) -> Self {
        let raw = conn.is_raw(&schema);
        Self {
            delimiter: conn.effective_delimiter().to_string(),
            qualifier: conn.qualifier(),
            raw,
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Guard for quote-aware reassembly, when a qualifier is configured and
    /// records are actually split.
    pub fn quote_guard(&self) -> Option<QuoteGuard> {
        match (self.raw, self.qualifier) {
            (false, Some(q)) => Some(QuoteGuard::new(q, self.delimiter.clone())),
            _ => None,
        }
    }

    /// Split one logical record into one raw string per non-system field.
    pub fn split(&self, text: &str) -> Result<Vec<String>, RecordFault> {
        if self.raw {
            return Ok(vec![text.to_string()]);
        }

        let mut segments = Vec::new();
        scan(text, &self.delimiter, self.qualifier, |field| segments.push(field))
            .map_err(|column| RecordFault::QuoteUnterminated { column })?;

        let fields: Vec<&FieldSpec> = self.schema.io_fields().collect();
        let found = segments.len();
        if found > fields.len() {
            return Err(RecordFault::FieldCountMismatch {
                expected: fields.len(),
                found,
            });
        }
        if found < fields.len() {
            if !fields[found..].iter().all(|f| f.optional) {
                return Err(RecordFault::FieldCountMismatch {
                    expected: fields.len(),
                    found,
                });
            }
            segments.resize(fields.len(), String::new());
        }
        Ok(segments)
    }

    /// Join already formatted values, one per non-system field, into a line.
    pub fn join(&self, values: &[String]) -> Result<String, RecordFault> {
        let fields: Vec<&FieldSpec> = self.schema.io_fields().collect();
        if values.len() != fields.len() {
            return Err(RecordFault::FieldCountMismatch {
                expected: fields.len(),
                found: values.len(),
            });
        }
        if self.raw {
            return Ok(values[0].clone());
        }

        let mut line = String::new();
        for (i, (field, value)) in fields.iter().zip(values).enumerate() {
            if i > 0 {
                line.push_str(&self.delimiter);
            }
            match self.qualifier {
                Some(q) if field.quoted != Some(false) => {
                    line.push(q);
                    for c in value.chars() {
                        if c == q {
                            line.push(q);
                        }
                        line.push(c);
                    }
                    line.push(q);
                }
                q => {
                    let reason = if value.contains(&self.delimiter) {
                        Some("unquoted value contains the delimiter")
                    } else if value.contains(['\n', '\r']) {
                        Some("unquoted value contains a line break")
                    } else if q.is_some_and(|q| value.starts_with(q)) {
                        Some("unquoted value starts with the text qualifier")
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        return Err(RecordFault::Unwritable {
                            field: field.name.clone(),
                            value: Some(value.clone()),
                            reason: reason.to_string(),
                        });
                    }
                    line.push_str(value);
                }
            }
        }
        Ok(line)
    }

    /// Format every non-system value of `row` and join them.
    ///
    /// Values are taken by position, so the row must be shaped by this
    /// codec's schema.
    pub fn encode_row(&self, row: &Row) -> Result<String, RecordFault> {
        let theirs = row.schema();
        if !Arc::ptr_eq(theirs, &self.schema) && **theirs != *self.schema {
            let ours = self.schema.fields();
            let field = ours
                .iter()
                .zip(theirs.fields())
                .find(|(a, b)| a != b)
                .map(|(a, _)| a)
                .or_else(|| ours.get(theirs.len()))
                .or_else(|| theirs.fields().get(ours.len()))
                .map(|f| f.name.clone())
                .unwrap_or_default();
            return Err(RecordFault::Unwritable {
                field,
                value: None,
                reason: "row was built with a different schema".to_string(),
            });
        }
        let values = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.system)
            .map(|(i, f)| TypeConverter::format(f, row.values().get(i).unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()?;
        self.join(&values)
    }

    /// Header derived from field labels. A delimiter inside a label becomes a
    /// space.
    pub fn derived_header(&self) -> String {
        if self.raw {
            return self
                .schema
                .io_fields()
                .next()
                .map(|f| f.label().to_string())
                .unwrap_or_default();
        }
        self.schema
            .io_fields()
            .map(|f| f.label().replace(&self.delimiter, " "))
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }
}

/// Walk `text` and emit each field. `Err(column)` is the 1-based field whose
/// opening qualifier is never closed.
fn scan(
    text: &str,
    delimiter: &str,
    qualifier: Option<char>,
    mut emit: impl FnMut(String),
) -> Result<(), usize> {
    let mut current = String::new();
    let mut column = 1;
    let mut at_field_start = true;
    let mut in_quotes = false;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let Some(c) = rest.chars().next() else { break };

        if in_quotes {
            if Some(c) == qualifier {
                let after = &rest[c.len_utf8()..];
                if after.starts_with(c) {
                    current.push(c);
                    i += 2 * c.len_utf8();
                    continue;
                }
                if after.is_empty() || after.starts_with(delimiter) {
                    in_quotes = false;
                    i += c.len_utf8();
                    continue;
                }
            }
            current.push(c);
            i += c.len_utf8();
            continue;
        }

        if !delimiter.is_empty() && rest.starts_with(delimiter) {
            emit(std::mem::take(&mut current));
            column += 1;
            at_field_start = true;
            i += delimiter.len();
            continue;
        }
        if at_field_start && Some(c) == qualifier {
            in_quotes = true;
            at_field_start = false;
            i += c.len_utf8();
            continue;
        }
        at_field_start = false;
        current.push(c);
        i += c.len_utf8();
    }

    if in_quotes {
        return Err(column);
    }
    emit(current);
    Ok(())
}
