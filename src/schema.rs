//! Field schema and typed rows.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s. Order is significant:
//! it is the column order on disk and it is identical between the read and the
//! write path for a given entity. Schemas are immutable for the duration of a
//! run and are shared between rows through an `Arc`.

use crate::error::FlatFileError;
use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Declared type of a field.
///
/// Deserialises from the lowercase type names used in entity configuration
/// (`"int"`, `"datetime"`, `"byte[]"`, ...), with the usual aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    #[serde(alias = "boolean")]
    Bool,
    Byte,
    #[serde(alias = "int16")]
    Short,
    #[serde(alias = "int32")]
    Int,
    #[serde(alias = "int64")]
    Long,
    #[serde(alias = "float")]
    Single,
    Double,
    Char,
    #[serde(alias = "date")]
    DateTime,
    #[serde(rename = "byte[]", alias = "bytes")]
    ByteArray,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Single => "single",
            Self::Double => "double",
            Self::Char => "char",
            Self::DateTime => "datetime",
            Self::ByteArray => "byte[]",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// The field may be missing from the end of a record, and may be empty.
    #[serde(default)]
    pub optional: bool,
    /// Display label used for derived headers. Falls back to `name`.
    #[serde(default)]
    pub label: Option<String>,
    /// `strftime`-style format for `datetime` fields.
    #[serde(default)]
    pub format: Option<String>,
    /// System-internal fields are never read, written, or put in headers.
    #[serde(default)]
    pub system: bool,
    /// Raw default used when a failed conversion is substituted.
    #[serde(default)]
    pub default: Option<String>,
    /// Per-field override of the connection's quoting on write.
    #[serde(default)]
    pub quoted: Option<bool>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
            label: None,
            format: None,
            system: false,
            default: None,
            quoted: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, raw: impl Into<String>) -> Self {
        self.default = Some(raw.into());
        self
    }

    #[must_use]
    pub fn with_quoted(mut self, quoted: bool) -> Self {
        self.quoted = Some(quoted);
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered field list for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that take part in reading and writing (everything but system fields).
    pub fn io_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.system)
    }

    /// A schema holding only the non-system fields, in order.
    pub fn io_schema(&self) -> Schema {
        Schema::new(self.io_fields().cloned().collect())
    }

    /// Check the schema can drive a run: at least one io field, unique names,
    /// and parseable datetime formats.
    pub fn validate(&self) -> Result<(), FlatFileError> {
        if self.io_fields().next().is_none() {
            return Err(FlatFileError::config("schema has no readable fields"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FlatFileError::config(format!(
                    "duplicate field name `{}`",
                    field.name
                )));
            }
            if let Some(fmt) = &field.format
                && StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
            {
                return Err(FlatFileError::config(format!(
                    "invalid datetime format `{fmt}` on field `{}`",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<FieldSpec>> for Schema {
    fn from(fields: Vec<FieldSpec>) -> Self {
        Self::new(fields)
    }
}

impl FromIterator<FieldSpec> for Schema {
    fn from_iter<I: IntoIterator<Item = FieldSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

static NULL: Value = Value::Null;

/// A typed row: one value per field of its schema, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. Missing trailing values are filled with [`Value::Null`] and
    /// surplus values are dropped so the row always matches its schema.
    pub fn new(schema: Arc<Schema>, mut values: Vec<Value>) -> Self {
        values.resize(schema.len(), Value::Null);
        Self { schema, values }
    }

    /// Build a row from `(field name, value)` pairs; fields not named are Null.
    pub fn from_pairs<K: AsRef<str>>(
        schema: Arc<Schema>,
        pairs: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let mut values = vec![Value::Null; schema.len()];
        for (name, value) in pairs {
            if let Some(i) = schema.position(name.as_ref()) {
                values[i] = value;
            }
        }
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.schema.position(name) {
            Some(i) => {
                self.values[i] = value;
                true
            }
            None => false,
        }
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl Index<&str> for Row {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&NULL)
    }
}
