//! The multi-field text record that flows through every stage.
//!
//! A [`Record`] is an ordered list of UTF-8 fields. Conventionally field 0 is the
//! source side, field 1 the target side, and anything after that is metadata
//! (a document id, a score, ...).
//!
//! The canonical line form is `"{field0}\t{field1}"`. Metadata fields are kept in
//! memory but dropped by [`Record::to_line`]; use [`Record::to_line_all`] when they
//! need to survive serialization.
//!
//! # Example
//!
//! ```
//! use ironstream::Record;
//!
//! let mut r = Record::from_line("Das ist ein Test.\tThis is a test.\tdoc-7");
//! assert_eq!(r.get(1), Some("This is a test."));
//! assert_eq!(r.to_line(), "Das ist ein Test.\tThis is a test.");
//!
//! r.set(4, "x");
//! assert_eq!(r.len(), 5);
//! assert_eq!(r.get(3), Some(""));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Field delimiter of the canonical line format.
pub const FIELD_SEPARATOR: char = '\t';

/// Number of fields included in the canonical line form.
pub const CANONICAL_FIELDS: usize = 2;

/// An ordered, growable sequence of text fields.
///
/// Equality and hashing are structural over *all* fields, including metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    /// An empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Parse a tab-delimited line. Trailing `\r`, `\n` and spaces are trimmed from
    /// every field.
    #[must_use]
    pub fn from_line(line: &str) -> Self {
        Self {
            fields: line
                .split(FIELD_SEPARATOR)
                .map(|f| f.trim_end_matches(['\r', '\n', ' ']).to_string())
                .collect(),
        }
    }

    /// Build a record directly from fields.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field `i`, or `None` past the end.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&str> {
        self.fields.get(i).map(String::as_str)
    }

    /// Set field `i`, padding any intervening fields with empty strings.
    pub fn set(&mut self, i: usize, value: impl Into<String>) {
        if i >= self.fields.len() {
            self.fields.resize(i + 1, String::new());
        }
        self.fields[i] = value.into();
    }

    /// Mutable access to field `i`, growing the record if needed.
    pub fn field_mut(&mut self, i: usize) -> &mut String {
        if i >= self.fields.len() {
            self.fields.resize(i + 1, String::new());
        }
        &mut self.fields[i]
    }

    /// Append a field at the end.
    pub fn push(&mut self, value: impl Into<String>) {
        self.fields.push(value.into());
    }

    /// Drop every field at index `n` and above.
    pub fn truncate(&mut self, n: usize) {
        self.fields.truncate(n);
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// Canonical serialization: the first two fields joined by a tab.
    #[must_use]
    pub fn to_line(&self) -> String {
        self.to_line_n(CANONICAL_FIELDS)
    }

    /// Serialize the first `n` fields (fewer if the record is shorter).
    #[must_use]
    pub fn to_line_n(&self, n: usize) -> String {
        let end = n.min(self.fields.len());
        self.fields[..end].join("\t")
    }

    /// Serialize every field, metadata included.
    #[must_use]
    pub fn to_line_all(&self) -> String {
        self.fields.join("\t")
    }

    /// Field-wise append of `other` onto `self` using `separator`.
    ///
    /// Only the fields listed in `which` are appended (all of `other`'s fields when
    /// `None`). Indices beyond `other`'s length are ignored. Empty fields in `self`
    /// take the other value without a separator.
    pub fn append(&mut self, other: &Record, which: Option<&[usize]>, separator: &str) {
        let all: Vec<usize>;
        let which = match which {
            Some(w) => w,
            None => {
                all = (0..other.len()).collect();
                &all
            }
        };
        for &i in which {
            let Some(value) = other.get(i) else {
                break;
            };
            let field = self.field_mut(i);
            if field.is_empty() {
                field.push_str(value);
            } else {
                field.push_str(separator);
                field.push_str(value);
            }
        }
    }

    /// Column-wise join of several records over the first `end_range` fields.
    ///
    /// `join([a\tb, d\te], "|", 2)` is `a|d\tb|e`. Missing fields join as empty.
    #[must_use]
    pub fn join(records: &[Record], separator: &str, end_range: usize) -> Record {
        let fields = (0..end_range)
            .map(|i| {
                records
                    .iter()
                    .map(|r| r.get(i).unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(separator)
            })
            .collect::<Vec<_>>();
        Record { fields }
    }
}

impl Index<usize> for Record {
    type Output = str;

    fn index(&self, i: usize) -> &str {
        &self.fields[i]
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl From<&str> for Record {
    fn from(line: &str) -> Self {
        Self::from_line(line)
    }
}

impl From<Vec<String>> for Record {
    fn from(fields: Vec<String>) -> Self {
        Self { fields }
    }
}
