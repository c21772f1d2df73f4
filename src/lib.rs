//! Merge several bibliography collections into one deduplicated collection.
//!
//! `bibmerge` takes entries that an external parser has already produced from
//! one or more bibliography files and turns them into a single collection in
//! which every citation key is legal and unique, and every piece of content
//! appears only once.
//!
//! # Key Features
//!
//! - **Key sanitization**: keys are reduced to `[A-Za-z0-9_]`, underscore runs
//!   are collapsed, leading digits are guarded and collisions get `_1`, `_2`, ...
//!   suffixes. Keys may be derived from the original key or from the title.
//!
//! - **Exact-match deduplication** with two fingerprint policies:
//!   - SHA-256 over every field
//!   - DOI, or a title/author/year/venue composite when the DOI is missing
//!
//! - **Source loading** with an ordered list of text encodings tried in turn,
//!   optionally decoding many sources in parallel.
//!
//! - **Reports** of every renamed key and every discarded duplicate.
//!
//! # Basic Usage
//!
//! ```rust
//! use bibmerge::{Entry, merge::Merger};
//!
//! let mut first = Entry::new("article", "3John Smith!");
//! first.set_field("doi", "10.1/x");
//! let mut second = Entry::new("article", "other");
//! second.set_field("doi", "10.1/x");
//!
//! let outcome = Merger::new().merge(vec![first, second]);
//! assert_eq!(outcome.entries.len(), 1);
//! assert_eq!(outcome.entries[0].key, "_3John_Smith_");
//! assert_eq!(outcome.discarded_keys, vec!["other".to_string()]);
//! ```
//!
//! # Loading Sources
//!
//! Parsing the bibliography markup is left to the caller. Any type implementing
//! [`EntryParser`], including a plain closure, can be plugged into the loader:
//!
//! ```rust
//! use bibmerge::source::{Source, SourceLoader};
//! use bibmerge::{Entry, Result};
//!
//! let parser = |text: &str| -> Result<Vec<Entry>> {
//!     Ok(text.lines().map(|key| Entry::new("misc", key)).collect())
//! };
//!
//! let sources = vec![Source::new("a.bib", b"one\ntwo".to_vec())];
//! let entries = SourceLoader::new().load_all(&parser, &sources).unwrap();
//! assert_eq!(entries.len(), 2);
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`], which wraps [`MergeError`].
//! Key sanitization and duplicate resolution never fail; only reading and
//! writing sources can.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bibtex;
pub mod dedupe;
pub mod merge;
mod regex;
pub mod sanitize;
pub mod source;
mod utils;

// Reexports
pub use dedupe::{DuplicateResolver, Fingerprint, FingerprintPolicy};
pub use merge::{KeySource, MergeConfig, MergeOutcome, Merger};
pub use sanitize::KeySanitizer;
pub use source::{Source, SourceLoader};

/// A specialized Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that can abort loading or writing a merged collection.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to read source {source_id}: {reason}")]
    SourceRead { source_id: String, reason: String },

    #[error("Failed to write merged output: {0}")]
    SourceWrite(#[source] std::io::Error),

    /// For `EntryParser` implementations rejecting their input
    #[error("Parse error: {0}")]
    Parse(String),

    /// For `EntryParser` implementations that perform their own I/O;
    /// the loader reports it as `SourceRead`
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single bibliography entry.
///
/// Fields keep the order in which they were added. Field names are
/// case-sensitive. The citation key is stored apart from the other fields
/// because it is the only value the merge ever rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry type such as `article` or `book`
    pub entry_type: String,
    /// Citation key
    pub key: String,
    /// Ordered field name/value pairs
    pub fields: Vec<(String, String)>,
}

impl Entry {
    /// Creates an entry with no fields.
    pub fn new(entry_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Returns the value of a field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the value of a field, or an empty string when it is absent.
    pub fn field_or_empty(&self, name: &str) -> &str {
        self.field(name).unwrap_or_default()
    }

    /// Sets a field, replacing an existing value in place or appending a new one.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style variant of [`Entry::set_field`].
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }
}

/// Trait for turning decoded bibliography text into entries.
///
/// The crate does not parse any markup itself; callers plug their parser in
/// through this trait.
pub trait EntryParser {
    /// Parse a string containing zero or more entries.
    ///
    /// # Errors
    ///
    /// Returns `MergeError` if the input is malformed
    fn parse(&self, input: &str) -> Result<Vec<Entry>>;
}

impl<F> EntryParser for F
where
    F: Fn(&str) -> Result<Vec<Entry>>,
{
    fn parse(&self, input: &str) -> Result<Vec<Entry>> {
        self(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_error_display() {
        let error = MergeError::SourceRead {
            source_id: "refs.bib".to_string(),
            reason: "no encoding matched".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to read source refs.bib: no encoding matched"
        );
    }

    #[test]
    fn test_set_field_replaces_in_place() {
        let mut entry = Entry::new("article", "k")
            .with_field("title", "First")
            .with_field("year", "2020");
        entry.set_field("title", "Second");

        assert_eq!(
            entry.fields,
            vec![
                ("title".to_string(), "Second".to_string()),
                ("year".to_string(), "2020".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let entry = Entry::new("article", "k").with_field("Title", "Upper");
        assert_eq!(entry.field("title"), None);
        assert_eq!(entry.field("Title"), Some("Upper"));
        assert_eq!(entry.field_or_empty("title"), "");
    }
}
