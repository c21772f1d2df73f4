//! BibTeX output for merged entries.
//!
//! Writes entries back out as `@type{key, name = {value}, ...}` blocks.
//!
//! # Example
//!
//! ```
//! use bibmerge::{Entry, bibtex::format_entry};
//!
//! let entry = Entry::new("article", "Smith2024")
//!     .with_field("title", "A Great Paper")
//!     .with_field("year", "2024");
//!
//! assert_eq!(
//!     format_entry(&entry),
//!     "@article{Smith2024,\n    title = {A Great Paper},\n    year = 2024,\n}"
//! );
//! ```

use crate::{Entry, MergeError, Result};
use itertools::Itertools;
use std::io::Write;

/// Formats a single entry.
pub fn format_entry(entry: &Entry) -> String {
    let entry_type = if entry.entry_type.is_empty() {
        "misc"
    } else {
        entry.entry_type.as_str()
    };

    let mut result = format!("@{entry_type}{{{},\n", entry.key);
    for (name, value) in &entry.fields {
        result.push_str("    ");
        result.push_str(name);
        result.push_str(" = ");
        result.push_str(&format_field_value(value));
        result.push_str(",\n");
    }
    result.push('}');
    result
}

/// Formats entries separated by blank lines.
pub fn format_entries(entries: &[Entry]) -> String {
    entries.iter().map(format_entry).join("\n\n")
}

/// Writes all entries to `writer` in one go.
///
/// The text is fully rendered before anything is written, and the writer is
/// flushed at the end.
///
/// # Errors
///
/// Returns `MergeError::SourceWrite` if writing or flushing fails
pub fn write_entries<W: Write>(entries: &[Entry], mut writer: W) -> Result<()> {
    let mut text = format_entries(entries);
    if !text.is_empty() {
        text.push('\n');
    }

    writer
        .write_all(text.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(MergeError::SourceWrite)
}

/// Numbers are written bare, everything else in braces
fn format_field_value(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    format!("{{{value}}}")
}
