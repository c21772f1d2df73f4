//! Exact-match duplicate resolution.
//!
//! Every entry is reduced to a [`Fingerprint`]. The first entry seen with a
//! given fingerprint is kept; every later one is discarded and its key is
//! reported.
//!
//! ## Fingerprint policies
//!
//! 1. [`FingerprintPolicy::FieldHash`]: SHA-256 over every field, sorted by
//!    name, with values lower-cased and trimmed. Any differing field makes two
//!    entries distinct.
//!
//! 2. [`FingerprintPolicy::SemanticIdentifier`]: the DOI when present,
//!    otherwise a composite of title, author, year and journal (or publisher)
//!    with spaces removed and lower-cased.
//!
//! Matching is exact; no similarity scoring takes place.
//!
//! ## Usage
//!
//! ```rust
//! use bibmerge::{Entry, dedupe::{DuplicateResolver, FingerprintPolicy}};
//!
//! let entries = vec![
//!     Entry::new("article", "a").with_field("doi", "10.1/x").with_field("title", "One"),
//!     Entry::new("article", "b").with_field("doi", "10.1/x").with_field("title", "Two"),
//! ];
//!
//! let resolution = DuplicateResolver::new(FingerprintPolicy::SemanticIdentifier).resolve(entries);
//! assert_eq!(resolution.kept.len(), 1);
//! assert_eq!(resolution.discarded_keys, vec!["b".to_string()]);
//! ```

use crate::Entry;
use crate::utils::{first_non_empty, normalize_value, strip_spaces};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;

/// Pseudo field name under which the entry type is hashed.
pub const ENTRY_TYPE_FIELD: &str = "ENTRYTYPE";
/// Pseudo field name under which the key is hashed when requested.
pub const KEY_FIELD: &str = "ID";

/// How an entry's identity is computed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FingerprintPolicy {
    /// Digest over every field.
    FieldHash,
    /// DOI, or a title/author/year/venue composite.
    #[default]
    SemanticIdentifier,
}

/// Content identity of an entry.
///
/// DOIs and composites are kept apart so that a composite string can never
/// collide with a DOI of the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
    /// Hex-encoded SHA-256 digest of all fields
    Digest(String),
    /// DOI value, compared case-sensitively
    Doi(String),
    /// Normalized title/author/year/venue string
    Composite(String),
}

/// Entries that survived resolution and the keys of those that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// First occurrence of every fingerprint, in first-seen order
    pub kept: Vec<Entry>,
    /// Keys of later occurrences, grouped by fingerprint in first-seen order
    pub discarded_keys: Vec<String>,
}

/// Splits an entry sequence into first occurrences and duplicates.
#[derive(Debug, Default, Clone)]
pub struct DuplicateResolver {
    policy: FingerprintPolicy,
    hash_includes_key: bool,
}

impl DuplicateResolver {
    /// Creates a resolver using `policy`.
    #[must_use]
    pub fn new(policy: FingerprintPolicy) -> Self {
        Self {
            policy,
            hash_includes_key: false,
        }
    }

    /// Makes the field-hash policy include the citation key.
    ///
    /// Has no effect on the semantic-identifier policy.
    #[must_use]
    pub fn with_key_in_hash(mut self, hash_includes_key: bool) -> Self {
        self.hash_includes_key = hash_includes_key;
        self
    }

    /// Computes the fingerprint of a single entry.
    pub fn fingerprint(&self, entry: &Entry) -> Fingerprint {
        match self.policy {
            FingerprintPolicy::FieldHash => field_hash(entry, self.hash_includes_key),
            FingerprintPolicy::SemanticIdentifier => semantic_identifier(entry),
        }
    }

    /// Keeps the first entry for every fingerprint and reports the keys of
    /// the rest.
    ///
    /// Entries are never modified. An empty input yields an empty resolution.
    pub fn resolve(&self, entries: Vec<Entry>) -> Resolution {
        // Index into `kept` and the duplicate keys, per fingerprint
        let mut seen: HashMap<Fingerprint, usize> = HashMap::with_capacity(entries.len());
        let mut kept = Vec::new();
        let mut duplicates: Vec<Vec<String>> = Vec::new();

        for entry in entries {
            match seen.entry(self.fingerprint(&entry)) {
                MapEntry::Occupied(slot) => duplicates[*slot.get()].push(entry.key),
                MapEntry::Vacant(slot) => {
                    slot.insert(kept.len());
                    kept.push(entry);
                    duplicates.push(Vec::new());
                }
            }
        }

        Resolution {
            kept,
            discarded_keys: duplicates.into_iter().flatten().collect(),
        }
    }
}

/// SHA-256 over `name` + normalized value for every field, sorted by name.
fn field_hash(entry: &Entry, include_key: bool) -> Fingerprint {
    let entry_type = (ENTRY_TYPE_FIELD, entry.entry_type.as_str());
    let key = include_key.then_some((KEY_FIELD, entry.key.as_str()));

    let canonical: String = entry
        .fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .chain(std::iter::once(entry_type))
        .chain(key)
        .sorted_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(name, value)| format!("{name}{}", normalize_value(value)))
        .collect();

    Fingerprint::Digest(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// DOI when present, otherwise `title_author_year_venue` without spaces.
fn semantic_identifier(entry: &Entry) -> Fingerprint {
    if let Some(doi) = entry.field("doi").filter(|doi| !doi.is_empty()) {
        return Fingerprint::Doi(doi.to_string());
    }

    let venue = first_non_empty(&[entry.field("journal"), entry.field("publisher")]);
    let composite = format!(
        "{}_{}_{}_{}",
        entry.field_or_empty("title"),
        entry.field_or_empty("author"),
        entry.field_or_empty("year"),
        venue
    );

    Fingerprint::Composite(strip_spaces(&composite).to_lowercase())
}
