//! Merging entry collections into one.
//!
//! A merge runs in a single pass: every entry first receives its final key
//! from a [`KeySanitizer`] owned by the run, then the whole sequence goes
//! through a [`DuplicateResolver`]. Fingerprints are therefore computed on
//! the sanitized entries.
//!
//! # Example
//!
//! ```
//! use bibmerge::{Entry, merge::{KeySource, MergeConfig, Merger}};
//!
//! let entries = vec![
//!     Entry::new("article", "foo").with_field("title", "One"),
//!     Entry::new("article", "foo").with_field("title", "Two"),
//! ];
//!
//! let outcome = Merger::new().merge(entries);
//! assert_eq!(outcome.entries[1].key, "foo_1");
//! assert_eq!(outcome.renamed_keys[0].original, "foo");
//! assert_eq!(outcome.renamed_keys[0].sanitized, "foo_1");
//!
//! // Keys derived from titles, capped at 30 characters
//! let config = MergeConfig {
//!     key_source: KeySource::Title,
//!     key_max_length: Some(30),
//!     ..Default::default()
//! };
//! let outcome = Merger::new()
//!     .with_config(config)
//!     .merge(vec![Entry::new("article", "x").with_field("title", "Deep Learning")]);
//! assert_eq!(outcome.entries[0].key, "Deep_Learning");
//! assert!(outcome.renamed_keys.is_empty());
//! ```

use crate::dedupe::{DuplicateResolver, FingerprintPolicy};
use crate::sanitize::KeySanitizer;
use crate::source::{Source, SourceLoader};
use crate::{Entry, EntryParser, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Length cap used by [`MergeConfig::title_keys`].
pub const TITLE_KEY_MAX_LENGTH: usize = 30;

/// Where an entry's new key comes from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeySource {
    /// Sanitize the entry's existing key.
    #[default]
    Original,
    /// Derive the key from the `title` field, ignoring the existing key.
    Title,
}

/// Options controlling a merge.
///
/// # Examples
///
/// ```
/// use bibmerge::{FingerprintPolicy, merge::{KeySource, MergeConfig}};
///
/// let config = MergeConfig {
///     key_source: KeySource::Original,
///     fingerprint_policy: FingerprintPolicy::FieldHash,
///     key_max_length: None,
///     hash_includes_key: false,
/// };
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeConfig {
    /// Source of the new keys.
    pub key_source: KeySource,
    /// How duplicates are identified.
    pub fingerprint_policy: FingerprintPolicy,
    /// Optional cap on sanitized key length, before any uniqueness suffix.
    pub key_max_length: Option<usize>,
    /// Whether the field-hash fingerprint includes the sanitized key.
    pub hash_includes_key: bool,
}

impl MergeConfig {
    /// Title-derived keys capped at 30 characters, deduplicated by field hash.
    #[must_use]
    pub fn title_keys() -> Self {
        Self {
            key_source: KeySource::Title,
            fingerprint_policy: FingerprintPolicy::FieldHash,
            key_max_length: Some(TITLE_KEY_MAX_LENGTH),
            hash_includes_key: false,
        }
    }
}

/// A key that was changed during sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRename {
    pub original: String,
    pub sanitized: String,
}

/// Result of a merge: the kept entries plus what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Kept entries with their final keys, in first-seen order
    pub entries: Vec<Entry>,
    /// Every key rewritten by the sanitizer, in input order.
    /// An original key appears once per entry that carried it, so repeated
    /// keys yield several pairs (`foo -> foo_1`, `foo -> foo_2`).
    /// Always empty when keys come from titles.
    pub renamed_keys: Vec<KeyRename>,
    /// Final keys of the discarded duplicates
    pub discarded_keys: Vec<String>,
}

impl MergeOutcome {
    /// True when no key was renamed and no duplicate was removed.
    pub fn is_clean(&self) -> bool {
        self.renamed_keys.is_empty() && self.discarded_keys.is_empty()
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(
                f,
                "Merged {} entries: no duplicates found and all keys were valid.",
                self.entries.len()
            );
        }

        let mut sections = Vec::new();
        if !self.renamed_keys.is_empty() {
            let mut section = String::from("The following keys were cleaned and replaced:");
            for rename in &self.renamed_keys {
                section.push_str(&format!("\n{} -> {}", rename.original, rename.sanitized));
            }
            sections.push(section);
        }
        if !self.discarded_keys.is_empty() {
            let mut section = String::from("The following entries were duplicates and were removed:");
            for key in &self.discarded_keys {
                section.push('\n');
                section.push_str(key);
            }
            sections.push(section);
        }

        write!(f, "{}", sections.join("\n\n"))
    }
}

/// Runs key sanitization and duplicate resolution over a batch of entries.
#[derive(Debug, Default, Clone)]
pub struct Merger {
    config: MergeConfig,
}

impl Merger {
    /// Creates a merger with the default configuration: original keys,
    /// semantic-identifier fingerprints and no key length cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Assigns unique keys and removes duplicates.
    ///
    /// The set of issued keys lives only for the duration of this call, so
    /// independent merges never affect each other.
    pub fn merge(&self, mut entries: Vec<Entry>) -> MergeOutcome {
        let mut sanitizer = KeySanitizer::new().with_max_len(self.config.key_max_length);
        let mut renamed_keys = Vec::new();

        for entry in &mut entries {
            match self.config.key_source {
                KeySource::Original => {
                    let sanitized = sanitizer.sanitize(&entry.key);
                    if sanitized != entry.key {
                        renamed_keys.push(KeyRename {
                            original: std::mem::replace(&mut entry.key, sanitized.clone()),
                            sanitized,
                        });
                    }
                }
                KeySource::Title => {
                    entry.key = sanitizer.sanitize(entry.field_or_empty("title"));
                }
            }
        }

        let resolution = DuplicateResolver::new(self.config.fingerprint_policy)
            .with_key_in_hash(self.config.hash_includes_key)
            .resolve(entries);

        debug!(
            "Merged {} entries: kept {}, renamed {}, discarded {}",
            resolution.kept.len() + resolution.discarded_keys.len(),
            resolution.kept.len(),
            renamed_keys.len(),
            resolution.discarded_keys.len()
        );

        MergeOutcome {
            entries: resolution.kept,
            renamed_keys,
            discarded_keys: resolution.discarded_keys,
        }
    }

    /// Loads every source, in order, and merges the combined entries.
    ///
    /// # Errors
    ///
    /// Returns `MergeError::SourceRead` for the first source that cannot be
    /// decoded or parsed; nothing is merged in that case.
    pub fn merge_sources<P>(
        &self,
        loader: &SourceLoader,
        parser: &P,
        sources: &[Source],
    ) -> Result<MergeOutcome>
    where
        P: EntryParser + Sync + ?Sized,
    {
        let entries = loader.load_all(parser, sources)?;
        Ok(self.merge(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MergeError;
    use pretty_assertions::assert_eq;

    fn renames(outcome: &MergeOutcome) -> Vec<(&str, &str)> {
        outcome
            .renamed_keys
            .iter()
            .map(|r| (r.original.as_str(), r.sanitized.as_str()))
            .collect()
    }

    #[test]
    fn test_empty_batch() {
        let outcome = Merger::new().merge(Vec::new());
        assert_eq!(outcome, MergeOutcome::default());
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_distinct_entries_only_report_cleaned_keys() {
        let entries = vec![
            Entry::new("article", "Smith2020").with_field("doi", "10.1/a"),
            Entry::new("article", "doe:2021").with_field("doi", "10.1/b"),
            Entry::new("book", "Lee 2019").with_field("doi", "10.1/c"),
            Entry::new("article", "Kim2018").with_field("doi", "10.1/d"),
            Entry::new("article", "2017Park").with_field("doi", "10.1/e"),
        ];

        let outcome = Merger::new().merge(entries);

        assert_eq!(outcome.entries.len(), 5);
        assert!(outcome.discarded_keys.is_empty());
        assert_eq!(
            renames(&outcome),
            vec![
                ("doe:2021", "doe_2021"),
                ("Lee 2019", "Lee_2019"),
                ("2017Park", "_2017Park"),
            ]
        );
    }

    #[test]
    fn test_repeated_keys_are_renamed_and_reported() {
        let entries = vec![
            Entry::new("article", "foo").with_field("title", "A"),
            Entry::new("article", "foo").with_field("title", "B"),
            Entry::new("article", "foo").with_field("title", "C"),
        ];

        let outcome = Merger::new().merge(entries);

        let keys: Vec<_> = outcome.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["foo", "foo_1", "foo_2"]);
        assert_eq!(renames(&outcome), vec![("foo", "foo_1"), ("foo", "foo_2")]);
    }

    #[test]
    fn test_discarded_keys_are_sanitized_keys() {
        let entries = vec![
            Entry::new("article", "dup").with_field("doi", "10.1/x"),
            Entry::new("article", "dup").with_field("doi", "10.1/x"),
        ];

        let outcome = Merger::new().merge(entries);

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.discarded_keys, vec!["dup_1"]);
    }

    #[test]
    fn test_field_hash_ignores_keys_by_default() {
        let config = MergeConfig {
            fingerprint_policy: FingerprintPolicy::FieldHash,
            ..Default::default()
        };
        let entries = vec![
            Entry::new("article", "a").with_field("title", "Same"),
            Entry::new("article", "b").with_field("title", "Same"),
        ];

        let outcome = Merger::new().with_config(config.clone()).merge(entries.clone());
        assert_eq!(outcome.discarded_keys, vec!["b"]);

        let keyed = MergeConfig {
            hash_includes_key: true,
            ..config
        };
        let outcome = Merger::new().with_config(keyed).merge(entries);
        assert_eq!(outcome.entries.len(), 2);
    }

    #[test]
    fn test_title_keys() {
        let entries = vec![
            Entry::new("article", "orig1")
                .with_field("title", "A Very Long Title About Deep Learning Systems"),
            Entry::new("article", "orig2").with_field("title", "3D Vision"),
            Entry::new("article", "orig3"),
            Entry::new("misc", "orig4").with_field("title", "3D Vision!"),
        ];

        let outcome = Merger::new()
            .with_config(MergeConfig::title_keys())
            .merge(entries);

        let keys: Vec<_> = outcome.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["A_Very_Long_Title_About_Deep_L", "_3D_Vision", "unknown", "_3D_Vision_"]
        );
        assert!(outcome.renamed_keys.is_empty());
    }

    #[test]
    fn test_fields_other_than_key_are_untouched() {
        let entry = Entry::new("article", "bad key")
            .with_field("title", "  Mixed Case  ")
            .with_field("note", "kept as is");

        let outcome = Merger::new().merge(vec![entry.clone()]);

        assert_eq!(outcome.entries[0].fields, entry.fields);
        assert_eq!(outcome.entries[0].entry_type, entry.entry_type);
    }

    #[test]
    fn test_config_uses_option_names() {
        let parsed: MergeConfig = serde::de::Deserialize::deserialize(
            serde::de::value::MapDeserializer::<_, serde::de::value::Error>::new(
                [("keySource", "title"), ("fingerprintPolicy", "fieldHash")].into_iter(),
            ),
        )
        .unwrap();
        assert_eq!(parsed.key_source, KeySource::Title);
        assert_eq!(parsed.fingerprint_policy, FingerprintPolicy::FieldHash);
        assert_eq!(parsed.key_max_length, None);
    }

    #[test]
    fn test_summary_lists_renames_and_duplicates() {
        let outcome = MergeOutcome {
            entries: Vec::new(),
            renamed_keys: vec![KeyRename {
                original: "a b".to_string(),
                sanitized: "a_b".to_string(),
            }],
            discarded_keys: vec!["x".to_string(), "y".to_string()],
        };

        assert_eq!(
            outcome.to_string(),
            "The following keys were cleaned and replaced:\na b -> a_b\n\n\
             The following entries were duplicates and were removed:\nx\ny"
        );
    }

    #[test]
    fn test_summary_when_clean() {
        let outcome = Merger::new().merge(vec![Entry::new("article", "ok")]);
        assert_eq!(
            outcome.to_string(),
            "Merged 1 entries: no duplicates found and all keys were valid."
        );
    }

    #[test]
    fn test_merge_sources_aborts_on_unreadable_source() {
        let parser = |text: &str| -> Result<Vec<Entry>> {
            if text.contains("broken") {
                return Err(MergeError::Parse("unbalanced braces".to_string()));
            }
            Ok(text.lines().map(|key| Entry::new("misc", key)).collect())
        };
        let sources = vec![
            Source::new("good.bib", b"a\nb".to_vec()),
            Source::new("bad.bib", b"broken".to_vec()),
        ];

        let result = Merger::new().merge_sources(&SourceLoader::new(), &parser, &sources);

        match result {
            Err(MergeError::SourceRead { source_id, .. }) => assert_eq!(source_id, "bad.bib"),
            other => panic!("expected SourceRead, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_sources_keeps_file_order() {
        let parser = |text: &str| -> Result<Vec<Entry>> {
            Ok(text
                .lines()
                .map(|line| {
                    let (key, doi) = line.split_once(' ').unwrap_or((line, ""));
                    Entry::new("article", key).with_field("doi", doi)
                })
                .collect())
        };
        let sources = vec![
            Source::new("one.bib", b"k1 10.1/a\nk2 10.1/b".to_vec()),
            Source::new("two.bib", b"k1 10.1/a\nk3 10.1/c".to_vec()),
        ];

        let outcome = Merger::new()
            .merge_sources(&SourceLoader::new(), &parser, &sources)
            .unwrap();

        let keys: Vec<_> = outcome.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert_eq!(outcome.discarded_keys, vec!["k1_1"]);
    }
}
