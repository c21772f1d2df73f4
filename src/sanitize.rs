//! Citation key sanitizer.
//!
//! Turns arbitrary text into a legal citation key and keeps every issued key
//! unique within one merge run.
//!
//! A legal key:
//!
//! - is non-empty and contains only ASCII letters, digits and `_`
//! - never contains `__`
//! - never starts with a digit
//!
//! # Example
//!
//! ```
//! use bibmerge::sanitize::KeySanitizer;
//!
//! let mut sanitizer = KeySanitizer::new();
//! assert_eq!(sanitizer.sanitize("3John Smith!"), "_3John_Smith_");
//! assert_eq!(sanitizer.sanitize("foo"), "foo");
//! assert_eq!(sanitizer.sanitize("foo"), "foo_1");
//! ```

use crate::regex::Regex;
use crate::utils::truncate_token;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Key used when the raw input is empty.
pub const FALLBACK_KEY: &str = "unknown";

static ILLEGAL_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

static UNDERSCORE_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

/// Sanitizes `raw` and reserves the result in `used_keys`.
///
/// The candidate is built by replacing every character outside `[A-Za-z0-9_]`
/// with `_`, collapsing underscore runs, truncating to `max_len` and guarding a
/// leading digit with `_`. If the candidate is already taken, the smallest
/// free `_N` suffix is appended, sharing a trailing `_` of the candidate
/// (`foo_` becomes `foo_1`). The suffix is not subject to `max_len`.
///
/// # Arguments
///
/// * `raw` - The text to derive the key from
/// * `used_keys` - Keys already issued in this merge; the result is inserted
/// * `max_len` - Optional cap on the candidate length before the suffix
pub fn sanitize_key(raw: &str, used_keys: &mut HashSet<String>, max_len: Option<usize>) -> String {
    let base = clean_token(raw, max_len);

    if !used_keys.contains(&base) {
        used_keys.insert(base.clone());
        return base;
    }

    // A base ending in `_` reuses that underscore as the separator
    let separator = if base.ends_with('_') { "" } else { "_" };
    let key = (1..)
        .map(|suffix| format!("{base}{separator}{suffix}"))
        .find(|candidate| !used_keys.contains(candidate))
        .unwrap_or_default();

    used_keys.insert(key.clone());
    key
}

/// Produces the legal candidate for `raw` without checking uniqueness.
fn clean_token(raw: &str, max_len: Option<usize>) -> String {
    let raw = if raw.is_empty() { FALLBACK_KEY } else { raw };

    let replaced = ILLEGAL_CHARS_REGEX.replace_all(raw, "_");
    let mut token = UNDERSCORE_RUN_REGEX.replace_all(&replaced, "_").into_owned();

    // A zero cap would leave nothing to work with
    truncate_token(&mut token, max_len.map(|len| len.max(1)));

    if token.starts_with(|c: char| c.is_ascii_digit()) {
        token.insert(0, '_');
    }

    token
}

/// Issues unique keys for a single merge run.
///
/// Owns the set of keys issued so far, so two sanitizers never influence each
/// other.
#[derive(Debug, Default, Clone)]
pub struct KeySanitizer {
    used_keys: HashSet<String>,
    max_len: Option<usize>,
}

impl KeySanitizer {
    /// Creates a sanitizer with no length cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the length of generated candidates.
    #[must_use]
    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    /// Sanitizes `raw` into a key not issued before by this sanitizer.
    pub fn sanitize(&mut self, raw: &str) -> String {
        sanitize_key(raw, &mut self.used_keys, self.max_len)
    }

    /// Returns whether `key` has already been issued.
    pub fn is_used(&self, key: &str) -> bool {
        self.used_keys.contains(key)
    }

    /// Number of keys issued so far.
    pub fn len(&self) -> usize {
        self.used_keys.len()
    }

    /// Returns whether no key has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.used_keys.is_empty()
    }
}
