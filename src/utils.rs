/// Lower-cases a value and trims surrounding whitespace
///
/// # Arguments
///
/// * `value` - The field value to normalize
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Removes every ASCII space character, leaving other whitespace untouched
pub fn strip_spaces(value: &str) -> String {
    value.chars().filter(|c| *c != ' ').collect()
}

/// Returns the first non-empty value among the candidates, or an empty string
pub fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> &'a str {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

/// Truncates an ASCII-only token to at most `max_len` characters
pub fn truncate_token(token: &mut String, max_len: Option<usize>) {
    if let Some(max_len) = max_len {
        if let Some((idx, _)) = token.char_indices().nth(max_len) {
            token.truncate(idx);
        }
    }
}
