//! Wildcard normalization for name patterns.
//!
//! Callers write glob-style `*` wildcards; the store understands SQL `LIKE`
//! wildcards (`%`).

/// Wildcard token accepted from callers.
pub const USER_WILDCARD: char = '*';

/// Wildcard understood by the store.
pub const STORE_WILDCARD: char = '%';

/// Replaces every `*` in `pattern` with `%`.
///
/// Idempotent: a pattern that already uses `%` passes through unchanged.
pub fn normalize(pattern: &str) -> String {
    pattern.replace(USER_WILDCARD, "%")
}

/// Builds a "contains" pattern.
///
/// Normalizes `pattern`; if the result already carries a wildcard the caller
/// has taken explicit control and it is returned as-is, otherwise it is
/// wrapped as `%pattern%`. Empty input stays empty.
pub fn build_contains_pattern(pattern: &str) -> String {
    let normalized = normalize(pattern);
    if normalized.is_empty() || normalized.contains(STORE_WILDCARD) {
        return normalized;
    }
    format!("%{normalized}%")
}

/// Pattern matching values that start with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    format!("{}%", normalize(prefix))
}

/// Pattern matching values that end with `suffix`.
pub fn suffix_pattern(suffix: &str) -> String {
    format!("%{}", normalize(suffix))
}

/// Whether `value` matches `pattern` the way `LIKE` evaluates
/// [`build_contains_pattern`]: wildcards match any run of characters and
/// ASCII letters compare case-insensitively.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    let pattern = build_contains_pattern(pattern).to_ascii_lowercase();
    let value = value.to_ascii_lowercase();
    let parts: Vec<&str> = pattern.split(STORE_WILDCARD).collect();
    let Some((last, init)) = parts.split_last() else {
        return false;
    };
    let Some((first, middle)) = init.split_first() else {
        return value == *last;
    };
    let Some(mut rest) = value.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
