//! Glob-style search patterns

/// Translate glob wildcards into backend LIKE wildcards
///
/// `*` becomes `%` (any sequence) and `?` becomes `_` (any single
/// character). With `case_insensitive` the result is lower-cased so it can
/// be matched against a lower-cased attribute (see
/// [`Predicate::ilike`](crate::query::Predicate::ilike)).
///
/// # Example
///
/// ```rust
/// use acton_persistence::repository::wildcard;
///
/// assert_eq!(wildcard("abc*", true), "abc%");
/// assert_eq!(wildcard("a?c", true), "a_c");
/// assert_eq!(wildcard("ABC", false), "ABC");
/// assert_eq!(wildcard("ABC*", true), "abc%");
/// ```
pub fn wildcard(text: &str, case_insensitive: bool) -> String {
    let translated: String = text
        .chars()
        .map(|c| match c {
            '*' => '%',
            '?' => '_',
            other => other,
        })
        .collect();
    if case_insensitive {
        translated.to_lowercase()
    } else {
        translated
    }
}

/// [`wildcard`] with case-insensitive matching
pub fn wildcard_default(text: &str) -> String {
    wildcard(text, true)
}
