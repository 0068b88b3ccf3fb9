//! Shell quoting helpers for generated scripts

use std::collections::BTreeMap;

/// Quote a string as a single shell word
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '+' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote a remote path. Relative paths are anchored at `$HOME`.
pub fn path(p: &str) -> String {
    if p.starts_with('/') {
        quote(p)
    } else if let Some(rest) = p.strip_prefix("~/") {
        format!("\"$HOME\"/{}", quote(rest))
    } else {
        format!("\"$HOME\"/{}", quote(p))
    }
}

/// `export` lines for an environment map
pub fn exports(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("export {}={}\n", key, quote(value)))
        .collect()
}

/// Join words after quoting each one
pub fn join<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
