//! Exclusion rules for packaged files
//!
//! Rules are evaluated case-sensitively against `/` separated paths relative
//! to a file spec root. Directories are tested with a trailing `/`, so `tmp/`
//! excludes the whole `tmp` directory. A rule without glob characters is a
//! prefix applied at every path component boundary; a rule with glob
//! characters must match the whole relative path, or the entry name when the
//! rule has no `/`.

use glob::{MatchOptions, Pattern};

use crate::errors::RolloutError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Rule {
    Prefix(String),
    Glob { pattern: Pattern, name_only: bool },
}

impl Rule {
    fn parse(raw: &str) -> Result<Self, RolloutError> {
        let raw = raw.trim_start_matches("./");
        if raw.contains(['*', '?', '[']) {
            let trimmed = raw.trim_end_matches('/');
            let pattern = Pattern::new(trimmed).map_err(|e| {
                RolloutError::ConfigError(format!("invalid exclusion pattern {:?}: {}", raw, e))
            })?;
            Ok(Rule::Glob {
                pattern,
                name_only: !trimmed.contains('/'),
            })
        } else {
            Ok(Rule::Prefix(raw.to_string()))
        }
    }

    fn matches(&self, rel: &str) -> bool {
        match self {
            Rule::Prefix(prefix) => {
                rel.starts_with(prefix.as_str())
                    || rel
                        .match_indices('/')
                        .any(|(i, _)| rel[i + 1..].starts_with(prefix.as_str()))
            }
            Rule::Glob { pattern, name_only } => {
                let path = rel.trim_end_matches('/');
                if pattern.matches_with(path, MATCH_OPTIONS) {
                    return true;
                }
                *name_only && {
                    let name = path.rsplit('/').next().unwrap_or(path);
                    pattern.matches_with(name, MATCH_OPTIONS)
                }
            }
        }
    }
}

/// Union of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    rules: Vec<Rule>,
}

impl ExcludeSet {
    pub fn new<I, S>(rules: I) -> Result<Self, RolloutError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = rules
            .into_iter()
            .filter(|r| !r.as_ref().trim().is_empty())
            .map(|r| Rule::parse(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Whether a relative path is excluded; directories end with `/`
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(rel))
    }
}
