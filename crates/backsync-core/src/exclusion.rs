use crate::entry::{base_name, PATH_SEPARATOR};
use crate::error::Error;
use ahash::AHashSet;
use regex::Regex;

const REGEX_PREFIX: &str = "regex:";

/// Classifies names and relative paths against configured ignore patterns.
///
/// Pattern shapes:
/// - `regex:<expr>`: regular expression, must match the whole string
/// - no `*`: exact match (`.md5`, `Thumbs.db`)
/// - `*text*`: substring (`*cache*`)
/// - `text*`: prefix (`._*`, `.~lock*`)
/// - `*text`: suffix (`*.tmp`)
/// - anything else with `*`: wildcard, converted to a regex
///
/// Patterns containing `/` are only checked against the full relative path,
/// all other patterns only against the bare name.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    name_rules: RuleSet,
    path_rules: RuleSet,
}

#[derive(Debug, Clone, Default)]
struct RuleSet {
    exact: AHashSet<String>,
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    substrings: Vec<String>,
    regexes: Vec<Regex>,
}

impl RuleSet {
    fn add(&mut self, pattern: &str) -> Result<(), Error> {
        if let Some(expr) = pattern.strip_prefix(REGEX_PREFIX) {
            self.regexes.push(compile(pattern, &format!("^(?:{})$", expr))?);
            return Ok(());
        }

        let starts = pattern.starts_with('*');
        let ends = pattern.ends_with('*');

        if !pattern.contains('*') {
            self.exact.insert(pattern.to_string());
        } else if starts && ends && pattern.len() > 2 && !inner(pattern).contains('*') {
            self.substrings.push(inner(pattern).to_string());
        } else if ends && !starts && !pattern[..pattern.len() - 1].contains('*') {
            self.prefixes.push(pattern[..pattern.len() - 1].to_string());
        } else if starts && !ends && !pattern[1..].contains('*') {
            self.suffixes.push(pattern[1..].to_string());
        } else {
            let expr = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            self.regexes.push(compile(pattern, &format!("^{}$", expr))?);
        }
        Ok(())
    }

    fn matches(&self, value: &str) -> bool {
        self.exact.contains(value)
            || self.prefixes.iter().any(|p| value.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| value.ends_with(s.as_str()))
            || self.substrings.iter().any(|s| value.contains(s.as_str()))
            || self.regexes.iter().any(|r| r.is_match(value))
    }

    fn is_empty(&self) -> bool {
        self.exact.is_empty()
            && self.prefixes.is_empty()
            && self.suffixes.is_empty()
            && self.substrings.is_empty()
            && self.regexes.is_empty()
    }
}

fn inner(pattern: &str) -> &str {
    &pattern[1..pattern.len() - 1]
}

fn compile(pattern: &str, expr: &str) -> Result<Regex, Error> {
    Regex::new(expr).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl ExclusionMatcher {
    /// Builds a matcher, failing on the first pattern that does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = ExclusionMatcher::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.is_empty() {
                continue;
            }
            if pattern.contains(PATH_SEPARATOR) {
                matcher.path_rules.add(pattern)?;
            } else {
                matcher.name_rules.add(pattern)?;
            }
        }
        Ok(matcher)
    }

    /// Checks the bare `name` against name patterns and, when given,
    /// `full_path` against path patterns.
    pub fn is_excluded(&self, name: &str, full_path: Option<&str>) -> bool {
        if self.name_rules.matches(name) {
            return true;
        }
        match full_path {
            Some(path) => self.path_rules.matches(path),
            None => false,
        }
    }

    /// Same as [`is_excluded`](Self::is_excluded) for a relative path.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        self.is_excluded(base_name(path), Some(path))
    }

    pub fn is_empty(&self) -> bool {
        self.name_rules.is_empty() && self.path_rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> ExclusionMatcher {
        ExclusionMatcher::new(patterns).unwrap()
    }

    #[test]
    fn test_exact_patterns() {
        let m = matcher(&[".md5", "Thumbs.db", "desktop.ini"]);
        assert!(m.is_excluded(".md5", None));
        assert!(m.is_excluded("Thumbs.db", None));
        assert!(!m.is_excluded(".md5.bak", None));
        assert!(!m.is_excluded("prefix.md5", None));
    }

    #[test]
    fn test_prefix_and_suffix_patterns() {
        let m = matcher(&["._*", ".~lock*", "*.tmp", "*.bak"]);
        assert!(m.is_excluded("._file.txt", None));
        assert!(m.is_excluded("._", None));
        assert!(m.is_excluded(".~lock.file.odt", None));
        assert!(m.is_excluded("file.tmp", None));
        assert!(m.is_excluded(".tmp", None));
        assert!(!m.is_excluded("file._", None));
        assert!(!m.is_excluded("tmp", None));
    }

    #[test]
    fn test_substring_and_wildcard_patterns() {
        let m = matcher(&["*cache*", "IMG_*.jpg"]);
        assert!(m.is_excluded("mycacheX", None));
        assert!(m.is_excluded("cache", None));
        assert!(m.is_excluded("IMG_0001.jpg", None));
        assert!(!m.is_excluded("IMG_0001.png", None));
        assert!(!m.is_excluded("IMGX0001.jpg", None));
    }

    #[test]
    fn test_lone_star_matches_everything() {
        let m = matcher(&["*"]);
        assert!(m.is_excluded("anything", None));
        assert!(m.is_excluded("", None));
    }

    #[test]
    fn test_regex_is_full_match() {
        let m = matcher(&["regex:test[0-9]+\\.txt"]);
        assert!(m.is_excluded("test42.txt", None));
        assert!(!m.is_excluded("test.txt", None));
        assert!(!m.is_excluded("xtest42.txt", None));
        assert!(!m.is_excluded("test42.txt.bak", None));
    }

    #[test]
    fn test_mixed_patterns() {
        let m = matcher(&[".md5", "._*", "*.tmp", "*cache*", "regex:^test[0-9]+\\.txt$"]);
        assert!(m.is_excluded("._foo", None));
        assert!(m.is_excluded("data.tmp", None));
        assert!(m.is_excluded("mycacheX", None));
        assert!(m.is_excluded("test42.txt", None));
        assert!(!m.is_excluded("test.txt", None));
        assert!(!m.is_excluded("readme.md", None));
    }

    #[test]
    fn test_path_patterns_only_match_full_path() {
        let m = matcher(&["node_modules/*", ".md5"]);
        assert!(m.is_excluded("index.js", Some("node_modules/index.js")));
        assert!(!m.is_excluded("index.js", Some("src/index.js")));
        assert!(!m.is_excluded("node_modules/index.js", None));
        assert!(m.is_path_excluded("photos/2020/.md5"));
        assert!(!m.is_path_excluded("photos/.md5/readme.txt"));
    }

    #[test]
    fn test_invalid_regex_fails_construction() {
        let err = ExclusionMatcher::new(["regex:([a-z"]).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_matcher() {
        let m = matcher(&[]);
        assert!(m.is_empty());
        assert!(!m.is_excluded("anyfile.txt", Some("anyfile.txt")));
    }
}
