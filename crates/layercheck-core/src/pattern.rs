//! Package path patterns.
//!
//! Patterns are `.` separated segments with two kinds of wildcards:
//!
//! - `..` matches any number of segments, including none. A trailing `..`
//!   therefore selects a package and all of its subpackages, a leading `..`
//!   selects at any depth.
//! - `*`, `?` and `[...]` inside a segment match within that segment only.
//!
//! ```ignore
//! let p = PackagePattern::new("com.acme.core..")?;
//! assert!(p.matches("com.acme.core"));
//! assert!(p.matches("com.acme.core.model"));
//! assert!(!p.matches("com.acme.coreutils"));
//! ```

use std::fmt;

/// Errors from pattern construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Pattern is empty.
    #[error("pattern must not be empty")]
    Empty,

    /// Pattern contains an empty segment such as `a...b` or `a.`.
    #[error("pattern `{pattern}` contains an empty segment")]
    EmptySegment {
        /// The invalid pattern.
        pattern: String,
    },

    /// A segment wildcard is malformed.
    #[error("invalid wildcard in `{pattern}`: {reason}")]
    InvalidWildcard {
        /// The invalid pattern.
        pattern: String,
        /// Why it's invalid.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum Token {
    AnyPackages,
    Literal(String),
    Wildcard(glob::Pattern),
}

/// A compiled package path pattern.
#[derive(Debug, Clone)]
pub struct PackagePattern {
    raw: String,
    tokens: Vec<Token>,
}

impl PackagePattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is empty, has an empty segment, or a
    /// segment wildcard is malformed.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut tokens = Vec::new();
        for (i, piece) in trimmed.split("..").enumerate() {
            if i > 0 {
                tokens.push(Token::AnyPackages);
            }
            if piece.is_empty() {
                continue;
            }
            for segment in piece.split('.') {
                tokens.push(compile_segment(segment, trimmed)?);
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            tokens,
        })
    }

    /// Tests whether a package path matches this pattern.
    ///
    /// The default package is the empty path; only patterns made of `..`
    /// alone match it.
    #[must_use]
    pub fn matches(&self, package: &str) -> bool {
        let segments: Vec<&str> = if package.is_empty() {
            Vec::new()
        } else {
            package.split('.').collect()
        };
        match_tokens(&segments, &self.tokens)
    }

    /// Returns the pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for PackagePattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PackagePattern {}

impl fmt::Display for PackagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn compile_segment(segment: &str, pattern: &str) -> Result<Token, PatternError> {
    if segment.is_empty() {
        return Err(PatternError::EmptySegment {
            pattern: pattern.to_string(),
        });
    }
    if segment.contains(['*', '?', '[']) {
        let compiled = glob::Pattern::new(segment).map_err(|e| PatternError::InvalidWildcard {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Token::Wildcard(compiled))
    } else {
        Ok(Token::Literal(segment.to_string()))
    }
}

fn match_tokens(path: &[&str], tokens: &[Token]) -> bool {
    let Some((first, rest)) = tokens.split_first() else {
        return path.is_empty();
    };

    match first {
        // Try matching zero or more segments
        Token::AnyPackages => (0..=path.len()).any(|i| match_tokens(&path[i..], rest)),
        Token::Literal(literal) => {
            path.first().is_some_and(|seg| seg == literal) && match_tokens(&path[1..], rest)
        }
        Token::Wildcard(glob) => {
            path.first().is_some_and(|seg| glob.matches(seg)) && match_tokens(&path[1..], rest)
        }
    }
}

/// A set of package patterns; a package is selected when any pattern matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSelector {
    patterns: Vec<PackagePattern>,
}

impl PackageSelector {
    /// Creates a selector from compiled patterns.
    #[must_use]
    pub fn new(patterns: Vec<PackagePattern>) -> Self {
        Self { patterns }
    }

    /// Compiles every pattern of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns the first pattern error.
    pub fn parse<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| PackagePattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Returns the patterns.
    #[must_use]
    pub fn patterns(&self) -> &[PackagePattern] {
        &self.patterns
    }

    /// Returns true if the selector has no pattern (selects nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Tests whether a package path is selected.
    #[must_use]
    pub fn matches(&self, package: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(package))
    }
}

impl fmt::Display for PackageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patterns.as_slice() {
            [single] => write!(f, "'{single}'"),
            many => {
                let quoted: Vec<String> = many.iter().map(|p| format!("'{p}'")).collect();
                write!(f, "[{}]", quoted.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(p: &str) -> PackagePattern {
        PackagePattern::new(p).unwrap()
    }

    #[test]
    fn literal_matches_exact_package_only() {
        let p = pat("com.acme.core");
        assert!(p.matches("com.acme.core"));
        assert!(!p.matches("com.acme.core.model"));
        assert!(!p.matches("com.acme"));
    }

    #[test]
    fn trailing_dots_match_subpackages() {
        let p = pat("com.acme.core..");
        assert!(p.matches("com.acme.core"));
        assert!(p.matches("com.acme.core.model.value"));
        assert!(!p.matches("com.acme.coreutils"));
        assert!(!p.matches("com.acme"));
    }

    #[test]
    fn leading_dots_match_at_any_depth() {
        let p = pat("..service..");
        assert!(p.matches("service"));
        assert!(p.matches("com.acme.service"));
        assert!(p.matches("com.acme.service.impl"));
        assert!(!p.matches("com.acme.services"));
    }

    #[test]
    fn inner_dots_bridge_segments() {
        let p = pat("com..model");
        assert!(p.matches("com.model"));
        assert!(p.matches("com.acme.core.model"));
        assert!(!p.matches("com.acme.model.value"));
    }

    #[test]
    fn segment_wildcards_stay_within_segment() {
        let p = pat("com.*.core");
        assert!(p.matches("com.acme.core"));
        assert!(!p.matches("com.acme.x.core"));

        let p = pat("com.layer?a..");
        assert!(p.matches("com.layer1a"));
        assert!(p.matches("com.layer2a.sub"));
        assert!(!p.matches("com.layer10a"));
    }

    #[test]
    fn bare_dots_match_everything_including_default_package() {
        let p = pat("..");
        assert!(p.matches(""));
        assert!(p.matches("a.b.c"));
        assert!(!pat("a..").matches(""));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert_eq!(PackagePattern::new("  "), Err(PatternError::Empty));
        assert!(matches!(
            PackagePattern::new("a...b"),
            Err(PatternError::EmptySegment { .. })
        ));
        assert!(matches!(
            PackagePattern::new("a.b."),
            Err(PatternError::EmptySegment { .. })
        ));
        assert!(matches!(
            PackagePattern::new("a.[b"),
            Err(PatternError::InvalidWildcard { .. })
        ));
    }

    #[test]
    fn selector_matches_any_pattern() {
        let s = PackageSelector::parse(["a..", "b.c"]).unwrap();
        assert!(s.matches("a.x"));
        assert!(s.matches("b.c"));
        assert!(!s.matches("b.c.d"));
        assert_eq!(s.to_string(), "['a..', 'b.c']");
        assert_eq!(
            PackageSelector::parse(["a.."]).unwrap().to_string(),
            "'a..'"
        );
    }
}
