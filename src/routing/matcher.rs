//! Path pattern matching.
//!
//! # Syntax
//! - Literal segments match exactly (case-sensitive)
//! - `*` matches exactly one non-empty segment
//! - `**` matches zero or more segments and is only valid as the last segment
//!
//! # Design Decisions
//! - A single trailing slash on the request path is ignored
//! - No regex, matching is a linear walk over segments

use std::fmt;

use thiserror::Error;

/// Errors produced while parsing a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("'**' is only allowed as the last segment: {0}")]
    DoubleWildcardNotLast(String),
    #[error("empty segment in pattern: {0}")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
    Rest,
}

/// A compiled glob-style path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern such as `/api/user/**`.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| PatternError::MissingLeadingSlash(raw.to_string()))?;

        let mut segments = Vec::new();
        if !body.is_empty() {
            let parts: Vec<&str> = body.trim_end_matches('/').split('/').collect();
            let last = parts.len() - 1;
            for (i, part) in parts.iter().enumerate() {
                let segment = match *part {
                    "" => return Err(PatternError::EmptySegment(raw.to_string())),
                    "**" if i != last => {
                        return Err(PatternError::DoubleWildcardNotLast(raw.to_string()))
                    }
                    "**" => Segment::Rest,
                    "*" => Segment::Any,
                    literal => Segment::Literal(literal.to_string()),
                };
                segments.push(segment);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if the request path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.strip_prefix('/').unwrap_or(path);
        let path = path.strip_suffix('/').unwrap_or(path);
        let parts: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest => return true,
                Segment::Any => match parts.get(i) {
                    Some(part) if !part.is_empty() => {}
                    _ => return false,
                },
                Segment::Literal(expected) => match parts.get(i) {
                    Some(part) if *part == expected.as_str() => {}
                    _ => return false,
                },
            }
        }

        parts.len() == self.segments.len()
    }

    /// Returns true if every path matched by `other` is also matched by `self`.
    ///
    /// Used to detect routes made unreachable by an earlier, broader route.
    pub fn covers(&self, other: &PathPattern) -> bool {
        for (i, segment) in self.segments.iter().enumerate() {
            if *segment == Segment::Rest {
                return true;
            }
            match (segment, other.segments.get(i)) {
                (_, None) | (_, Some(Segment::Rest)) => return false,
                (Segment::Any, Some(Segment::Any | Segment::Literal(_))) => {}
                (Segment::Literal(a), Some(Segment::Literal(b))) if a == b => {}
                _ => return false,
            }
        }
        other.segments.len() == self.segments.len()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(raw: &str) -> PathPattern {
        PathPattern::parse(raw).unwrap()
    }

    #[test]
    fn test_trailing_double_wildcard() {
        let p = pattern("/api/user/**");
        assert!(p.matches("/api/user"));
        assert!(p.matches("/api/user/"));
        assert!(p.matches("/api/user/123"));
        assert!(p.matches("/api/user/123/follow"));
        assert!(!p.matches("/api/users"));
        assert!(!p.matches("/api"));
        assert!(!p.matches("/other/user/1"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let p = pattern("/api/*/profile");
        assert!(p.matches("/api/42/profile"));
        assert!(!p.matches("/api/profile"));
        assert!(!p.matches("/api/42/7/profile"));
        assert!(!p.matches("/api//profile"));
    }

    #[test]
    fn test_literal_is_exact_and_case_sensitive() {
        let p = pattern("/api/route");
        assert!(p.matches("/api/route"));
        assert!(p.matches("/api/route/"));
        assert!(!p.matches("/api/route/1"));
        assert!(!p.matches("/API/route"));
    }

    #[test]
    fn test_root_patterns() {
        assert!(pattern("/").matches("/"));
        assert!(!pattern("/").matches("/a"));
        assert!(pattern("/**").matches("/"));
        assert!(pattern("/**").matches("/anything/at/all"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            PathPattern::parse("api/**"),
            Err(PatternError::MissingLeadingSlash("api/**".into()))
        );
        assert_eq!(
            PathPattern::parse("/api/**/user"),
            Err(PatternError::DoubleWildcardNotLast("/api/**/user".into()))
        );
        assert_eq!(
            PathPattern::parse("/api//user"),
            Err(PatternError::EmptySegment("/api//user".into()))
        );
    }

    #[test]
    fn test_covers() {
        assert!(pattern("/api/**").covers(&pattern("/api/route")));
        assert!(pattern("/api/**").covers(&pattern("/api/route/**")));
        assert!(pattern("/api/*").covers(&pattern("/api/route")));
        assert!(pattern("/api/user/**").covers(&pattern("/api/user/**")));
        assert!(!pattern("/api/auth/**").covers(&pattern("/api/user/**")));
        assert!(!pattern("/api/*").covers(&pattern("/api/route/**")));
        assert!(!pattern("/api/route").covers(&pattern("/api/*")));
    }
}
