//! Room patterns
//!
//! Patterns are `/`-separated segments where `:name` captures one segment and `*` captures
//! the remainder, e.g. `chat/:id` or `files/*`.

use regex::Regex;
use std::collections::BTreeMap;

/// Parameters captured by a matching pattern
pub type RoomParams = BTreeMap<String, String>;

/// Room pattern parse errors
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Room pattern is empty")]
    Empty,

    #[error("Invalid parameter name `{0}` in room pattern")]
    InvalidParam(String),

    #[error("Parameter `{0}` appears twice in room pattern")]
    DuplicateParam(String),

    #[error("Room pattern does not compile: {0}")]
    Regex(#[from] regex::Error),
}

/// A compiled room pattern
#[derive(Debug, Clone)]
pub struct RoomPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl RoomPattern {
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        if source.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut params: Vec<String> = Vec::new();
        let mut segments = Vec::new();

        for segment in source.split('/') {
            let param = if segment == "*" {
                Some("splat")
            } else {
                segment.strip_prefix(':')
            };

            match param {
                Some(name) => {
                    if !is_param_name(name) {
                        return Err(PatternError::InvalidParam(name.to_string()));
                    }
                    if params.iter().any(|p| p == name) {
                        return Err(PatternError::DuplicateParam(name.to_string()));
                    }
                    let body = if segment == "*" { ".*" } else { "[^/]+" };
                    segments.push(format!("(?P<{name}>{body})"));
                    params.push(name.to_string());
                }
                None => segments.push(regex::escape(segment)),
            }
        }

        let regex = Regex::new(&format!("^{}$", segments.join("/")))?;

        Ok(Self {
            source: source.to_string(),
            regex,
            params,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Captured parameters when `room` matches the whole pattern
    #[must_use]
    pub fn matches(&self, room: &str) -> Option<RoomParams> {
        let captures = self.regex.captures(room)?;

        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

fn is_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = RoomPattern::parse("lobby").unwrap();
        assert_eq!(pattern.matches("lobby"), Some(RoomParams::new()));
        assert!(pattern.matches("lobby2").is_none());
        assert!(pattern.params().is_empty());
    }

    #[test]
    fn test_named_params() {
        let pattern = RoomPattern::parse("org/:org/chat/:id").unwrap();
        let params = pattern.matches("org/acme/chat/42").unwrap();

        assert_eq!(params.get("org").map(String::as_str), Some("acme"));
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(pattern.matches("org/acme/chat").is_none());
        assert!(pattern.matches("org/acme/chat/42/extra").is_none());
    }

    #[test]
    fn test_splat() {
        let pattern = RoomPattern::parse("files/*").unwrap();
        let params = pattern.matches("files/a/b.txt").unwrap();
        assert_eq!(params.get("splat").map(String::as_str), Some("a/b.txt"));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let pattern = RoomPattern::parse("v1.0/:id").unwrap();
        assert!(pattern.matches("v1.0/7").is_some());
        assert!(pattern.matches("v1x0/7").is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(RoomPattern::parse(""), Err(PatternError::Empty)));
        assert!(matches!(
            RoomPattern::parse("chat/:"),
            Err(PatternError::InvalidParam(_))
        ));
        assert!(matches!(
            RoomPattern::parse("chat/:1st"),
            Err(PatternError::InvalidParam(_))
        ));
        assert!(matches!(
            RoomPattern::parse(":id/:id"),
            Err(PatternError::DuplicateParam(_))
        ));
    }
}
