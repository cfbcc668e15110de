//! Bus subject grammar and validation.
//!
//! A subject is a dot-separated sequence of tokens. Concrete tokens match
//! `[A-Za-z0-9_-]+`; the wildcards `*` (single token) and `>` (one-or-more
//! trailing tokens) are only meaningful in subscription patterns, never in a
//! subject a message is actually published on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::CoreError;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// A validated, concrete (wildcard-free) bus subject.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    /// Validate and construct a subject from a literal string. Every token
    /// must match `[A-Za-z0-9_-]+`; no `*` or `>` tokens are allowed here —
    /// those belong to `SubjectPattern`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::InvalidSubject("empty subject".into()));
        }
        for token in raw.split('.') {
            if !TOKEN_RE.is_match(token) {
                return Err(CoreError::InvalidSubject(format!(
                    "invalid token {token:?} in subject {raw:?}"
                )));
            }
        }
        Ok(Subject(raw.to_owned()))
    }

    /// Build a subject out of already-sanitized tokens, joining with `.`.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = tokens
            .into_iter()
            .map(|t| t.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(".");
        Self::parse(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A subscription pattern: concrete tokens plus `*` (single token) and `>`
/// (one-or-more trailing tokens, only legal as the final token).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectPattern {
    raw: String,
    tokens: Vec<PatternToken>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PatternToken {
    Literal(String),
    Single,
    Rest,
}

impl SubjectPattern {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::InvalidSubject("empty subject pattern".into()));
        }
        let parts: Vec<&str> = raw.split('.').collect();
        let mut tokens = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let last = idx == parts.len() - 1;
            let token = match *part {
                "*" => PatternToken::Single,
                ">" => {
                    if !last {
                        return Err(CoreError::InvalidSubject(format!(
                            "'>' must be the final token in pattern {raw:?}"
                        )));
                    }
                    PatternToken::Rest
                }
                other => {
                    if !TOKEN_RE.is_match(other) {
                        return Err(CoreError::InvalidSubject(format!(
                            "invalid token {other:?} in pattern {raw:?}"
                        )));
                    }
                    PatternToken::Literal(other.to_owned())
                }
            };
            tokens.push(token);
        }
        Ok(SubjectPattern { raw: raw.to_owned(), tokens })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether a concrete subject matches this pattern.
    pub fn matches(&self, subject: &Subject) -> bool {
        let subj_tokens: Vec<&str> = subject.tokens().collect();
        let mut si = 0usize;
        for pat in self.tokens.iter() {
            match pat {
                PatternToken::Rest => return si < subj_tokens.len(),
                PatternToken::Single => {
                    if si >= subj_tokens.len() {
                        return false;
                    }
                    si += 1;
                }
                PatternToken::Literal(lit) => {
                    if subj_tokens.get(si) != Some(&lit.as_str()) {
                        return false;
                    }
                    si += 1;
                }
            }
        }
        si == subj_tokens.len()
    }
}

impl fmt::Display for SubjectPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Validate a single untrusted token (e.g. a user-supplied entity name)
/// before splicing it into a subject. This is the "subject-token sanitiser"
/// referenced by spec.md's testable properties.
pub fn validate_token(token: &str) -> Result<(), CoreError> {
    if TOKEN_RE.is_match(token) {
        Ok(())
    } else {
        Err(CoreError::InvalidSubject(format!("invalid token {token:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_wildcards_in_concrete_subjects() {
        assert!(Subject::parse("statemgr.host.*.state").is_err());
        assert!(Subject::parse("statemgr.host.>").is_err());
    }

    #[test]
    fn accepts_well_formed_subject() {
        assert!(Subject::parse("statemgr.host.host-0.state").is_ok());
    }

    #[test]
    fn rest_must_be_final_token() {
        assert!(SubjectPattern::parse("statemgr.>.state").is_err());
        assert!(SubjectPattern::parse("statemgr.state.>").is_ok());
    }

    #[test]
    fn pattern_matching() {
        let pat = SubjectPattern::parse("sensormon.*.reading").unwrap();
        assert!(pat.matches(&Subject::parse("sensormon.cpu-temp.reading").unwrap()));
        assert!(!pat.matches(&Subject::parse("sensormon.cpu-temp.extra.reading").unwrap()));

        let rest = SubjectPattern::parse("statemgr.state.>").unwrap();
        assert!(rest.matches(&Subject::parse("statemgr.state.host.host-0").unwrap()));
        assert!(!rest.matches(&Subject::parse("statemgr.state").unwrap()));
    }

    proptest! {
        #[test]
        fn token_sanitiser_matches_grammar(s in "\\PC*") {
            let is_valid_grammar = !s.is_empty() && s.chars().all(|c| {
                c.is_ascii_alphanumeric() || c == '_' || c == '-'
            });
            prop_assert_eq!(validate_token(&s).is_ok(), is_valid_grammar);
        }
    }
}
