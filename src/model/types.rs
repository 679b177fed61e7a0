//! Identifier types for class composition.
//!
//! [`ClassKey`] names a logical class (and doubles as a relative source path,
//! so it is validated against traversal). [`ProviderId`] names a provider
//! that may contribute an override fragment for a class key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClassKey
// ---------------------------------------------------------------------------

/// A validated class key such as `Domain/Model/News`.
///
/// Keys are made of segments separated by `/` (a `\` is accepted as an
/// alternative separator). Each segment is ASCII alphanumeric plus `_` and
/// `-`. Empty segments and leading separators are rejected so a key can be
/// joined onto a provider root without escaping it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassKey(String);

impl ClassKey {
    /// The maximum length of a class key.
    pub const MAX_LEN: usize = 255;

    /// Create a new `ClassKey`, validating format.
    ///
    /// # Errors
    /// Returns an error if the key is empty, too long, has empty segments, or
    /// contains characters outside `[A-Za-z0-9_-/\\]`.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the key as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the key's path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(['/', '\\'])
    }

    /// The key lowercased with separators turned into `_`.
    ///
    /// Cache identifiers are derived from this form, so two keys with the
    /// same flattened form share a cache entry.
    #[must_use]
    pub fn flattened(&self) -> String {
        self.0.to_lowercase().replace(['/', '\\'], "_")
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        let fail = |reason: &str| ValidationError {
            kind: ErrorKind::ClassKey,
            value: s.to_owned(),
            reason: reason.to_owned(),
        };
        if s.is_empty() {
            return Err(fail("class key must not be empty"));
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::ClassKey,
                value: s.to_owned(),
                reason: format!(
                    "class key must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '\\'))
        {
            return Err(fail(
                "class key must contain only letters, digits, '_', '-' and path separators",
            ));
        }
        if s.split(['/', '\\']).any(str::is_empty) {
            return Err(fail(
                "class key must not start or end with a separator or contain empty segments",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClassKey {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClassKey {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ClassKey> for String {
    fn from(key: ClassKey) -> Self {
        key.0
    }
}

// ---------------------------------------------------------------------------
// ProviderId
// ---------------------------------------------------------------------------

/// A validated provider identifier, e.g. `news` or `news_extender`.
///
/// Provider ids are ASCII alphanumeric with `_` and `-`, 1–64 characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// The maximum length of a provider id.
    pub const MAX_LEN: usize = 64;

    /// Create a new `ProviderId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains invalid characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::ProviderId,
                value: s.to_owned(),
                reason: "provider id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::ProviderId,
                value: s.to_owned(),
                reason: format!(
                    "provider id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::ProviderId,
                value: s.to_owned(),
                reason: "provider id must contain only letters, digits, '_' and '-'".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`ClassKey`].
    ClassKey,
    /// A [`ProviderId`].
    ProviderId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassKey => write!(f, "class key"),
            Self::ProviderId => write!(f, "provider id"),
        }
    }
}

/// A validation error for identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- ClassKey --

    #[test]
    fn class_key_accepts_nested_paths() {
        let key = ClassKey::new("Domain/Model/News").unwrap();
        assert_eq!(key.as_str(), "Domain/Model/News");
        assert_eq!(
            key.segments().collect::<Vec<_>>(),
            vec!["Domain", "Model", "News"]
        );
    }

    #[test]
    fn class_key_accepts_backslash_separator() {
        let key = ClassKey::new("Domain\\Model\\News").unwrap();
        assert_eq!(key.segments().count(), 3);
    }

    #[test]
    fn class_key_flattened_form() {
        let key = ClassKey::new("Domain\\Model/News").unwrap();
        assert_eq!(key.flattened(), "domain_model_news");
        assert_eq!(
            ClassKey::new("Domain/Model_News").unwrap().flattened(),
            key.flattened()
        );
    }

    #[test]
    fn class_key_rejects_empty() {
        let err = ClassKey::new("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ClassKey);
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn class_key_rejects_traversal() {
        assert!(ClassKey::new("../etc/passwd").is_err());
        assert!(ClassKey::new("Domain/../News").is_err());
    }

    #[test]
    fn class_key_rejects_leading_and_doubled_separators() {
        assert!(ClassKey::new("/Domain/News").is_err());
        assert!(ClassKey::new("Domain//News").is_err());
        assert!(ClassKey::new("Domain/News/").is_err());
    }

    #[test]
    fn class_key_rejects_too_long() {
        let long = "a".repeat(ClassKey::MAX_LEN + 1);
        let err = ClassKey::new(&long).unwrap_err();
        assert!(err.reason.contains("at most"));
    }

    #[test]
    fn class_key_serde_roundtrip_validates() {
        let key: ClassKey = serde_json::from_str("\"Controller/NewsController\"").unwrap();
        assert_eq!(key.as_str(), "Controller/NewsController");
        assert!(serde_json::from_str::<ClassKey>("\"bad key\"").is_err());
    }

    // -- ProviderId --

    #[test]
    fn provider_id_valid() {
        let id = ProviderId::new("news_extender").unwrap();
        assert_eq!(id.to_string(), "news_extender");
    }

    #[test]
    fn provider_id_rejects_separators() {
        let err = ProviderId::new("ext/news").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProviderId);
    }

    #[test]
    fn provider_id_rejects_empty() {
        assert!(ProviderId::new("").is_err());
    }

    #[test]
    fn validation_error_display_names_kind_and_value() {
        let err = ProviderId::new("a b").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("provider id"));
        assert!(msg.contains("\"a b\""));
    }
}
