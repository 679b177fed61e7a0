//! Per-key results of a rebuild.

use std::fmt;

use serde::Serialize;

use crate::cache::CacheIdentifier;
use crate::error::ComposeError;
use crate::model::ClassKey;

/// What happened to one class key during a rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum KeyOutcome {
    /// A merged unit was written.
    Written {
        /// Cache entry that now holds the merged unit.
        identifier: CacheIdentifier,
        /// Number of override sources that were merged.
        overrides: usize,
        /// Hex SHA-256 of the written text.
        sha256: String,
    },
    /// No override source was found; nothing was written and loaders keep
    /// using the original unit.
    Passthrough,
    /// The cache refused the merged unit.
    WriteFailed {
        /// Cache entry that could not be written.
        identifier: CacheIdentifier,
        /// Backend message.
        message: String,
    },
}

impl fmt::Display for KeyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written {
                identifier,
                overrides,
                ..
            } => write!(f, "written {identifier} ({overrides} override(s))"),
            Self::Passthrough => write!(f, "passthrough (no overrides)"),
            Self::WriteFailed {
                identifier,
                message,
            } => write!(f, "write-failed {identifier}: {message}"),
        }
    }
}

/// Result for one class key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    /// The class key.
    pub class_key: ClassKey,
    /// What happened to it.
    #[serde(flatten)]
    pub outcome: KeyOutcome,
}

/// Results of one rebuild, in registry order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// One entry per processed class key.
    pub keys: Vec<KeyReport>,
}

impl RebuildReport {
    /// Record the outcome for a class key.
    pub fn push(&mut self, class_key: ClassKey, outcome: KeyOutcome) {
        self.keys.push(KeyReport { class_key, outcome });
    }

    /// Number of merged units written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.keys
            .iter()
            .filter(|k| matches!(k.outcome, KeyOutcome::Written { .. }))
            .count()
    }

    /// Number of keys left untouched for lack of overrides.
    #[must_use]
    pub fn passthrough(&self) -> usize {
        self.keys
            .iter()
            .filter(|k| k.outcome == KeyOutcome::Passthrough)
            .count()
    }

    /// The first cache write failure, as a [`ComposeError::CacheWriteFailed`].
    #[must_use]
    pub fn first_failure(&self) -> Option<ComposeError> {
        self.keys.iter().find_map(|k| match &k.outcome {
            KeyOutcome::WriteFailed {
                identifier,
                message,
            } => Some(ComposeError::CacheWriteFailed {
                identifier: identifier.clone(),
                message: message.clone(),
            }),
            _ => None,
        })
    }

    /// Returns `true` if no write failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self
            .keys
            .iter()
            .any(|k| matches!(k.outcome, KeyOutcome::WriteFailed { .. }))
    }
}
