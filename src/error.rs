//! Composition error taxonomy.
//!
//! [`ComposeError`] is what [`Composer::rebuild`](crate::compose::Composer::rebuild)
//! hands back. Every variant except [`ComposeError::CacheWriteFailed`] is
//! batch-fatal: the rebuild stops at the first one and returns it unchanged.
//! A missing *override* source is not an error at all; the provider is skipped.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cache::CacheIdentifier;
use crate::model::{ClassKey, ProviderId};
use crate::parser::ParseError;

/// Errors raised while composing merged units.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The base unit of a registered class key does not exist.
    #[error(
        "base source for `{class_key}` does not exist: {}",
        describe_location(provider, path.as_deref())
    )]
    MissingSource {
        /// The class key being rebuilt.
        class_key: ClassKey,
        /// The provider owning base units.
        provider: ProviderId,
        /// Where the base was expected, if the provider resolved at all.
        path: Option<PathBuf>,
    },

    /// A unit expected to hold a class holds none.
    #[error("no class definition found in {}", path.display())]
    NoClassFound {
        /// The offending source file.
        path: PathBuf,
    },

    /// A unit does not have the one-class, balanced-brace shape composition needs.
    #[error("unsupported source shape in {}: {source}", path.display())]
    UnsupportedShape {
        /// The offending source file.
        path: PathBuf,
        /// What the boundary parser rejected.
        source: ParseError,
    },

    /// A source file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The source file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The cache store refused a merged unit.
    #[error("cache write failed for `{identifier}`: {message}")]
    CacheWriteFailed {
        /// The entry that could not be written.
        identifier: CacheIdentifier,
        /// The backend's message, unmodified.
        message: String,
    },
}

impl ComposeError {
    /// Map a boundary-parser failure on `path` to the composition taxonomy.
    #[must_use]
    pub fn from_parse(path: &Path, err: ParseError) -> Self {
        match err {
            ParseError::NoClassFound => Self::NoClassFound {
                path: path.to_owned(),
            },
            other => Self::UnsupportedShape {
                path: path.to_owned(),
                source: other,
            },
        }
    }

    /// Returns `true` if this error aborts the whole rebuild.
    #[must_use]
    pub const fn is_batch_fatal(&self) -> bool {
        !matches!(self, Self::CacheWriteFailed { .. })
    }
}

fn describe_location(provider: &ProviderId, path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("{} (provider `{provider}`)", p.display()),
        None => format!("provider `{provider}` has no source location"),
    }
}
