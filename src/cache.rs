//! Cache store for merged units.
//!
//! The composer only needs `set` and `get`. Identifier uniqueness is the
//! composer's job ([`CacheIdentifier::for_class`]); stores know nothing
//! about class keys.
//!
//! - [`FileCacheStore`] keeps one file per entry, written atomically
//!   (temp file + fsync + rename), and offers a cross-process
//!   [`RebuildLock`].
//! - [`MemoryCacheStore`] backs dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

use crate::model::ClassKey;

/// File name of the advisory lock held during a rebuild.
pub const LOCK_FILE: &str = ".rebuild.lock";

// ---------------------------------------------------------------------------
// CacheIdentifier
// ---------------------------------------------------------------------------

/// A cache entry identifier: `[A-Za-z0-9_%&-]+`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct CacheIdentifier(String);

impl CacheIdentifier {
    /// Validate a raw identifier.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidIdentifier`] for empty identifiers or
    /// characters outside `[A-Za-z0-9_%&-]`.
    pub fn new(s: &str) -> Result<Self, CacheError> {
        Self::validate(s, false)?;
        Ok(Self(s.to_owned()))
    }

    /// Derive the identifier of a class key's merged unit.
    ///
    /// The key is lowercased and its path separators become `_`, then
    /// `prefix` is prepended so entries cannot collide with unrelated ones.
    /// `prefix` must satisfy [`CacheIdentifier::validate_prefix`].
    #[must_use]
    pub fn for_class(prefix: &str, key: &ClassKey) -> Self {
        Self(format!("{prefix}{}", key.flattened()))
    }

    /// Check that `prefix` only holds identifier characters.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidIdentifier`] on any other character.
    pub fn validate_prefix(prefix: &str) -> Result<(), CacheError> {
        Self::validate(prefix, true)
    }

    /// The identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str, allow_empty: bool) -> Result<(), CacheError> {
        if s.is_empty() && !allow_empty {
            return Err(CacheError::InvalidIdentifier {
                value: s.to_owned(),
                reason: "identifier must not be empty".to_owned(),
            });
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '%' | '&')))
        {
            return Err(CacheError::InvalidIdentifier {
                value: s.to_owned(),
                reason: format!("character {bad:?} is not allowed"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CacheIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheIdentifier> for String {
    fn from(id: CacheIdentifier) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors from a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No entry exists for the identifier.
    #[error("no cache entry for `{identifier}`")]
    NotFound {
        /// The identifier that was looked up.
        identifier: String,
    },

    /// An identifier or identifier prefix failed validation.
    #[error("invalid cache identifier {value:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Writing an entry failed.
    #[error("cannot write cache entry `{identifier}`: {source}")]
    Write {
        /// The entry being written.
        identifier: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Reading an entry failed for a reason other than absence.
    #[error("cannot read cache entry `{identifier}`: {source}")]
    Read {
        /// The entry being read.
        identifier: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The rebuild lock could not be acquired.
    #[error("cannot lock {}: {source}", path.display())]
    Lock {
        /// The lock file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The backend refused the entry.
    #[error("cache backend rejected `{identifier}`: {message}")]
    Rejected {
        /// The entry being written.
        identifier: String,
        /// Backend message.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Persistent key-value storage for merged units.
pub trait CacheStore {
    /// Store `text` under `identifier`, replacing any previous entry.
    ///
    /// # Errors
    /// Returns a [`CacheError`] when the backend cannot persist the entry.
    fn set(&self, identifier: &CacheIdentifier, text: &str) -> Result<(), CacheError>;

    /// Fetch the entry stored under `identifier`.
    ///
    /// # Errors
    /// Returns [`CacheError::NotFound`] when there is no entry.
    fn get(&self, identifier: &CacheIdentifier) -> Result<String, CacheError>;

    /// Returns `true` if an entry exists for `identifier`.
    fn has(&self, identifier: &CacheIdentifier) -> bool {
        self.get(identifier).is_ok()
    }
}

impl<T: CacheStore + ?Sized> CacheStore for &T {
    fn set(&self, identifier: &CacheIdentifier, text: &str) -> Result<(), CacheError> {
        (**self).set(identifier, text)
    }

    fn get(&self, identifier: &CacheIdentifier) -> Result<String, CacheError> {
        (**self).get(identifier)
    }

    fn has(&self, identifier: &CacheIdentifier) -> bool {
        (**self).has(identifier)
    }
}

// ---------------------------------------------------------------------------
// FileCacheStore
// ---------------------------------------------------------------------------

/// One file per entry under a cache directory.
///
/// Entries are stored as `<dir>/<identifier>.<file_extension>`. When a
/// prelude is configured it is written as the first line of every entry
/// (so the file is loadable source) and stripped again by `get`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileCacheStore {
    dir: PathBuf,
    file_extension: String,
    prelude: String,
}

impl FileCacheStore {
    /// Create a store rooted at `dir` writing `.php` files with a `<?php` prelude.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_extension: "php".to_owned(),
            prelude: "<?php".to_owned(),
        }
    }

    /// Use a different entry file extension (empty for none).
    #[must_use]
    pub fn with_file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = ext.into();
        self
    }

    /// Use a different prelude line (empty for none).
    #[must_use]
    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = prelude.into();
        self
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `identifier`.
    #[must_use]
    pub fn entry_path(&self, identifier: &CacheIdentifier) -> PathBuf {
        let mut path = self.dir.join(identifier.as_str());
        if !self.file_extension.is_empty() {
            path.set_extension(&self.file_extension);
        }
        path
    }

    /// Take the exclusive rebuild lock, blocking until it is free.
    ///
    /// Concurrent rebuilds writing the same identifiers are serialized by
    /// holding this guard for the whole rebuild.
    ///
    /// # Errors
    /// Returns [`CacheError::Lock`] if the lock file cannot be created or locked.
    pub fn lock(&self) -> Result<RebuildLock, CacheError> {
        let path = self.dir.join(LOCK_FILE);
        let lock_err = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(lock_err)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;
        fs4::fs_std::FileExt::lock_exclusive(&file).map_err(lock_err)?;
        tracing::debug!(path = %path.display(), "rebuild lock acquired");
        Ok(RebuildLock { _file: file, path })
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn set(&self, identifier: &CacheIdentifier, text: &str) -> Result<(), CacheError> {
        let path = self.entry_path(identifier);
        let contents = if self.prelude.is_empty() {
            text.to_owned()
        } else {
            format!("{}\n{text}", self.prelude)
        };
        self.write_atomic(&path, &contents)
            .map_err(|source| CacheError::Write {
                identifier: identifier.to_string(),
                source,
            })
    }

    fn get(&self, identifier: &CacheIdentifier) -> Result<String, CacheError> {
        let path = self.entry_path(identifier);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::NotFound {
                    identifier: identifier.to_string(),
                });
            }
            Err(source) => {
                return Err(CacheError::Read {
                    identifier: identifier.to_string(),
                    source,
                });
            }
        };
        if self.prelude.is_empty() {
            return Ok(contents);
        }
        let head = format!("{}\n", self.prelude);
        Ok(contents
            .strip_prefix(head.as_str())
            .map_or_else(|| contents.clone(), str::to_owned))
    }

    fn has(&self, identifier: &CacheIdentifier) -> bool {
        self.entry_path(identifier).is_file()
    }
}

/// Guard for the exclusive rebuild lock; released on drop.
#[derive(Debug)]
pub struct RebuildLock {
    _file: File,
    path: PathBuf,
}

impl RebuildLock {
    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// MemoryCacheStore
// ---------------------------------------------------------------------------

/// In-memory store; can be told to reject writes for chosen identifiers.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<BTreeMap<CacheIdentifier, String>>,
    rejected: Mutex<BTreeSet<CacheIdentifier>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `set` for `identifier` fail with [`CacheError::Rejected`].
    pub fn reject_writes_for(&self, identifier: CacheIdentifier) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier);
    }

    /// A copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<CacheIdentifier, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn set(&self, identifier: &CacheIdentifier, text: &str) -> Result<(), CacheError> {
        let rejected = self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identifier);
        if rejected {
            return Err(CacheError::Rejected {
                identifier: identifier.to_string(),
                message: "write refused".to_owned(),
            });
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.clone(), text.to_owned());
        Ok(())
    }

    fn get(&self, identifier: &CacheIdentifier) -> Result<String, CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identifier)
            .cloned()
            .ok_or_else(|| CacheError::NotFound {
                identifier: identifier.to_string(),
            })
    }
}
