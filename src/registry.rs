//! Override registry and provider resolution.
//!
//! The [`Registry`] says, per class key, which providers contribute override
//! fragments and in which order. Order is a contract: it decides both the
//! body concatenation order and the constructor-merge order. The registry is
//! an explicit value handed to the composer, never ambient global state.
//!
//! A [`ProviderResolver`] turns `(provider, class key)` into a source path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::{ClassKey, ProviderId};

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The ordered list of override providers for one class key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    class_key: ClassKey,
    providers: Vec<ProviderId>,
}

impl RegistryEntry {
    /// Create an entry; `providers` keeps its order.
    #[must_use]
    pub const fn new(class_key: ClassKey, providers: Vec<ProviderId>) -> Self {
        Self {
            class_key,
            providers,
        }
    }

    /// The class key being extended.
    #[must_use]
    pub const fn class_key(&self) -> &ClassKey {
        &self.class_key
    }

    /// Override providers in merge order.
    #[must_use]
    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }
}

/// Every class key registered for composition, in rebuild order, plus the
/// provider that owns the base units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    base_provider: ProviderId,
    entries: Vec<RegistryEntry>,
}

/// A class key could not be registered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The key is already registered.
    #[error("class key `{0}` is registered more than once")]
    Duplicate(ClassKey),

    /// A different key already flattens to the same cache identifier.
    #[error("class keys `{existing}` and `{key}` map to the same cache entry")]
    Collision {
        /// The key registered first.
        existing: ClassKey,
        /// The key being registered.
        key: ClassKey,
    },
}

impl Registry {
    /// Create an empty registry whose base units come from `base_provider`.
    #[must_use]
    pub const fn new(base_provider: ProviderId) -> Self {
        Self {
            base_provider,
            entries: Vec::new(),
        }
    }

    /// Append an entry; rebuilds visit entries in insertion order.
    ///
    /// Keys are compared by their flattened form as well, since that is what
    /// names their cache entry.
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if the key is already registered
    /// and [`RegistryError::Collision`] if another key flattens to the same
    /// form.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let flat = entry.class_key().flattened();
        if let Some(existing) = self
            .entries
            .iter()
            .map(RegistryEntry::class_key)
            .find(|k| k.flattened() == flat)
        {
            return Err(if existing == entry.class_key() {
                RegistryError::Duplicate(entry.class_key)
            } else {
                RegistryError::Collision {
                    existing: existing.clone(),
                    key: entry.class_key,
                }
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    ///
    /// # Errors
    /// See [`Registry::register`].
    pub fn with(
        mut self,
        class_key: ClassKey,
        providers: Vec<ProviderId>,
    ) -> Result<Self, RegistryError> {
        self.register(RegistryEntry::new(class_key, providers))?;
        Ok(self)
    }

    /// The provider owning the base units.
    #[must_use]
    pub const fn base_provider(&self) -> &ProviderId {
        &self.base_provider
    }

    /// Entries in rebuild order.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Look up the entry for a class key.
    #[must_use]
    pub fn get(&self, class_key: &ClassKey) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.class_key() == class_key)
    }

    /// Number of registered class keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no class key is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ProviderResolver
// ---------------------------------------------------------------------------

/// Resolves a provider's source file for a class key.
///
/// Returning `None` means "not present"; the composer also treats a returned
/// path that is not a regular file as not present.
pub trait ProviderResolver {
    /// Location of `provider`'s unit for `class_key`, if it has one.
    fn resolve(&self, provider: &ProviderId, class_key: &ClassKey) -> Option<PathBuf>;
}

impl<F> ProviderResolver for F
where
    F: Fn(&ProviderId, &ClassKey) -> Option<PathBuf>,
{
    fn resolve(&self, provider: &ProviderId, class_key: &ClassKey) -> Option<PathBuf> {
        self(provider, class_key)
    }
}

/// Resolves `<provider root>/<source dir>/<class key>.<extension>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryResolver {
    roots: BTreeMap<ProviderId, PathBuf>,
    source_dir: PathBuf,
    extension: String,
}

impl DirectoryResolver {
    /// Create a resolver with no provider roots.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            roots: BTreeMap::new(),
            source_dir: source_dir.into(),
            extension: extension.into(),
        }
    }

    /// Register (or replace) the root directory of a provider.
    #[must_use]
    pub fn with_root(mut self, provider: ProviderId, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(provider, root.into());
        self
    }

    /// The root directory of a provider, if known.
    #[must_use]
    pub fn root(&self, provider: &ProviderId) -> Option<&Path> {
        self.roots.get(provider).map(PathBuf::as_path)
    }
}

impl ProviderResolver for DirectoryResolver {
    fn resolve(&self, provider: &ProviderId, class_key: &ClassKey) -> Option<PathBuf> {
        let mut path = self.roots.get(provider)?.join(&self.source_dir);
        for segment in class_key.segments() {
            path.push(segment);
        }
        if !self.extension.is_empty() {
            path.set_extension(&self.extension);
        }
        Some(path)
    }
}
