//! Project configuration (`classmerge.toml`).
//!
//! Describes where providers live, which class keys are extended by which
//! providers (in merge order), where merged units are cached, and the host
//! language details composition depends on. Relative paths are resolved
//! against the directory holding the config file.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::{CacheIdentifier, FileCacheStore};
use crate::compose::{ComposeSettings, DEFAULT_IDENTIFIER_PREFIX};
use crate::model::{ClassKey, Dialect, ProviderId};
use crate::registry::{DirectoryResolver, Registry, RegistryEntry};

/// File name looked up when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "classmerge.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassmergeConfig {
    /// Project layout.
    pub project: ProjectConfig,

    /// Provider id to provider root directory.
    #[serde(default)]
    pub providers: BTreeMap<ProviderId, PathBuf>,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Host language details.
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Registered class keys, in rebuild order.
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassConfig>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// Project layout.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Provenance paths are shown relative to this directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Provider-relative directory holding class files (default: `"Classes"`).
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Source file extension (default: `"php"`).
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Provider owning the base units.
    pub base_provider: ProviderId,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("Classes")
}

fn default_extension() -> String {
    "php".to_owned()
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Where and how merged units are stored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache directory (default: `"var/cache/classmerge"`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Prefix of every cache identifier.
    #[serde(default = "default_identifier_prefix")]
    pub identifier_prefix: String,

    /// Extension of cache entry files.
    #[serde(default = "default_extension")]
    pub file_extension: String,

    /// First line of every cache entry; empty for none.
    #[serde(default = "default_prelude")]
    pub prelude: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            identifier_prefix: default_identifier_prefix(),
            file_extension: default_extension(),
            prelude: default_prelude(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("var/cache/classmerge")
}

fn default_identifier_prefix() -> String {
    DEFAULT_IDENTIFIER_PREFIX.to_owned()
}

fn default_prelude() -> String {
    "<?php".to_owned()
}

// ---------------------------------------------------------------------------
// DialectConfig
// ---------------------------------------------------------------------------

/// Host language surface details; defaults describe PHP.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DialectConfig {
    /// Marker opening each source file.
    pub prelude: String,
    /// Constructor method name.
    pub constructor: String,
    /// Member indentation used by the synthesized constructor.
    pub indent: String,
}

impl Default for DialectConfig {
    fn default() -> Self {
        let d = Dialect::default();
        Self {
            prelude: d.prelude,
            constructor: d.constructor,
            indent: d.indent,
        }
    }
}

impl From<DialectConfig> for Dialect {
    fn from(c: DialectConfig) -> Self {
        Self {
            prelude: c.prelude,
            constructor: c.constructor,
            indent: c.indent,
        }
    }
}

// ---------------------------------------------------------------------------
// ClassConfig
// ---------------------------------------------------------------------------

/// One registered class key.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassConfig {
    /// The class key.
    pub key: ClassKey,
    /// Override providers in merge order.
    #[serde(default)]
    pub providers: Vec<ProviderId>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

impl ClassmergeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Unlike most settings files a missing config is an error: without it
    /// there are no class keys to rebuild.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O, parse or validation errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_owned()),
            message: format!("could not read file: {e}"),
        })?;
        let mut config = Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse configuration from a TOML string. Relative paths resolve
    /// against the current directory.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, invalid ids,
    /// duplicate or colliding class keys or an invalid identifier prefix.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError::invalid(message)
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        CacheIdentifier::validate_prefix(&self.cache.identifier_prefix)
            .map_err(|e| ConfigError::invalid(format!("[cache] identifier_prefix: {e}")))?;
        if self.dialect.constructor.trim().is_empty() {
            return Err(ConfigError::invalid(
                "[dialect] constructor must not be empty",
            ));
        }
        self.registry().map(|_| ())
    }

    /// Resolve `path` against the config file's directory.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Build the override registry.
    ///
    /// # Errors
    /// Returns `ConfigError` if a class key is listed more than once or two
    /// keys would share a cache entry.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        let mut registry = Registry::new(self.project.base_provider.clone());
        for class in &self.classes {
            registry
                .register(RegistryEntry::new(
                    class.key.clone(),
                    class.providers.clone(),
                ))
                .map_err(|e| ConfigError::invalid(e.to_string()))?;
        }
        Ok(registry)
    }

    /// Build a resolver over the configured provider roots.
    ///
    /// Providers referenced without a `[providers]` entry resolve to "not
    /// present"; each is logged once.
    #[must_use]
    pub fn resolver(&self) -> DirectoryResolver {
        for provider in self.unrooted_providers() {
            tracing::warn!(provider = %provider, "provider has no [providers] entry; it will be skipped");
        }
        self.providers.iter().fold(
            DirectoryResolver::new(&self.project.source_dir, &self.project.extension),
            |resolver, (id, root)| resolver.with_root(id.clone(), self.resolve_path(root)),
        )
    }

    /// Providers named by the project or a class entry that have no root.
    #[must_use]
    pub fn unrooted_providers(&self) -> BTreeSet<&ProviderId> {
        std::iter::once(&self.project.base_provider)
            .chain(self.classes.iter().flat_map(|c| c.providers.iter()))
            .filter(|p| !self.providers.contains_key(*p))
            .collect()
    }

    /// Build the file cache.
    #[must_use]
    pub fn cache_store(&self) -> FileCacheStore {
        FileCacheStore::new(self.resolve_path(&self.cache.dir))
            .with_file_extension(self.cache.file_extension.clone())
            .with_prelude(self.cache.prelude.clone())
    }

    /// Build composition settings.
    #[must_use]
    pub fn settings(&self) -> ComposeSettings {
        ComposeSettings {
            root: self.resolve_path(&self.project.root),
            identifier_prefix: self.cache.identifier_prefix.clone(),
            dialect: self.dialect.clone().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "[project]\nbase_provider = \"news\"\n";

    const FULL: &str = r#"
[project]
root = "/site"
source_dir = "Classes"
extension = "php"
base_provider = "news"

[providers]
news = "ext/news"
news_extra = "/abs/news_extra"

[cache]
dir = "var/cache"
identifier_prefix = "tx_news_"
file_extension = "php"
prelude = "<?php"

[dialect]
constructor = "__construct"
indent = "\t"

[[class]]
key = "Domain/Model/News"
providers = ["news_extra", "news_more"]

[[class]]
key = "Controller/NewsController"
"#;

    fn provider(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    #[test]
    fn parse_minimal_uses_defaults() {
        let cfg = ClassmergeConfig::parse(MINIMAL).unwrap();
        assert_eq!(cfg.project.root, PathBuf::from("."));
        assert_eq!(cfg.project.source_dir, PathBuf::from("Classes"));
        assert_eq!(cfg.project.extension, "php");
        assert_eq!(cfg.cache, CacheConfig::default());
        assert_eq!(Dialect::from(cfg.dialect.clone()), Dialect::default());
        assert!(cfg.classes.is_empty());
        assert!(cfg.registry().unwrap().is_empty());
    }

    #[test]
    fn parse_full_config() {
        let cfg = ClassmergeConfig::parse(FULL).unwrap();
        let registry = cfg.registry().unwrap();
        assert_eq!(registry.base_provider(), &provider("news"));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.entries()[0].providers(),
            &[provider("news_extra"), provider("news_more")]
        );
        assert!(registry.entries()[1].providers().is_empty());
        assert_eq!(cfg.settings().dialect.indent, "\t");
        assert_eq!(cfg.settings().dialect.prelude, "<?php");
        assert_eq!(cfg.settings().root, PathBuf::from("/site"));
    }

    #[test]
    fn parse_requires_project() {
        let err = ClassmergeConfig::parse("").unwrap_err();
        assert!(err.message.contains("project"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let toml = format!("{MINIMAL}[cache]\nttl = 3\n");
        let err = ClassmergeConfig::parse(&toml).unwrap_err();
        assert!(err.message.contains("ttl"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_invalid_class_key() {
        let toml = format!("{MINIMAL}[[class]]\nkey = \"../etc/passwd\"\n");
        let err = ClassmergeConfig::parse(&toml).unwrap_err();
        assert!(err.message.contains("invalid class key"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_duplicate_class_keys() {
        let toml = format!("{MINIMAL}[[class]]\nkey = \"A\"\n[[class]]\nkey = \"A\"\n");
        let err = ClassmergeConfig::parse(&toml).unwrap_err();
        assert!(err.message.contains("more than once"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_keys_sharing_a_cache_entry() {
        let toml = format!(
            "{MINIMAL}[[class]]\nkey = \"Domain/Model/News\"\n[[class]]\nkey = \"Domain/Model_News\"\n"
        );
        let err = ClassmergeConfig::parse(&toml).unwrap_err();
        assert!(err.message.contains("same cache entry"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_bad_identifier_prefix() {
        let toml = format!("{MINIMAL}[cache]\nidentifier_prefix = \"a.b\"\n");
        let err = ClassmergeConfig::parse(&toml).unwrap_err();
        assert!(err.message.contains("identifier_prefix"), "{}", err.message);
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let toml = "[project]\nbase_provider = \"news\"\nextension = 42\n";
        let err = ClassmergeConfig::parse(toml).unwrap_err();
        assert!(err.message.contains("line"), "{}", err.message);
    }

    #[test]
    fn unrooted_providers_are_reported() {
        let cfg = ClassmergeConfig::parse(FULL).unwrap();
        let unrooted: Vec<&str> = cfg.unrooted_providers().into_iter().map(ProviderId::as_str).collect();
        assert_eq!(unrooted, vec!["news_more"]);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = ClassmergeConfig::load(Path::new("/nonexistent/classmerge.toml")).unwrap_err();
        assert!(err.message.contains("could not read file"));
        assert!(err.to_string().starts_with("/nonexistent/classmerge.toml: "));
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, FULL).unwrap();
        let cfg = ClassmergeConfig::load(&path).unwrap();

        let store = cfg.cache_store();
        assert_eq!(store.dir(), dir.path().join("var/cache"));

        let resolver = cfg.resolver();
        assert_eq!(resolver.root(&provider("news")), Some(dir.path().join("ext/news").as_path()));
        assert_eq!(
            resolver.root(&provider("news_extra")),
            Some(Path::new("/abs/news_extra"))
        );
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = ClassmergeConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(!err.message.is_empty());
    }
}
