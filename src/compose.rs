//! Rebuild engine: turn registered class keys into merged units.
//!
//! For each registry entry the composer reads the base unit, then every
//! override that exists, in registry order. Their bodies are concatenated,
//! their constructor bodies are collected into a single synthesized
//! constructor, and the class is closed. The result goes into the cache
//! under a deterministic identifier.
//!
//! ```text
//!   Idle -> ProcessingBase -> ProcessingOverride(0..n) -> Finalizing -> Done
//!                     \______________ no overrides ______________/
//! ```
//!
//! A key with no existing override passes straight from the last processing
//! state to `Done`; nothing is written for it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::cache::{CacheIdentifier, CacheStore};
use crate::error::ComposeError;
use crate::extract::{Fragment, extract};
use crate::model::{ClassKey, CompilationUnit, Dialect, ProviderId, UnitRole};
use crate::parser::locate_lines;
use crate::registry::{ProviderResolver, Registry, RegistryEntry};
use crate::report::{KeyOutcome, RebuildReport};

/// Identifier prefix used when none is configured.
pub const DEFAULT_IDENTIFIER_PREFIX: &str = "tx_news_";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Knobs that shape the merged text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposeSettings {
    /// Stripped from override paths in provenance blocks.
    pub root: PathBuf,
    /// Prepended to the lowercased class key to form cache identifiers.
    pub identifier_prefix: String,
    /// Host language surface details.
    pub dialect: Dialect,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            identifier_prefix: DEFAULT_IDENTIFIER_PREFIX.to_owned(),
            dialect: Dialect::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Constructor accumulation
// ---------------------------------------------------------------------------

/// Constructor body lines gathered across one key's units.
///
/// Scoped to a single class key; a fresh accumulator is used for every key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstructorAccumulator {
    lines: Vec<String>,
}

impl ConstructorAccumulator {
    /// Append one unit's constructor lines after everything seen so far.
    pub fn absorb(&mut self, lines: impl IntoIterator<Item = String>) {
        self.lines.extend(lines);
    }

    /// Collected lines in merge order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns `true` if no unit contributed constructor lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The synthesized constructor, or an empty string when nothing was
    /// collected.
    #[must_use]
    pub fn render(&self, dialect: &Dialect) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let indent = &dialect.indent;
        format!(
            "\n{indent}{}\n{indent}{{\n{}\n{indent}}}\n",
            dialect.constructor_signature(),
            self.lines.join("\n")
        )
    }
}

// ---------------------------------------------------------------------------
// Merged unit
// ---------------------------------------------------------------------------

/// A composed class ready for the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedUnit {
    /// The class key this unit replaces.
    pub class_key: ClassKey,
    /// Cache entry it is stored under.
    pub identifier: CacheIdentifier,
    /// Full merged source text (without the cache prelude).
    pub text: String,
    /// Override sources that contributed, in merge order.
    pub overrides: Vec<PathBuf>,
}

impl MergedUnit {
    /// Join rendered fragments, the synthesized constructor and the class
    /// closing brace into merged source text.
    #[must_use]
    pub fn assemble(
        base: &Fragment,
        overrides: &[Fragment],
        constructor: &ConstructorAccumulator,
        settings: &ComposeSettings,
    ) -> String {
        let mut text = base.render(&settings.root);
        for fragment in overrides {
            text.push_str(&fragment.render(&settings.root));
        }
        text.push_str(&constructor.render(&settings.dialect));
        text.push_str("\n}");
        text
    }

    /// Lowercase hex SHA-256 of [`MergedUnit::text`].
    #[must_use]
    pub fn sha256(&self) -> String {
        let digest = Sha256::digest(self.text.as_bytes());
        let mut hex = String::with_capacity(64);
        for b in &digest {
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}

// ---------------------------------------------------------------------------
// Per-key pass
// ---------------------------------------------------------------------------

/// Where a key's pass currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    /// Nothing read yet.
    Idle,
    /// Extracting the base unit.
    ProcessingBase,
    /// Extracting the override at this index of the provider list.
    ProcessingOverride(usize),
    /// Assembling the merged unit.
    Finalizing,
    /// Finished; the pass produced its result.
    Done,
}

/// One class key's trip through the state machine.
struct KeyPass<'a> {
    class_key: &'a ClassKey,
    settings: &'a ComposeSettings,
    state: PassState,
    base: Option<Fragment>,
    overrides: Vec<Fragment>,
    constructor: ConstructorAccumulator,
}

impl<'a> KeyPass<'a> {
    const fn new(class_key: &'a ClassKey, settings: &'a ComposeSettings) -> Self {
        Self {
            class_key,
            settings,
            state: PassState::Idle,
            base: None,
            overrides: Vec::new(),
            constructor: ConstructorAccumulator { lines: Vec::new() },
        }
    }

    fn absorb(&mut self, unit: &CompilationUnit, role: UnitRole) -> Result<(), ComposeError> {
        let boundary =
            locate_lines(unit.lines()).map_err(|e| ComposeError::from_parse(unit.path(), e))?;
        let extraction = extract(unit, &boundary, role, &self.settings.dialect);
        tracing::debug!(
            class_key = %self.class_key,
            path = %unit.path().display(),
            state = ?self.state,
            constructor_lines = extraction.constructor.len(),
            "unit extracted"
        );
        self.constructor.absorb(extraction.constructor);
        if role.is_base() {
            self.base = Some(extraction.fragment);
        } else {
            self.overrides.push(extraction.fragment);
        }
        Ok(())
    }

    fn base(&mut self, unit: &CompilationUnit) -> Result<(), ComposeError> {
        debug_assert_eq!(self.state, PassState::Idle);
        self.state = PassState::ProcessingBase;
        self.absorb(unit, UnitRole::Base)
    }

    fn enter_override(&mut self, index: usize) {
        self.state = PassState::ProcessingOverride(index);
    }

    fn finish(mut self, identifier: CacheIdentifier) -> Option<MergedUnit> {
        let Some(base) = self.base.take() else {
            self.state = PassState::Done;
            return None;
        };
        if self.overrides.is_empty() {
            self.state = PassState::Done;
            return None;
        }
        self.state = PassState::Finalizing;
        let text =
            MergedUnit::assemble(&base, &self.overrides, &self.constructor, self.settings);
        let overrides = self
            .overrides
            .iter()
            .filter_map(|f| f.provenance.clone())
            .collect();
        self.state = PassState::Done;
        Some(MergedUnit {
            class_key: self.class_key.clone(),
            identifier,
            text,
            overrides,
        })
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Rebuilds merged units for every registered class key.
///
/// Generic over how provider paths are found and where results are stored,
/// so tests can run entirely in memory.
pub struct Composer<R, C> {
    registry: Registry,
    resolver: R,
    cache: C,
    settings: ComposeSettings,
    rebuilding: Mutex<()>,
}

impl<R: ProviderResolver, C: CacheStore> Composer<R, C> {
    /// Create a composer.
    #[must_use]
    pub const fn new(registry: Registry, resolver: R, cache: C, settings: ComposeSettings) -> Self {
        Self {
            registry,
            resolver,
            cache,
            settings,
            rebuilding: Mutex::new(()),
        }
    }

    /// The registry being rebuilt.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The cache merged units are written to.
    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// The composition settings.
    #[must_use]
    pub const fn settings(&self) -> &ComposeSettings {
        &self.settings
    }

    /// Cache identifier for a class key under the configured prefix.
    #[must_use]
    pub fn identifier(&self, class_key: &ClassKey) -> CacheIdentifier {
        CacheIdentifier::for_class(&self.settings.identifier_prefix, class_key)
    }

    /// Rebuild every registered class key, in registry order.
    ///
    /// Concurrent calls on the same composer run one after the other.
    ///
    /// # Errors
    /// Returns the first batch-fatal [`ComposeError`]; keys after it are not
    /// processed, keys before it keep their freshly written entries. Cache
    /// write failures do not stop the batch; they are recorded in the report
    /// (see [`RebuildReport::first_failure`]).
    #[instrument(skip(self), fields(keys = self.registry.len()))]
    pub fn rebuild(&self) -> Result<RebuildReport, ComposeError> {
        let _serialized = self
            .rebuilding
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut report = RebuildReport::default();
        for entry in self.registry.entries() {
            let outcome = match self.compose_key(entry)? {
                None => KeyOutcome::Passthrough,
                Some(unit) => match self.store(&unit) {
                    Ok(()) => KeyOutcome::Written {
                        sha256: unit.sha256(),
                        overrides: unit.overrides.len(),
                        identifier: unit.identifier,
                    },
                    Err(ComposeError::CacheWriteFailed {
                        identifier,
                        message,
                    }) => {
                        tracing::warn!(
                            class_key = %entry.class_key(),
                            identifier = %identifier,
                            error = %message,
                            "cache write failed; continuing"
                        );
                        KeyOutcome::WriteFailed {
                            identifier,
                            message,
                        }
                    }
                    Err(other) => return Err(other),
                },
            };
            report.push(entry.class_key().clone(), outcome);
        }
        tracing::info!(
            written = report.written(),
            passthrough = report.passthrough(),
            clean = report.is_clean(),
            "rebuild finished"
        );
        Ok(report)
    }

    /// Compose one registry entry without writing it.
    ///
    /// Returns `Ok(None)` when no override source exists for the key.
    ///
    /// # Errors
    /// - [`ComposeError::MissingSource`] if the base unit does not exist.
    /// - [`ComposeError::Read`] if an existing source cannot be read.
    /// - [`ComposeError::NoClassFound`] / [`ComposeError::UnsupportedShape`]
    ///   if a unit cannot be bounded.
    #[instrument(skip(self, entry), fields(class_key = %entry.class_key()))]
    pub fn compose_key(&self, entry: &RegistryEntry) -> Result<Option<MergedUnit>, ComposeError> {
        let class_key = entry.class_key();
        let base_provider = self.registry.base_provider();
        let base_path = match self.resolver.resolve(base_provider, class_key) {
            Some(path) if path.is_file() => path,
            other => {
                return Err(ComposeError::MissingSource {
                    class_key: class_key.clone(),
                    provider: base_provider.clone(),
                    path: other,
                });
            }
        };

        let mut pass = KeyPass::new(class_key, &self.settings);
        pass.base(&read_unit(class_key, &base_path)?)?;

        for (index, provider) in entry.providers().iter().enumerate() {
            let Some(path) = self.override_path(provider, class_key) else {
                continue;
            };
            pass.enter_override(index);
            pass.absorb(&read_unit(class_key, &path)?, UnitRole::Override)?;
        }

        let merged = pass.finish(self.identifier(class_key));
        if merged.is_none() {
            tracing::debug!("no override sources; leaving original in place");
        }
        Ok(merged)
    }

    /// Write a merged unit to the cache.
    ///
    /// # Errors
    /// Returns [`ComposeError::CacheWriteFailed`] carrying the backend message.
    pub fn store(&self, unit: &MergedUnit) -> Result<(), ComposeError> {
        self.cache
            .set(&unit.identifier, &unit.text)
            .map_err(|e| ComposeError::CacheWriteFailed {
                identifier: unit.identifier.clone(),
                message: e.to_string(),
            })?;
        tracing::info!(
            identifier = %unit.identifier,
            bytes = unit.text.len(),
            "merged unit stored"
        );
        Ok(())
    }

    fn override_path(&self, provider: &ProviderId, class_key: &ClassKey) -> Option<PathBuf> {
        match self.resolver.resolve(provider, class_key) {
            Some(path) if path.is_file() => Some(path),
            Some(path) => {
                tracing::debug!(
                    provider = %provider,
                    path = %path.display(),
                    "override source not present; skipping provider"
                );
                None
            }
            None => {
                tracing::debug!(provider = %provider, "provider has no location; skipping");
                None
            }
        }
    }
}

fn read_unit(class_key: &ClassKey, path: &Path) -> Result<CompilationUnit, ComposeError> {
    CompilationUnit::read(class_key.clone(), path).map_err(|source| ComposeError::Read {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use std::fs;

    const BASE: &str = "<?php
namespace Vendor\\News\\Domain\\Model;

class News
{
    protected $title;

    public function __construct()
    {
        $this->title = 'base';
    }

    public function getTitle()
    {
        return $this->title;
    }
}
";

    fn override_src(property: &str, ctor: Option<&str>) -> String {
        let mut src = format!("<?php\nclass News\n{{\n    protected ${property};\n");
        if let Some(stmt) = ctor {
            src.push_str(&format!(
                "\n    public function __construct()\n    {{\n        {stmt}\n    }}\n"
            ));
        }
        src.push_str("}\n");
        src
    }

    fn key(s: &str) -> ClassKey {
        ClassKey::new(s).unwrap()
    }

    fn provider(s: &str) -> ProviderId {
        ProviderId::new(s).unwrap()
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn write(&self, provider: &str, key: &str, text: &str) -> PathBuf {
            let path = self.dir.path().join(provider).join(format!("{key}.php"));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, text).unwrap();
            path
        }

        fn resolver(&self) -> impl Fn(&ProviderId, &ClassKey) -> Option<PathBuf> + '_ {
            move |p: &ProviderId, k: &ClassKey| {
                Some(self.dir.path().join(p.as_str()).join(format!("{k}.php")))
            }
        }

        fn settings(&self) -> ComposeSettings {
            ComposeSettings {
                root: self.dir.path().to_path_buf(),
                ..ComposeSettings::default()
            }
        }
    }

    #[test]
    fn accumulator_renders_constructor() {
        let mut acc = ConstructorAccumulator::default();
        assert_eq!(acc.render(&Dialect::default()), "");
        acc.absorb(vec!["        $a = 1;".to_owned()]);
        acc.absorb(vec!["        $b = 2;".to_owned()]);
        assert_eq!(
            acc.render(&Dialect::default()),
            "\n    public function __construct()\n    {\n        $a = 1;\n        $b = 2;\n    }\n"
        );
    }

    #[test]
    fn merges_base_and_overrides_in_order() {
        let fx = Fixture::new();
        fx.write("news", "News", BASE);
        fx.write("b", "News", &override_src("b", Some("$this->b = 'b';")));
        fx.write("a", "News", &override_src("a", Some("$this->a = 'a';")));
        let registry = Registry::new(provider("news"))
            .with(key("News"), vec![provider("b"), provider("a")])
            .unwrap();
        let composer = Composer::new(
            registry,
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );

        let report = composer.rebuild().unwrap();
        assert_eq!(report.written(), 1);

        let text = composer.cache().get(&composer.identifier(&key("News"))).unwrap();
        let ctor_base = text.find("$this->title = 'base';").unwrap();
        let ctor_b = text.find("$this->b = 'b';").unwrap();
        let ctor_a = text.find("$this->a = 'a';").unwrap();
        assert!(ctor_base < ctor_b && ctor_b < ctor_a);
        assert_eq!(text.matches("function __construct").count(), 1);
        assert!(text.find("protected $b;").unwrap() < text.find("protected $a;").unwrap());
        assert!(text.contains("this is partial from: \n\tb/News.php"));
        assert!(text.ends_with("    }\n\n}"));
        assert_eq!(text.matches('{').count(), text.matches('}').count());
    }

    #[test]
    fn identifier_is_prefixed_and_lowercased() {
        let fx = Fixture::new();
        let composer = Composer::new(
            Registry::new(provider("news")),
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );
        assert_eq!(
            composer.identifier(&key("Domain/Model/News")).as_str(),
            "tx_news_domain_model_news"
        );
    }

    #[test]
    fn no_overrides_is_passthrough() {
        let fx = Fixture::new();
        fx.write("news", "News", BASE);
        let registry = Registry::new(provider("news"))
            .with(key("News"), vec![provider("ghost")])
            .unwrap();
        let composer = Composer::new(
            registry,
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );
        let report = composer.rebuild().unwrap();
        assert_eq!(report.keys[0].outcome, KeyOutcome::Passthrough);
        assert!(composer.cache().is_empty());
    }

    #[test]
    fn missing_base_fails_fast() {
        let fx = Fixture::new();
        fx.write("news", "Second", BASE);
        fx.write("x", "Second", &override_src("x", None));
        fx.write("x", "First", &override_src("x", None));
        let registry = Registry::new(provider("news"))
            .with(key("First"), vec![provider("x")])
            .unwrap()
            .with(key("Second"), vec![provider("x")])
            .unwrap();
        let composer = Composer::new(
            registry,
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );
        let err = composer.rebuild().unwrap_err();
        assert!(matches!(err, ComposeError::MissingSource { .. }), "{err}");
        assert!(composer.cache().is_empty());
    }

    #[test]
    fn override_without_class_is_rejected() {
        let fx = Fixture::new();
        fx.write("news", "News", BASE);
        let bad = fx.write("x", "News", "<?php\n$a = 1;\n");
        let registry = Registry::new(provider("news"))
            .with(key("News"), vec![provider("x")])
            .unwrap();
        let composer = Composer::new(
            registry,
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );
        match composer.rebuild().unwrap_err() {
            ComposeError::NoClassFound { path } => assert_eq!(path, bad),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn write_failure_is_recorded_and_batch_continues() {
        let fx = Fixture::new();
        for k in ["A", "B"] {
            fx.write("news", k, BASE);
            fx.write("x", k, &override_src("x", None));
        }
        let registry = Registry::new(provider("news"))
            .with(key("A"), vec![provider("x")])
            .unwrap()
            .with(key("B"), vec![provider("x")])
            .unwrap();
        let cache = MemoryCacheStore::new();
        cache.reject_writes_for(CacheIdentifier::new("tx_news_a").unwrap());
        let composer = Composer::new(registry, fx.resolver(), cache, fx.settings());

        let report = composer.rebuild().unwrap();
        assert!(matches!(
            report.keys[0].outcome,
            KeyOutcome::WriteFailed { .. }
        ));
        assert!(matches!(report.keys[1].outcome, KeyOutcome::Written { .. }));
        assert!(matches!(
            report.first_failure(),
            Some(ComposeError::CacheWriteFailed { .. })
        ));
        assert!(composer.cache().has(&CacheIdentifier::new("tx_news_b").unwrap()));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let fx = Fixture::new();
        fx.write("news", "News", BASE);
        fx.write("x", "News", &override_src("x", Some("$this->x = 1;")));
        let registry = Registry::new(provider("news"))
            .with(key("News"), vec![provider("x")])
            .unwrap();
        let composer = Composer::new(
            registry,
            fx.resolver(),
            MemoryCacheStore::new(),
            fx.settings(),
        );
        let first = composer.rebuild().unwrap();
        let snapshot = composer.cache().snapshot();
        let second = composer.rebuild().unwrap();
        assert_eq!(first, second);
        assert_eq!(snapshot, composer.cache().snapshot());
    }
}
