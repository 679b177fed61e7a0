//! Compilation units and the source dialect they are written in.

use std::io;
use std::path::{Path, PathBuf};

use super::types::ClassKey;

// ---------------------------------------------------------------------------
// UnitRole
// ---------------------------------------------------------------------------

/// Whether a unit is the base class or an override contributed by a provider.
///
/// The role decides how much of the unit survives extraction: a base keeps
/// its whole text (minus the prelude), an override keeps only its class body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitRole {
    /// The original class definition; the spine of the merged unit.
    Base,
    /// A provider's fragment merged into the base.
    Override,
}

impl UnitRole {
    /// Returns `true` for [`UnitRole::Base`].
    #[must_use]
    pub const fn is_base(self) -> bool {
        matches!(self, Self::Base)
    }
}

// ---------------------------------------------------------------------------
// CompilationUnit
// ---------------------------------------------------------------------------

/// One source file holding a class definition, read fresh for every rebuild.
///
/// Lines are newline-normalized: every `\r` is removed and the text is split
/// on `\n`, so a trailing newline yields a final empty line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationUnit {
    class_key: ClassKey,
    path: PathBuf,
    lines: Vec<String>,
}

impl CompilationUnit {
    /// Build a unit from in-memory text.
    #[must_use]
    pub fn from_text(class_key: ClassKey, path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            class_key,
            path: path.into(),
            lines: split_lines(text),
        }
    }

    /// Read a unit from disk.
    ///
    /// Files that are not valid UTF-8 are decoded as Latin-1, which maps each
    /// byte to one character and never fails.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be read.
    pub fn read(class_key: ClassKey, path: &Path) -> io::Result<Self> {
        let text = match String::from_utf8(std::fs::read(path)?) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), "source is not valid UTF-8; reading it as Latin-1");
                e.as_bytes().iter().map(|&b| char::from(b)).collect()
            }
        };
        Ok(Self::from_text(class_key, path, &text))
    }

    /// The class key this unit was loaded for.
    #[must_use]
    pub const fn class_key(&self) -> &ClassKey {
        &self.class_key
    }

    /// Where the unit was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The normalized lines of the unit.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Split text into lines after dropping every carriage return.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.replace('\r', "").split('\n').map(str::to_owned).collect()
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// Surface details of the host language that composition depends on.
///
/// Defaults describe PHP: a `<?php` prelude and a `__construct` constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialect {
    /// Marker opening every source file; stripped from the base unit.
    pub prelude: String,
    /// Name of the constructor method.
    pub constructor: String,
    /// Indentation of class members in the synthesized constructor.
    pub indent: String,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            prelude: "<?php".to_owned(),
            constructor: "__construct".to_owned(),
            indent: "    ".to_owned(),
        }
    }
}

impl Dialect {
    /// The canonical no-argument constructor signature.
    #[must_use]
    pub fn constructor_signature(&self) -> String {
        format!("public function {}()", self.constructor)
    }

    /// Remove the first prelude marker from `line`, if present.
    #[must_use]
    pub fn strip_prelude(&self, line: &str) -> Option<String> {
        if self.prelude.is_empty() || !line.contains(self.prelude.as_str()) {
            return None;
        }
        Some(line.replacen(self.prelude.as_str(), "", 1))
    }
}
