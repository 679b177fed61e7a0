//! Fragment extraction.
//!
//! Turns one compilation unit plus its [`BoundaryInfo`] into a [`Fragment`]
//! (the body lines that go into the merged unit) and the constructor lines
//! that feed the synthesized constructor.
//!
//! - A **base** unit keeps its whole text, minus the prelude marker.
//! - An **override** unit keeps only its class body, so its own class
//!   wrapper disappears.
//! - In both cases the constructor (signature through closing brace) is cut
//!   out of the body and its inner lines are returned separately.

use std::path::{Path, PathBuf};

use crate::model::{CompilationUnit, Dialect, UnitRole};
use crate::parser::BoundaryInfo;

/// Width of the star rule framing a provenance block.
const RULE_WIDTH: usize = 70;

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// Extracted, wrapper-stripped body of one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Source path shown in the provenance block; `None` for the base.
    pub provenance: Option<PathBuf>,
    /// Body lines with the constructor removed.
    pub lines: Vec<String>,
}

impl Fragment {
    /// Render the fragment as it appears in the merged unit.
    ///
    /// The joined lines are cut just before their last `}` (the class's own
    /// closing brace), and an override is prefixed by its provenance block.
    /// `root` is stripped from the provenance path when it is a prefix.
    #[must_use]
    pub fn render(&self, root: &Path) -> String {
        let joined = self.lines.join("\n");
        let body = joined.rfind('}').map_or(joined.as_str(), |at| &joined[..at]);
        match &self.provenance {
            None => body.to_owned(),
            Some(path) => format!("{}{body}", provenance_block(path, root)),
        }
    }
}

/// The comment block naming where an override fragment came from.
#[must_use]
pub fn provenance_block(path: &Path, root: &Path) -> String {
    let shown = path.strip_prefix(root).unwrap_or(path);
    let rule = "*".repeat(RULE_WIDTH);
    format!(
        "\n/*{rule}\n\tthis is partial from: \n\t{}\n{rule}*/\n",
        shown.display()
    )
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

/// Result of extracting one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    /// The unit's contribution to the merged body.
    pub fragment: Fragment,
    /// The unit's constructor body lines, in source order.
    pub constructor: Vec<String>,
}

/// Split a unit into its body fragment and constructor lines.
#[must_use]
pub fn extract(
    unit: &CompilationUnit,
    boundary: &BoundaryInfo,
    role: UnitRole,
    dialect: &Dialect,
) -> Extraction {
    let lines = unit.lines();
    let range = if role.is_base() {
        0..lines.len()
    } else {
        boundary.body_range(lines.len())
    };

    let mut keep = vec![true; lines.len()];
    let mut constructor = Vec::new();
    if let Some(span) = boundary.method(&dialect.constructor) {
        if span.start == span.end {
            if let Some(inline) = inline_body(&lines[span.start]) {
                constructor.push(format!("{0}{0}{inline}", dialect.indent));
            }
        } else {
            constructor.extend(lines[span.inner()].iter().cloned());
        }
        let removed = span.signature.min(span.start)..=span.end;
        for flag in &mut keep[removed] {
            *flag = false;
        }
    }

    let mut prelude_pending = role.is_base();
    let mut body: Vec<String> = Vec::with_capacity(range.len());
    for idx in range.filter(|&i| keep[i]) {
        let line = &lines[idx];
        if prelude_pending && let Some(stripped) = dialect.strip_prelude(line) {
            prelude_pending = false;
            body.push(stripped);
            continue;
        }
        body.push(line.clone());
    }
    if body.first().is_some_and(|l| l.trim() == "{") {
        body.remove(0);
    }

    Extraction {
        fragment: Fragment {
            provenance: (!role.is_base()).then(|| unit.path().to_path_buf()),
            lines: body,
        },
        constructor,
    }
}

/// Statement text of a one-line method body such as `function f() { $a = 1; }`.
fn inline_body(line: &str) -> Option<&str> {
    let open = line.find('{')?;
    let close = line.rfind('}')?;
    let inner = line.get(open + 1..close)?.trim();
    if inner.is_empty() { None } else { Some(inner) }
}
