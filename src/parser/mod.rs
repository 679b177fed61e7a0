//! Boundary parser.
//!
//! Locates the first class definition in a unit and the line spans of the
//! methods declared directly in its body. This is boundary detection, not a
//! language parser: a small lexer keeps braces inside strings, comments and
//! heredocs from counting, and everything else is brace depth.
//!
//! All offsets are 0-based indices into the unit's normalized lines.
//!
//! Inputs outside the supported shape (one class per file, balanced braces)
//! are rejected with a [`ParseError`] instead of being sliced incorrectly.

mod lexer;

use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::model::unit::split_lines;

use lexer::{Located, Token};

// ---------------------------------------------------------------------------
// BoundaryInfo
// ---------------------------------------------------------------------------

/// Line span of one method inside the class body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MethodSpan {
    /// Line holding the `function` keyword.
    pub signature: usize,
    /// Line holding the method's opening brace.
    pub start: usize,
    /// Line holding the method's closing brace.
    pub end: usize,
}

impl MethodSpan {
    /// Lines strictly between the opening and closing brace.
    #[must_use]
    pub const fn inner(&self) -> Range<usize> {
        if self.start < self.end {
            self.start + 1..self.end
        } else {
            self.start..self.start
        }
    }
}

/// Where the first class of a unit begins and ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BoundaryInfo {
    /// The declared class name.
    pub class_name: String,
    /// Line holding the `class` keyword.
    pub declaration: usize,
    /// First line of the class body: the opening-brace line when it holds
    /// nothing but `{`, otherwise the line after it.
    pub body_start: usize,
    /// Line of the class's closing brace, or `None` when the class is the
    /// last construct in the file and the body runs to end of file.
    pub body_end: Option<usize>,
    /// Line of the class's closing brace.
    pub closing: usize,
    /// Methods declared directly in the class body, keyed by name.
    pub methods: BTreeMap<String, MethodSpan>,
}

impl BoundaryInfo {
    /// Look up a method by name, ignoring ASCII case.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodSpan> {
        self.methods.get(name).or_else(|| {
            self.methods
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, span)| span)
        })
    }

    /// The lines an override contributes: from `body_start` through the
    /// class's closing brace, or to the end of a file of `total` lines.
    #[must_use]
    pub fn body_range(&self, total: usize) -> Range<usize> {
        let end = self.body_end.map_or(total, |e| e + 1).min(total);
        self.body_start.min(end)..end
    }
}

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// Why a unit's boundaries could not be located.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No top-level class declaration with a body was found.
    #[error("no class definition found")]
    NoClassFound,

    /// A second top-level class follows the first one.
    #[error("multiple class definitions (line {} and line {})", first + 1, second + 1)]
    MultipleClasses {
        /// Declaration line of the first class.
        first: usize,
        /// Declaration line of the second class.
        second: usize,
    },

    /// A closing brace without an opener, or an opener never closed.
    #[error("unbalanced braces near line {}", line + 1)]
    UnbalancedBraces {
        /// The offending line.
        line: usize,
    },

    /// The input ended inside a comment, string or heredoc.
    #[error("unterminated {what} starting on line {}", line + 1)]
    Unterminated {
        /// What was left open.
        what: &'static str,
        /// Line where it started.
        line: usize,
    },
}

// ---------------------------------------------------------------------------
// locate
// ---------------------------------------------------------------------------

/// Locate class and method boundaries in raw unit text.
///
/// # Errors
/// See [`locate_lines`].
pub fn locate(text: &str) -> Result<BoundaryInfo, ParseError> {
    locate_lines(&split_lines(text))
}

/// Locate class and method boundaries in already-split lines.
///
/// # Errors
/// Returns [`ParseError::NoClassFound`] when the lines hold no class,
/// [`ParseError::MultipleClasses`] for a second top-level class, and
/// [`ParseError::UnbalancedBraces`] / [`ParseError::Unterminated`] for input
/// that cannot be brace-counted reliably.
pub fn locate_lines(lines: &[String]) -> Result<BoundaryInfo, ParseError> {
    let tokens = lexer::tokenize(lines)?;
    let mut scan = Scan::default();
    for (idx, tok) in tokens.iter().enumerate() {
        scan.step(&tokens, idx, tok)?;
    }
    if let Some(line) = scan.open_braces.last() {
        return Err(ParseError::UnbalancedBraces { line: *line });
    }

    let class = scan.class.ok_or(ParseError::NoClassFound)?;
    let (Some(open), Some(closing)) = (class.open, class.closing) else {
        return Err(ParseError::NoClassFound);
    };

    let body_start = if lines[open].trim() == "{" {
        open
    } else {
        open + 1
    };
    let trailing_only = lines[closing + 1..].iter().all(|l| {
        let t = l.trim();
        t.is_empty() || t == "?>"
    });

    Ok(BoundaryInfo {
        class_name: class.name,
        declaration: class.declaration,
        body_start,
        body_end: if trailing_only { None } else { Some(closing) },
        closing,
        methods: class.methods,
    })
}

#[derive(Debug)]
struct ClassScan {
    name: String,
    declaration: usize,
    open: Option<usize>,
    closing: Option<usize>,
    methods: BTreeMap<String, MethodSpan>,
}

#[derive(Debug, Default)]
struct Scan {
    /// Line of every currently open brace; its length is the depth.
    open_braces: Vec<usize>,
    class: Option<ClassScan>,
    /// Method whose signature was seen but whose body has not opened.
    pending_method: Option<(String, usize)>,
    /// Method whose body is open: name, signature line, opening line.
    open_method: Option<(String, usize, usize)>,
}

impl Scan {
    fn in_class_body(&self) -> bool {
        self.class
            .as_ref()
            .is_some_and(|c| c.open.is_some() && c.closing.is_none())
    }

    fn step(&mut self, tokens: &[Located], idx: usize, tok: &Located) -> Result<(), ParseError> {
        let depth = self.open_braces.len();
        let prev = idx.checked_sub(1).map(|i| &tokens[i].token);
        match &tok.token {
            Token::Word(w) if depth == 0 && w.eq_ignore_ascii_case("class") => {
                let is_reference = match prev {
                    Some(Token::Scope) => true,
                    Some(Token::Word(p)) => p.eq_ignore_ascii_case("new"),
                    _ => false,
                };
                let Some(name) = word_after(tokens, idx) else {
                    return Ok(());
                };
                if is_reference {
                    return Ok(());
                }
                if let Some(first) = &self.class {
                    return Err(ParseError::MultipleClasses {
                        first: first.declaration,
                        second: tok.line,
                    });
                }
                self.class = Some(ClassScan {
                    name: name.to_owned(),
                    declaration: tok.line,
                    open: None,
                    closing: None,
                    methods: BTreeMap::new(),
                });
            }
            Token::Word(w)
                if depth == 1
                    && self.in_class_body()
                    && w.eq_ignore_ascii_case("function")
                    && prev != Some(&Token::Scope) =>
            {
                if let Some(name) = word_after(tokens, idx) {
                    self.pending_method = Some((name.to_owned(), tok.line));
                }
            }
            Token::Semi if depth == 1 => self.pending_method = None,
            Token::Open => {
                if depth == 0 {
                    if let Some(class) = self.class.as_mut().filter(|c| c.open.is_none()) {
                        class.open = Some(tok.line);
                    }
                } else if depth == 1
                    && self.in_class_body()
                    && let Some((name, signature)) = self.pending_method.take()
                {
                    self.open_method = Some((name, signature, tok.line));
                }
                self.open_braces.push(tok.line);
            }
            Token::Close => {
                if self.open_braces.pop().is_none() {
                    return Err(ParseError::UnbalancedBraces { line: tok.line });
                }
                match self.open_braces.len() {
                    1 if self.in_class_body() => {
                        if let Some((name, signature, start)) = self.open_method.take()
                            && let Some(class) = self.class.as_mut()
                        {
                            class.methods.entry(name).or_insert(MethodSpan {
                                signature,
                                start,
                                end: tok.line,
                            });
                        }
                    }
                    0 => {
                        if let Some(class) = self
                            .class
                            .as_mut()
                            .filter(|c| c.open.is_some() && c.closing.is_none())
                        {
                            class.closing = Some(tok.line);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn word_after(tokens: &[Located], idx: usize) -> Option<&str> {
    match tokens.get(idx + 1).map(|t| &t.token) {
        Some(Token::Word(w)) => Some(w.as_str()),
        _ => None,
    }
}
