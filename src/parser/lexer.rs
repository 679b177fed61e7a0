//! Line-aware token scanner.
//!
//! Produces only the tokens boundary detection needs: identifiers, braces,
//! semicolons and scope operators (`::`, `->`). Everything inside string
//! literals, comments and heredoc/nowdoc bodies is skipped, so braces there
//! never affect depth. Variables (`$name`) are consumed without emitting a
//! word so `$class` is not mistaken for the `class` keyword.

use super::ParseError;

/// A token relevant to boundary detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// An identifier or keyword.
    Word(String),
    /// `{`
    Open,
    /// `}`
    Close,
    /// `;`
    Semi,
    /// `::` or `->`
    Scope,
}

/// A token together with the 0-based line it starts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located {
    pub line: usize,
    pub token: Token,
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Code,
    BlockComment { since: usize },
    Quoted { quote: char, since: usize },
    Heredoc { since: usize },
}

/// Scan `lines` into boundary tokens.
///
/// # Errors
/// Returns [`ParseError::Unterminated`] when the input ends inside a block
/// comment, a quoted string or a heredoc.
pub fn tokenize(lines: &[String]) -> Result<Vec<Located>, ParseError> {
    let mut out = Vec::new();
    let mut mode = Mode::Code;
    let mut heredoc_label = String::new();

    for (line_no, line) in lines.iter().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        if matches!(mode, Mode::Heredoc { .. }) {
            let indent = chars.iter().take_while(|c| c.is_whitespace()).count();
            if !closes_heredoc(&chars[indent..], &heredoc_label) {
                continue;
            }
            i = indent + heredoc_label.chars().count();
            mode = Mode::Code;
        }

        while i < chars.len() {
            match mode {
                Mode::BlockComment { .. } => {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        mode = Mode::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                Mode::Quoted { quote, .. } => {
                    if chars[i] == '\\' {
                        i += 2;
                    } else {
                        if chars[i] == quote {
                            mode = Mode::Code;
                        }
                        i += 1;
                    }
                }
                // A heredoc opener consumes the rest of its line.
                Mode::Heredoc { .. } => break,
                Mode::Code => {
                    let c = chars[i];
                    let next = chars.get(i + 1).copied();
                    match c {
                        '/' if next == Some('/') => break,
                        '#' if next != Some('[') => break,
                        '/' if next == Some('*') => {
                            mode = Mode::BlockComment { since: line_no };
                            i += 2;
                        }
                        '\'' | '"' | '`' => {
                            mode = Mode::Quoted {
                                quote: c,
                                since: line_no,
                            };
                            i += 1;
                        }
                        '<' if chars[i..].starts_with(&['<', '<', '<']) => {
                            if let Some(label) = heredoc_opener(&chars[i + 3..]) {
                                heredoc_label = label;
                                mode = Mode::Heredoc { since: line_no };
                            } else {
                                i += 3;
                            }
                        }
                        '{' => {
                            out.push(Located {
                                line: line_no,
                                token: Token::Open,
                            });
                            i += 1;
                        }
                        '}' => {
                            out.push(Located {
                                line: line_no,
                                token: Token::Close,
                            });
                            i += 1;
                        }
                        ';' => {
                            out.push(Located {
                                line: line_no,
                                token: Token::Semi,
                            });
                            i += 1;
                        }
                        ':' if next == Some(':') => {
                            out.push(Located {
                                line: line_no,
                                token: Token::Scope,
                            });
                            i += 2;
                        }
                        '-' if next == Some('>') => {
                            out.push(Located {
                                line: line_no,
                                token: Token::Scope,
                            });
                            i += 2;
                        }
                        '$' => {
                            i += 1;
                            while i < chars.len() && is_ident(chars[i]) {
                                i += 1;
                            }
                        }
                        c if is_ident_start(c) => {
                            let start = i;
                            while i < chars.len() && is_ident(chars[i]) {
                                i += 1;
                            }
                            out.push(Located {
                                line: line_no,
                                token: Token::Word(chars[start..i].iter().collect()),
                            });
                        }
                        _ => i += 1,
                    }
                }
            }
        }
    }

    match mode {
        Mode::Code => Ok(out),
        Mode::BlockComment { since } => Err(ParseError::Unterminated {
            what: "block comment",
            line: since,
        }),
        Mode::Quoted { since, .. } => Err(ParseError::Unterminated {
            what: "string literal",
            line: since,
        }),
        Mode::Heredoc { since } => Err(ParseError::Unterminated {
            what: "heredoc",
            line: since,
        }),
    }
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse the label after `<<<`: optional blanks, optional quote, identifier.
fn heredoc_opener(rest: &[char]) -> Option<String> {
    let label: String = rest
        .iter()
        .skip_while(|c| **c == ' ' || **c == '\t')
        .skip_while(|c| **c == '\'' || **c == '"')
        .take_while(|c| is_ident(**c))
        .collect();
    if label.is_empty() { None } else { Some(label) }
}

fn closes_heredoc(line: &[char], label: &str) -> bool {
    let label: Vec<char> = label.chars().collect();
    line.starts_with(&label) && line.get(label.len()).is_none_or(|c| !is_ident(*c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_owned).collect()
    }

    fn kinds(text: &str) -> Vec<Token> {
        tokenize(&lines(text))
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn word(w: &str) -> Token {
        Token::Word(w.to_owned())
    }

    #[test]
    fn braces_and_words_carry_line_numbers() {
        let toks = tokenize(&lines("class A\n{\n}")).unwrap();
        assert_eq!(
            toks,
            vec![
                Located { line: 0, token: word("class") },
                Located { line: 0, token: word("A") },
                Located { line: 1, token: Token::Open },
                Located { line: 2, token: Token::Close },
            ]
        );
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert_eq!(
            kinds(r#"$a = "{${b}}"; $c = '}';"#),
            vec![Token::Semi, Token::Semi]
        );
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        assert_eq!(kinds(r#"$a = "x\"{"; {"#), vec![Token::Semi, Token::Open]);
    }

    #[test]
    fn comments_are_ignored() {
        assert_eq!(kinds("// {\n# }\n/* { \n } */ ;"), vec![Token::Semi]);
    }

    #[test]
    fn php_attributes_are_code() {
        assert_eq!(kinds("#[Inject]"), vec![word("Inject")]);
    }

    #[test]
    fn variables_are_not_words() {
        assert_eq!(kinds("$class = 1;"), vec![Token::Semi]);
    }

    #[test]
    fn scope_operators() {
        assert_eq!(
            kinds("Foo::class; $a->b;"),
            vec![
                word("Foo"),
                Token::Scope,
                word("class"),
                Token::Semi,
                Token::Scope,
                word("b"),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn heredoc_body_is_skipped() {
        let text = "$a = <<<EOT\n{ not code }\n  EOT;\n}";
        assert_eq!(kinds(text), vec![Token::Semi, Token::Close]);
    }

    #[test]
    fn nowdoc_label_is_unquoted() {
        let text = "$a = <<<'TXT'\n}\nTXT;";
        assert_eq!(kinds(text), vec![Token::Semi]);
    }

    #[test]
    fn heredoc_label_prefix_does_not_close() {
        let text = "$a = <<<EOT\nEOTX {\nEOT;";
        assert_eq!(kinds(text), vec![Token::Semi]);
    }

    #[test]
    fn unterminated_block_comment() {
        let err = tokenize(&lines("a\n/* open")).unwrap_err();
        assert_eq!(
            err,
            ParseError::Unterminated {
                what: "block comment",
                line: 1
            }
        );
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize(&lines("'abc")).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Unterminated {
                what: "string literal",
                line: 0
            }
        ));
    }

    #[test]
    fn unterminated_heredoc() {
        let err = tokenize(&lines("<<<EOT\nbody")).unwrap_err();
        assert!(matches!(err, ParseError::Unterminated { what: "heredoc", .. }));
    }

    #[test]
    fn multiline_string_spans_lines() {
        assert_eq!(kinds("$a = '\n{\n';"), vec![Token::Semi]);
    }
}
