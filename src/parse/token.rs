use logos::{Lexer, Logos};
use thiserror::Error;

use super::unescape::unescape_double_quoted;

#[derive(Debug, Clone, PartialEq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unknown token")]
    UnknownToken,
    #[error("unterminated quoted string")]
    UnterminatedString,
    #[error("no escaped character")]
    DanglingEscape,
}

impl LexerError {
    /// Logos only hands back the default error, so classify it by the offending slice.
    pub fn classify(slice: &str) -> Self {
        match slice.chars().next() {
            Some('"') | Some('\'') => Self::UnterminatedString,
            Some('\\') => Self::DanglingEscape,
            _ => Self::UnknownToken,
        }
    }
}

/// Fragments of shell words. Adjacent fragments with no [`Token::Blank`]
/// between them belong to the same word.
#[derive(Debug, PartialEq, Logos)]
#[logos(error = LexerError)]
pub enum Token<'a> {
    #[regex(r"[ \t\r\n\f]+")]
    Blank,
    #[regex(r#"[^ \t\r\n\f'"\\]+"#)]
    Bare(&'a str),
    #[regex(r"\\.", escaped_callback)]
    Escaped(String),
    #[regex(r#""([^"\\]|\\.)*""#, double_quoted_callback)]
    DoubleQuoted(String),
    #[regex(r"'[^']*'", single_quoted_callback)]
    SingleQuoted(String),
}

impl Token<'_> {
    /// Whether the fragment came from quoting or escaping, which makes
    /// `|` and `&` literal.
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            Self::Escaped(_) | Self::DoubleQuoted(_) | Self::SingleQuoted(_)
        )
    }
}

fn escaped_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    lex.slice()[1..].to_owned()
}

fn double_quoted_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    let slice = lex.slice();
    unescape_double_quoted(&slice[1..slice.len() - 1])
}

fn single_quoted_callback<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    let slice = lex.slice();
    // nothing is special inside single quotes
    slice[1..slice.len() - 1].to_owned()
}
