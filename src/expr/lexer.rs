//! Tokenizer for the model expression language.

use crate::error::{FitError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    /// `^` or `**`.
    Caret,
    LParen,
    RParen,
    Comma,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub position: usize,
}

/// Split `source` into tokens. The last token is always [`TokenKind::End`].
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            b'+' => {
                i += 1;
                TokenKind::Plus
            }
            b'-' => {
                i += 1;
                TokenKind::Minus
            }
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i += 2;
                    TokenKind::Caret
                } else {
                    i += 1;
                    TokenKind::Star
                }
            }
            b'/' => {
                i += 1;
                TokenKind::Slash
            }
            b'^' => {
                i += 1;
                TokenKind::Caret
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'0'..=b'9' | b'.' => {
                i = scan_number(bytes, i);
                let text = &source[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| FitError::parse(start, format!("invalid number '{text}'")))?;
                TokenKind::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                TokenKind::Ident(source[start..i].to_string())
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(FitError::parse(start, format!("unexpected character '{ch}'")));
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: source.len(),
    });
    Ok(tokens)
}

/// Advance over `digits [. digits] [e [+-] digits]` starting at `i`.
///
/// The exponent is only consumed when a digit follows, so `2*e` and `2e` keep the
/// constant `e` as a separate identifier token.
fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn double_star_is_power() {
        assert_eq!(
            kinds("x**2"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Caret,
                TokenKind::Number(2.0),
                TokenKind::End
            ]
        );
    }

    #[test]
    fn scientific_literals() {
        assert_eq!(kinds("1.5e-3"), vec![TokenKind::Number(1.5e-3), TokenKind::End]);
        assert_eq!(kinds(".25"), vec![TokenKind::Number(0.25), TokenKind::End]);
        // A dangling exponent marker leaves `e` as an identifier.
        assert_eq!(
            kinds("2e"),
            vec![TokenKind::Number(2.0), TokenKind::Ident("e".to_string()), TokenKind::End]
        );
    }

    #[test]
    fn rejects_stray_characters() {
        let err = tokenize("a # b").unwrap_err();
        assert!(matches!(err, FitError::Parse { position: 2, .. }));
    }

    #[test]
    fn rejects_lone_dot() {
        assert!(matches!(tokenize("."), Err(FitError::Parse { position: 0, .. })));
    }
}
