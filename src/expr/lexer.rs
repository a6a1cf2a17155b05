// src/expr/lexer.rs

//! Tokenizer for the body of a `<% .. %>` or `{{ .. }}` block.

use crate::expr::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Dollar,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Eof,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    // `1.foo` is not a number; stop before the dot.
                    if is_float || !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
                        break;
                    }
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| ExprError::Lex {
                    pos: start,
                    message: format!("bad number literal '{text}'"),
                })?)
            } else {
                Token::Int(text.parse().map_err(|_| ExprError::Lex {
                    pos: start,
                    message: format!("integer literal '{text}' out of range"),
                })?)
            };
            tokens.push(token);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Ident(word),
            });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            let mut out = String::new();
            loop {
                match chars.get(i) {
                    None => {
                        return Err(ExprError::Lex {
                            pos: start,
                            message: "unterminated string literal".into(),
                        });
                    }
                    Some('\\') => {
                        if let Some(next) = chars.get(i + 1) {
                            out.push(match next {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                        }
                        i += 2;
                    }
                    Some(ch) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        out.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(out));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', _) => (Token::Eq, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Not, 1),
            ('$', _) => (Token::Dollar, 1),
            ('.', _) => (Token::Dot, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            (other, _) => {
                return Err(ExprError::Lex {
                    pos: i,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };
        tokens.push(token);
        i += width;
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_yaql_reference_and_comparison() {
        let tokens = tokenize(r#"$.x + 1 = "two""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Dollar,
                Token::Dot,
                Token::Ident("x".into()),
                Token::Plus,
                Token::Int(1),
                Token::Eq,
                Token::Str("two".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keeps_attribute_dot_after_integer() {
        let tokens = tokenize("1.5 2.x").unwrap();
        assert_eq!(tokens[0], Token::Float(1.5));
        assert_eq!(tokens[1], Token::Int(2));
        assert_eq!(tokens[2], Token::Dot);
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(matches!(tokenize("'abc"), Err(ExprError::Lex { .. })));
    }
}
