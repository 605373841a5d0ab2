//! Tokenizer for the dialog script grammar.
//!
//! Keywords (`State`, `Verified`, `Speak`, `Case`, ...) are not distinguished
//! from ordinary identifiers at this stage - the parser matches them by
//! value, exactly as the source grammar's keyword terminals do. This keeps
//! the lexer tiny and the keyword set open to the grammar module alone.

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Variable(String),
    Str(String),
    Int(i64),
    Real(f64),
    Plus,
    CmpOp(CmpOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl CmpOp {
    pub fn apply(self, lhs: usize, rhs: i64) -> bool {
        let lhs = lhs as i64;
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
        }
    }
}

/// One token plus the 1-based source line it started on, for `GrammarError` context.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

pub fn lex(source: &str) -> Result<Vec<Spanned>, CoreError> {
    let mut out = Vec::new();
    let mut line: u32 = 1;
    let bytes: Vec<char> = source.chars().collect();
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => {
                i += 1;
            }
            '"' => {
                let start_line = line;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    if bytes[i] == '"' {
                        closed = true;
                        i += 1;
                        break;
                    }
                    if bytes[i] == '\n' {
                        line += 1;
                    }
                    s.push(bytes[i]);
                    i += 1;
                }
                if !closed {
                    return Err(CoreError::grammar(
                        "unterminated string literal",
                        format!("line {start_line}"),
                    ));
                }
                out.push(Spanned {
                    token: Token::Str(s),
                    line: start_line,
                });
            }
            '$' => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                    i += 1;
                }
                let name: String = bytes[start + 1..i].iter().collect();
                if name.is_empty() {
                    return Err(CoreError::grammar(
                        "empty variable name after '$'",
                        format!("line {line}"),
                    ));
                }
                out.push(Spanned {
                    token: Token::Variable(name),
                    line,
                });
            }
            '+' => {
                out.push(Spanned {
                    token: Token::Plus,
                    line,
                });
                i += 1;
            }
            '<' | '>' | '=' => {
                let start = i;
                i += 1;
                if i < bytes.len() && bytes[i] == '=' {
                    i += 1;
                }
                let raw: String = bytes[start..i].iter().collect();
                let op = match raw.as_str() {
                    "<" => CmpOp::Lt,
                    ">" => CmpOp::Gt,
                    "<=" => CmpOp::Le,
                    ">=" => CmpOp::Ge,
                    "=" => CmpOp::Eq,
                    _ => unreachable!(),
                };
                out.push(Spanned {
                    token: Token::CmpOp(op),
                    line,
                });
            }
            c if c == '-' || c == '+' || c.is_ascii_digit() => {
                let start = i;
                if c == '-' || c == '+' {
                    i += 1;
                }
                let mut is_real = false;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == '.') {
                    if bytes[i] == '.' {
                        is_real = true;
                    }
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == 'e' || bytes[i] == 'E') {
                    is_real = true;
                    i += 1;
                    if i < bytes.len() && (bytes[i] == '+' || bytes[i] == '-') {
                        i += 1;
                    }
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let raw: String = bytes[start..i].iter().collect();
                if raw.is_empty() || raw == "-" || raw == "+" {
                    return Err(CoreError::grammar(
                        format!("invalid numeric literal '{raw}'"),
                        format!("line {line}"),
                    ));
                }
                if is_real {
                    let v: f64 = raw.parse().map_err(|_| {
                        CoreError::grammar(
                            format!("invalid real literal '{raw}'"),
                            format!("line {line}"),
                        )
                    })?;
                    out.push(Spanned {
                        token: Token::Real(v),
                        line,
                    });
                } else {
                    let v: i64 = raw.parse().map_err(|_| {
                        CoreError::grammar(
                            format!("invalid integer literal '{raw}'"),
                            format!("line {line}"),
                        )
                    })?;
                    out.push(Spanned {
                        token: Token::Int(v),
                        line,
                    });
                }
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let name: String = bytes[start..i].iter().collect();
                out.push(Spanned {
                    token: Token::Ident(name),
                    line,
                });
            }
            other => {
                return Err(CoreError::grammar(
                    format!("unexpected character '{other}'"),
                    format!("line {line}"),
                ));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_variable_definition() {
        let toks = lex(r#"Variable $balance Int 0"#).unwrap();
        assert_eq!(
            toks.iter().map(|s| s.token.clone()).collect::<Vec<_>>(),
            vec![
                Token::Ident("Variable".into()),
                Token::Variable("balance".into()),
                Token::Ident("Int".into()),
                Token::Int(0),
            ]
        );
    }

    #[test]
    fn lexes_comparison_operators() {
        let toks = lex("Length <= 30").unwrap();
        assert_eq!(toks[1].token, Token::CmpOp(CmpOp::Le));
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(lex(r#"Speak "hello"#).is_err());
    }

    #[test]
    fn tracks_line_numbers_across_newlines() {
        let toks = lex("State A\nVerified").unwrap();
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[2].line, 2);
    }
}
