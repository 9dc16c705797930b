use crate::ast::{Arg, Atom, Expr};
use crate::lexer::{tokenize, CompareOp, Token, TokenKind};

/// The closed set of check names the grammar accepts as a bare or
/// parenthesized call. `custom` is the escape hatch for a caller-supplied
/// command, resolved through `OrchConfig`'s named command map at evaluation
/// time, not at parse time.
const KNOWN_CALL_CHECKS: &[&str] = &[
    "typecheck",
    "tests",
    "lint",
    "manual_override",
    "memory",
    "traceability",
    "evidence_exists",
    "evidence_coverage",
    "custom",
];

/// The idents the `ident[field] op number` threshold form accepts.
const KNOWN_THRESHOLD_CHECKS: &[&str] = &["tests", "evidence"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub column: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "column {}: {}", self.column, self.message)
    }
}

/// Parses a `gateCondition` string into an `Expr`. An empty or
/// whitespace-only source is *not* an error — callers should treat that as
/// "no gate" before calling `parse` at all; this function always expects at
/// least one token.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src).map_err(|e| ParseError { message: e.message, column: e.column })?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn ident_keyword(&self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) => Some(s.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        match &self.peek().kind {
            TokenKind::Eof => Ok(()),
            other => Err(ParseError {
                message: format!("trailing tokens starting at `{other:?}`"),
                column: self.peek().column,
            }),
        }
    }

    // or := and ("OR" and)*
    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.ident_keyword().as_deref() == Some("OR") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // and := not ("AND" not)*
    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while self.ident_keyword().as_deref() == Some("AND") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    // not := "NOT" not | atom
    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.ident_keyword().as_deref() == Some("NOT") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    // atom := "(" expr ")" | check
    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match &self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                match &self.peek().kind {
                    TokenKind::RParen => {
                        self.advance();
                        Ok(inner)
                    }
                    _ => Err(ParseError {
                        message: "mismatched parenthesis: expected `)`".to_string(),
                        column: self.peek().column,
                    }),
                }
            }
            TokenKind::Ident(_) => self.parse_check(),
            TokenKind::Eof => Err(ParseError {
                message: "empty expression".to_string(),
                column: self.peek().column,
            }),
            other => Err(ParseError {
                message: format!("unexpected token `{other:?}`, expected a check or `(`"),
                column: self.peek().column,
            }),
        }
    }

    // check := ident ("(" arg ("," arg)* ")")?
    //        | ident "[" field "]" op number
    fn parse_check(&mut self) -> Result<Expr, ParseError> {
        let name_tok = self.advance();
        let name = match name_tok.kind {
            TokenKind::Ident(s) => s.to_ascii_lowercase(),
            _ => unreachable!("parse_check only called when peek is Ident"),
        };

        if matches!(self.peek().kind, TokenKind::LBracket) {
            self.advance();
            let field = match &self.peek().kind {
                TokenKind::Ident(f) => f.clone(),
                other => {
                    return Err(ParseError {
                        message: format!("expected a field name inside `[...]`, found `{other:?}`"),
                        column: self.peek().column,
                    })
                }
            };
            self.advance();
            match &self.peek().kind {
                TokenKind::RBracket => {
                    self.advance();
                }
                _ => {
                    return Err(ParseError {
                        message: "mismatched bracket: expected `]`".to_string(),
                        column: self.peek().column,
                    })
                }
            }
            let op = match &self.peek().kind {
                TokenKind::Op(op) => *op,
                other => {
                    return Err(ParseError {
                        message: format!("expected a comparison operator, found `{other:?}`"),
                        column: self.peek().column,
                    })
                }
            };
            self.advance();
            let value = match &self.peek().kind {
                TokenKind::Number(n) => *n,
                other => {
                    return Err(ParseError {
                        message: format!("expected a number, found `{other:?}`"),
                        column: self.peek().column,
                    })
                }
            };
            self.advance();

            if !KNOWN_THRESHOLD_CHECKS.contains(&name.as_str()) {
                return Err(ParseError {
                    message: format!("unknown identifier `{name}` in threshold form"),
                    column: name_tok.column,
                });
            }
            return Ok(Expr::Leaf(Atom::Threshold { name, field, op, value }));
        }

        let mut args = Vec::new();
        if matches!(self.peek().kind, TokenKind::LParen) {
            self.advance();
            if !matches!(self.peek().kind, TokenKind::RParen) {
                loop {
                    args.push(self.parse_arg()?);
                    match &self.peek().kind {
                        TokenKind::Comma => {
                            self.advance();
                        }
                        _ => break,
                    }
                }
            }
            match &self.peek().kind {
                TokenKind::RParen => {
                    self.advance();
                }
                _ => {
                    return Err(ParseError {
                        message: "mismatched parenthesis: expected `)`".to_string(),
                        column: self.peek().column,
                    })
                }
            }
        }

        if !KNOWN_CALL_CHECKS.contains(&name.as_str()) {
            return Err(ParseError {
                message: format!("unknown identifier `{name}`"),
                column: name_tok.column,
            });
        }

        Ok(Expr::Leaf(Atom::Call { name, args }))
    }

    fn parse_arg(&mut self) -> Result<Arg, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Ident(s) => Ok(Arg::Ident(s)),
            TokenKind::String(s) => Ok(Arg::String(s)),
            TokenKind::Number(n) => Ok(Arg::Number(n)),
            other => Err(ParseError {
                message: format!("expected an argument, found `{other:?}`"),
                column: tok.column,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_or_not_with_precedence() {
        let expr = parse("NOT typecheck AND tests OR manual_override").unwrap();
        // (NOT typecheck AND tests) OR manual_override
        match expr {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*rhs, Expr::Leaf(Atom::Call { ref name, .. }) if name == "manual_override"));
                assert!(matches!(*lhs, Expr::And(..)));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("NOT (typecheck OR tests)").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn parses_threshold_form() {
        let expr = parse("evidence[coverage] >= 50").unwrap();
        assert_eq!(
            expr,
            Expr::Leaf(Atom::Threshold {
                name: "evidence".into(),
                field: "coverage".into(),
                op: CompareOp::Ge,
                value: 50.0,
            })
        );
    }

    #[test]
    fn rejects_unknown_identifier() {
        let err = parse("frobnicate").unwrap_err();
        assert!(err.message.contains("unknown identifier"));
    }

    #[test]
    fn rejects_mismatched_parenthesis() {
        let err = parse("(typecheck AND tests").unwrap_err();
        assert!(err.message.contains("parenthesis"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse("typecheck tests").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn is_case_insensitive_for_keywords_and_check_names() {
        let expr = parse("TypeCheck and TESTS or Manual_Override").unwrap();
        assert!(matches!(expr, Expr::Or(..)));
    }

    #[test]
    fn parses_memory_glob_call() {
        let expr = parse("memory(architecture-*)").unwrap();
        match expr {
            Expr::Leaf(Atom::Call { name, args }) => {
                assert_eq!(name, "memory");
                assert_eq!(args, vec![Arg::Ident("architecture-*".to_string())]);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}
