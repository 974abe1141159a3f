//! Rule condition parser.
//!
//! Recursive descent over the infix condition language used by rule chains:
//!
//! ```text
//! condition  := comparison (("and" | "or") comparison)*
//! comparison := operand op operand
//! op         := ">=" | "<=" | "==" | "≥" | "≤" | ">" | "<" | "="
//! operand    := number | name | name "(" name "," (integer | name) ")"
//! number     := [+-]? digits ("." digits)? ([eE] [+-]? digits)?
//! ```
//!
//! Connectives fold strictly left to right. Errors carry the character
//! offset of the offending token.

use crate::domain::error::ParseError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::rule::{CompareOp, Comparison, Condition, IndicatorCall, Operand, WindowRef};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn describe_next(&self) -> String {
        let word = self.peek_word();
        if !word.is_empty() {
            word.to_string()
        } else {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        }
    }

    fn parse_identifier(&mut self) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let word = self.peek_word();
        let starts_ok = word
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_');
        if !starts_ok {
            return Err(self.error(format!("expected name, found '{}'", self.describe_next())));
        }
        self.pos += word.len();
        Ok(word)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if matches!(self.peek(), Some('-') | Some('+')) {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }
        self.skip_exponent();

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    /// Consume `[eE][+-]?digits` when it is present in full.
    fn skip_exponent(&mut self) {
        let rest = self.remaining().as_bytes();
        if !matches!(rest.first(), Some(b'e' | b'E')) {
            return;
        }
        let sign = usize::from(matches!(rest.get(1), Some(b'+' | b'-')));
        let digits = rest[1 + sign..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 {
            self.pos += 1 + sign + digits;
        }
    }

    fn parse_window(&mut self) -> Result<WindowRef, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '+')
        {
            let value = self.parse_number()?;
            if value.fract() != 0.0 {
                return Err(ParseError {
                    message: format!("window must be an integer, found {}", value),
                    position: start,
                });
            }
            return Ok(WindowRef::Literal(value as i64));
        }
        let name = self.parse_identifier()?;
        Ok(WindowRef::Param(name.to_string()))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '+' || ch == '.')
        {
            return Ok(Operand::Literal(self.parse_number()?));
        }

        let start = self.pos;
        let name = self.parse_identifier()?;
        if is_connective(name) {
            return Err(ParseError {
                message: format!("expected operand, found '{}'", name),
                position: start,
            });
        }

        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(Operand::Name(name.to_string()));
        }

        self.expect_char('(')?;
        let series = self.parse_identifier()?.to_string();
        self.expect_char(',')?;
        let window = self.parse_window()?;
        self.expect_char(')')?;

        Ok(match name.parse::<IndicatorKind>() {
            Ok(kind) => Operand::Indicator(IndicatorCall {
                kind,
                series,
                window,
            }),
            Err(()) => Operand::UnknownCall(name.to_string()),
        })
    }

    fn parse_operator(&mut self) -> Result<CompareOp, ParseError> {
        self.skip_whitespace();
        const OPERATORS: [(&str, CompareOp); 8] = [
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("==", CompareOp::Eq),
            ("≥", CompareOp::Ge),
            ("≤", CompareOp::Le),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
            ("=", CompareOp::Eq),
        ];
        for (token, op) in OPERATORS {
            if self.remaining().starts_with(token) {
                self.pos += token.len();
                return Ok(op);
            }
        }
        Err(self.error(format!(
            "expected comparison operator, found '{}'",
            self.describe_next()
        )))
    }

    fn parse_comparison(&mut self) -> Result<Condition, ParseError> {
        let lhs = self.parse_operand()?;
        let op = self.parse_operator()?;
        let rhs = self.parse_operand()?;
        Ok(Condition::Compare(Comparison { lhs, op, rhs }))
    }

    fn parse_connective(&mut self) -> Result<Option<Connective>, ParseError> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Ok(None);
        }
        let word = self.peek_word();
        let connective = if word.eq_ignore_ascii_case("and") {
            Connective::And
        } else if word.eq_ignore_ascii_case("or") {
            Connective::Or
        } else {
            return Err(self.error(format!(
                "expected 'and' or 'or', found '{}'",
                self.describe_next()
            )));
        };
        self.pos += word.len();
        Ok(Some(connective))
    }

    fn parse(&mut self) -> Result<Condition, ParseError> {
        let mut condition = self.parse_comparison()?;
        while let Some(connective) = self.parse_connective()? {
            let rhs = Box::new(self.parse_comparison()?);
            let lhs = Box::new(condition);
            condition = match connective {
                Connective::And => Condition::And(lhs, rhs),
                Connective::Or => Condition::Or(lhs, rhs),
            };
        }
        Ok(condition)
    }
}

#[derive(Debug, Clone, Copy)]
enum Connective {
    And,
    Or,
}

fn is_connective(word: &str) -> bool {
    word.eq_ignore_ascii_case("and") || word.eq_ignore_ascii_case("or")
}

/// Parse a condition string. An empty (or all-whitespace) condition means
/// "always true" and yields `None`.
pub fn parse(input: &str) -> Result<Option<Condition>, ParseError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let mut parser = Parser::new(input);
    parser.parse().map(Some)
}
