//! Message selector expressions.
//!
//! Supports the subset of the SQL-92 conditional syntax used by JMS
//! consumers: comparisons (`=`, `<>`, `<`, `<=`, `>`, `>=`), `IN` lists,
//! `IS [NOT] NULL`, `NOT`, `AND`, `OR` and parentheses. Identifiers refer to
//! standard header fields (`JMSCorrelationID`, `JMSMessageID`, `JMSType`,
//! `JMSPriority`, `JMSDeliveryMode`, `JMSTimestamp`) or message properties.
//! Evaluation follows three-valued logic: a comparison against a missing
//! identifier is unknown, and only `true` selects a message.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::message::{JmsMessage, PropertyValue};

/// Errors raised while parsing a selector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// The expression ended early.
    #[error("selector ended unexpectedly")]
    UnexpectedEnd,
    /// A token appeared where it is not allowed.
    #[error("unexpected token {token:?} at offset {offset}")]
    UnexpectedToken {
        /// The offending token.
        token: String,
        /// Byte offset in the source.
        offset: usize,
    },
    /// A string literal was not closed.
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    /// A numeric literal could not be parsed.
    #[error("invalid numeric literal {0:?}")]
    InvalidNumber(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    IsNull {
        field: String,
        negated: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Literal(Literal),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
}

/// A parsed selector.
///
/// ```
/// use relaymq::{message::JmsMessage, selector::Selector};
///
/// let selector: Selector = "region = 'eu' AND JMSPriority > 4".parse().expect("valid selector");
/// let mut message = JmsMessage::new("order");
/// message.set_property("region", "eu");
/// message.priority = 7;
/// assert!(selector.matches(&message));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Selector {
    source: String,
    expr: Expr,
}

impl Selector {
    /// Parse `source` into a selector.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] if the expression is malformed.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((token, offset)) = parser.tokens.get(parser.position) {
            return Err(SelectorError::UnexpectedToken {
                token: format!("{token:?}"),
                offset: *offset,
            });
        }
        Ok(Self {
            source: source.to_owned(),
            expr,
        })
    }

    /// Build `field IN ('a', 'b', ...)` for the supplied string values.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::UnexpectedEnd`] when `values` is empty.
    pub fn string_in<I, S>(field: &str, values: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let quoted: Vec<String> = values
            .into_iter()
            .map(|value| format!("'{}'", value.as_ref().replace('\'', "''")))
            .collect();
        if quoted.is_empty() {
            return Err(SelectorError::UnexpectedEnd);
        }
        Self::parse(&format!("{field} IN ({})", quoted.join(", ")))
    }

    /// Original expression text.
    #[must_use]
    pub fn source(&self) -> &str { &self.source }

    /// Whether `message` satisfies the selector.
    #[must_use]
    pub fn matches(&self, message: &JmsMessage) -> bool { eval(&self.expr, message) == Some(true) }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> { Self::parse(source) }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.source) }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, SelectorError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut i = 0;
    while let Some(&(offset, c)) = chars.get(i) {
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, offset));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, offset));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, offset));
                i += 1;
            }
            '=' => {
                tokens.push((Token::Op(CompareOp::Eq), offset));
                i += 1;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).map(|&(_, n)| n);
                let (op, width) = match (c, next) {
                    ('<', Some('>')) => (CompareOp::Ne, 2),
                    ('<', Some('=')) => (CompareOp::Le, 2),
                    ('>', Some('=')) => (CompareOp::Ge, 2),
                    ('<', _) => (CompareOp::Lt, 1),
                    _ => (CompareOp::Gt, 1),
                };
                tokens.push((Token::Op(op), offset));
                i += width;
            }
            '\'' => {
                let (literal, next) = read_string(&chars, i)?;
                tokens.push((Token::Literal(Literal::Str(literal)), offset));
                i = next;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|&(_, d)| d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|&(_, d)| d).collect();
                tokens.push((Token::Literal(parse_number(&text)?), offset));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|&(_, d)| d.is_alphanumeric() || d == '_' || d == '$' || d == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|&(_, d)| d).collect();
                let token = match word.to_ascii_uppercase().as_str() {
                    "TRUE" => Token::Literal(Literal::Bool(true)),
                    "FALSE" => Token::Literal(Literal::Bool(false)),
                    _ => Token::Ident(word),
                };
                tokens.push((token, offset));
            }
            other => {
                return Err(SelectorError::UnexpectedToken {
                    token: other.to_string(),
                    offset,
                });
            }
        }
    }
    Ok(tokens)
}

fn read_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), SelectorError> {
    let offset = chars.get(start).map_or(0, |&(o, _)| o);
    let mut value = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(SelectorError::UnterminatedString(offset)),
            Some(&(_, '\'')) => {
                if chars.get(i + 1).is_some_and(|&(_, n)| n == '\'') {
                    value.push('\'');
                    i += 2;
                } else {
                    return Ok((value, i + 1));
                }
            }
            Some(&(_, c)) => {
                value.push(c);
                i += 1;
            }
        }
    }
}

fn parse_number(text: &str) -> Result<Literal, SelectorError> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(Literal::Int(value));
    }
    text.parse::<f64>()
        .map(Literal::Float)
        .map_err(|_| SelectorError::InvalidNumber(text.to_owned()))
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> { self.tokens.get(self.position).map(|(t, _)| t) }

    fn next(&mut self) -> Result<(Token, usize), SelectorError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(SelectorError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SelectorError> {
        let (token, offset) = self.next()?;
        match token {
            Token::Ident(word) if word.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(unexpected(&other, offset)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("OR") {
            self.position += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SelectorError> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("AND") {
            self.position += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SelectorError> {
        if self.peek_keyword("NOT") {
            self.position += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if matches!(self.peek(), Some(Token::LParen)) {
            self.position += 1;
            let inner = self.parse_or()?;
            let (token, offset) = self.next()?;
            if token != Token::RParen {
                return Err(unexpected(&token, offset));
            }
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, SelectorError> {
        let (token, offset) = self.next()?;
        let Token::Ident(field) = token else {
            return Err(unexpected(&token, offset));
        };

        if self.peek_keyword("IS") {
            self.position += 1;
            let negated = self.peek_keyword("NOT");
            if negated {
                self.position += 1;
            }
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull { field, negated });
        }

        let negated = self.peek_keyword("NOT");
        if negated {
            self.position += 1;
        }
        if self.peek_keyword("IN") {
            self.position += 1;
            return Ok(Expr::In {
                field,
                values: self.parse_list()?,
                negated,
            });
        }
        if negated {
            let (token, offset) = self.next()?;
            return Err(unexpected(&token, offset));
        }

        let (token, offset) = self.next()?;
        let Token::Op(op) = token else {
            return Err(unexpected(&token, offset));
        };
        let (token, offset) = self.next()?;
        let Token::Literal(value) = token else {
            return Err(unexpected(&token, offset));
        };
        Ok(Expr::Compare { field, op, value })
    }

    fn parse_list(&mut self) -> Result<Vec<Literal>, SelectorError> {
        let (token, offset) = self.next()?;
        if token != Token::LParen {
            return Err(unexpected(&token, offset));
        }
        let mut values = Vec::new();
        loop {
            let (token, offset) = self.next()?;
            match token {
                Token::Literal(value) => values.push(value),
                other => return Err(unexpected(&other, offset)),
            }
            let (token, offset) = self.next()?;
            match token {
                Token::Comma => {}
                Token::RParen => return Ok(values),
                other => return Err(unexpected(&other, offset)),
            }
        }
    }
}

fn unexpected(token: &Token, offset: usize) -> SelectorError {
    SelectorError::UnexpectedToken {
        token: format!("{token:?}"),
        offset,
    }
}

fn lookup(field: &str, message: &JmsMessage) -> Option<Literal> {
    match field {
        "JMSCorrelationID" => message.correlation_id.clone().map(Literal::Str),
        "JMSMessageID" => message.message_id.clone().map(Literal::Str),
        "JMSType" => message.jms_type.clone().map(Literal::Str),
        "JMSPriority" => Some(Literal::Int(i64::from(message.priority))),
        "JMSDeliveryMode" => Some(Literal::Str(message.delivery_mode.as_str().to_owned())),
        "JMSTimestamp" => message.timestamp.map(Literal::Int),
        _ => message.property(field).and_then(|value| match value {
            PropertyValue::String(s) => Some(Literal::Str(s.clone())),
            PropertyValue::Bool(b) => Some(Literal::Bool(*b)),
            PropertyValue::Int(n) => Some(Literal::Int(*n)),
            PropertyValue::Double(d) => Some(Literal::Float(*d)),
            PropertyValue::Char(c) => Some(Literal::Str(c.to_string())),
            PropertyValue::Bytes(_) => None,
        }),
    }
}

#[expect(clippy::cast_precision_loss, reason = "selector arithmetic is approximate")]
fn as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Int(value) => Some(*value as f64),
        Literal::Float(value) => Some(*value),
        _ => None,
    }
}

fn compare(left: &Literal, op: CompareOp, right: &Literal) -> Option<bool> {
    match (left, right) {
        (Literal::Str(a), Literal::Str(b)) => match op {
            CompareOp::Eq => Some(a == b),
            CompareOp::Ne => Some(a != b),
            _ => None,
        },
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            CompareOp::Eq => Some(a == b),
            CompareOp::Ne => Some(a != b),
            _ => None,
        },
        _ => {
            let (a, b) = (as_f64(left)?, as_f64(right)?);
            Some(match op {
                CompareOp::Eq => (a - b).abs() < f64::EPSILON,
                CompareOp::Ne => (a - b).abs() >= f64::EPSILON,
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
            })
        }
    }
}

fn eval(expr: &Expr, message: &JmsMessage) -> Option<bool> {
    match expr {
        Expr::Or(left, right) => match (eval(left, message), eval(right, message)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expr::And(left, right) => match (eval(left, message), eval(right, message)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expr::Not(inner) => eval(inner, message).map(|value| !value),
        Expr::Compare { field, op, value } => compare(&lookup(field, message)?, *op, value),
        Expr::In {
            field,
            values,
            negated,
        } => {
            let actual = lookup(field, message)?;
            let found = values
                .iter()
                .any(|candidate| compare(&actual, CompareOp::Eq, candidate) == Some(true));
            Some(found != *negated)
        }
        Expr::IsNull { field, negated } => Some(lookup(field, message).is_none() != *negated),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn message() -> JmsMessage {
        let mut message = JmsMessage::new("body");
        message.correlation_id = Some("abc".into());
        message.priority = 6;
        message.set_property("region", "eu");
        message.set_property("amount", 120_i64);
        message.set_property("vip", true);
        message
    }

    #[rstest]
    #[case("region = 'eu'", true)]
    #[case("region <> 'eu'", false)]
    #[case("amount > 100 AND vip = TRUE", true)]
    #[case("amount <= 100 OR region = 'eu'", true)]
    #[case("NOT (amount >= 120)", false)]
    #[case("JMSCorrelationID IN ('x', 'abc')", true)]
    #[case("JMSCorrelationID NOT IN ('x', 'abc')", false)]
    #[case("JMSPriority >= 5", true)]
    #[case("JMSDeliveryMode = 'PERSISTENT'", true)]
    #[case("missing IS NULL", true)]
    #[case("region IS NOT NULL", true)]
    #[case("missing = 'x'", false)]
    #[case("NOT missing = 'x'", false)]
    #[case("missing = 'x' OR vip = true", true)]
    #[case("amount = 120.0", true)]
    fn evaluates_expressions(#[case] source: &str, #[case] expected: bool) {
        let selector = Selector::parse(source).expect("valid selector");
        assert_eq!(selector.matches(&message()), expected, "{source}");
    }

    #[rstest]
    #[case("region = ")]
    #[case("region 'eu'")]
    #[case("(region = 'eu'")]
    #[case("region = 'eu")]
    #[case("region IN ()")]
    #[case("region = 'eu' extra")]
    fn rejects_malformed_expressions(#[case] source: &str) {
        assert!(Selector::parse(source).is_err(), "{source}");
    }

    #[test]
    fn string_in_escapes_quotes() {
        let selector = Selector::string_in("JMSCorrelationID", ["it's", "abc"]).expect("selector");
        assert_eq!(selector.source(), "JMSCorrelationID IN ('it''s', 'abc')");
        assert!(selector.matches(&message()));
    }

    #[test]
    fn string_in_rejects_empty_lists() {
        assert_eq!(
            Selector::string_in("JMSCorrelationID", Vec::<String>::new()),
            Err(SelectorError::UnexpectedEnd)
        );
    }
}
