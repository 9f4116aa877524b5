//! Arithmetic evaluator for `coefSI` unit conversions.
//!
//! A conversion such as `/100` or `*1e-3` is the tail of an expression whose
//! left operand is the raw field value. The text is tokenized and parsed into
//! a small tree over numeric literals, `+ - * /`, `**` (or `^`) and
//! parentheses, then evaluated with the raw value substituted in.
//!
//! ## Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('**' unary)?
//! primary := NUMBER | VALUE | '(' expr ')'
//! ```
//!
//! `VALUE` is never written by the caller; it is the implicit first token.

use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use thiserror::Error;

/// Deepest nesting of parentheses, signs and exponents accepted.
pub const MAX_DEPTH: usize = 64;

/// Longest conversion accepted, in tokens. Bounds the tree evaluated per value.
pub const MAX_TOKENS: usize = 256;

/// Errors raised while parsing or evaluating a conversion expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression nests deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    #[error("expression is longer than {} tokens", MAX_TOKENS)]
    TooLong,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Value,
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Value => write!(f, "<value>"),
            Token::Number(n) => write!(f, "'{n}'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Pow => write!(f, "'**'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Value,
    Number(f64),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, value: f64) -> Result<f64, ExprError> {
        match self {
            Expr::Value => Ok(value),
            Expr::Number(n) => Ok(*n),
            Expr::Neg(inner) => Ok(-inner.eval(value)?),
            Expr::Binary(op, lhs, rhs) => {
                let (lhs, rhs) = (lhs.eval(value)?, rhs.eval(value)?);
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(ExprError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
        }
    }
}

/// A parsed `coefSI` conversion, applied to one raw value at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefExpr {
    source: String,
    expr: Expr,
}

impl CoefExpr {
    /// Parse the conversion text, e.g. `"/100"`.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut tokens = vec![Token::Value];
        tokens.extend(tokenize(source)?);
        if tokens.len() > MAX_TOKENS {
            return Err(ExprError::TooLong);
        }
        let mut parser = Parser {
            tokens: tokens.into_iter().peekable(),
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.tokens.next() {
            return Err(ExprError::UnexpectedToken(token.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The conversion text as given in the rule.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the conversion with `value` as the left operand.
    pub fn apply(&self, value: f64) -> Result<f64, ExprError> {
        let result = self.expr.eval(value)?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(ExprError::NotFinite)
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else if (c == 'e' || c == 'E') && !literal.contains(['e', 'E']) {
                        literal.push(c);
                        chars.next();
                        if let Some(&(_, sign @ ('+' | '-'))) = chars.peek() {
                            literal.push(sign);
                            chars.next();
                        }
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(number));
            }
            '*' => {
                chars.next();
                if let Some((_, '*')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Pow);
                } else {
                    tokens.push(Token::Star);
                }
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '/' => Token::Slash,
                    '^' => Token::Pow,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    other => return Err(ExprError::UnexpectedChar(other, offset)),
                };
                chars.next();
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    depth: usize,
}

impl Parser {
    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.tokens.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.tokens.next();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.tokens.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.tokens.next();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
    }

    // Every nested construct re-enters through here.
    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.depth == MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> Result<Expr, ExprError> {
        match self.tokens.peek() {
            Some(Token::Minus) => {
                self.tokens.next();
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.tokens.next();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if let Some(Token::Pow) = self.tokens.peek() {
            self.tokens.next();
            // right-associative: 2 ** 3 ** 2 == 2 ** 9
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.tokens.next() {
            Some(Token::Value) => Ok(Expr::Value),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.tokens.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, value: f64) -> f64 {
        CoefExpr::parse(source).unwrap().apply(value).unwrap()
    }

    #[test]
    fn simple_conversions() {
        assert_eq!(eval("/100", 30.0), 0.3);
        assert_eq!(eval("*1e-3", 2500.0), 2.5);
        assert_eq!(eval("+273.15", 0.0), 273.15);
        assert_eq!(eval("-5", 10.0), 5.0);
        assert_eq!(eval("**2", 3.0), 9.0);
        assert_eq!(eval("^2", 4.0), 16.0);
        assert_eq!(eval("", 7.0), 7.0);
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("+2*3", 1.0), 7.0);
        assert_eq!(eval("/(10*10)", 50.0), 0.5);
        assert_eq!(eval(" / 4 / 2 ", 16.0), 2.0);
        assert_eq!(eval("*-1", 3.0), -3.0);
        assert_eq!(eval("**3**0.5", 2.0), 2f64.powf(3f64.powf(0.5)));
        assert_eq!(eval("*2**-1", 8.0), 4.0);
    }

    #[test]
    fn rejects_anything_but_arithmetic() {
        assert_eq!(
            CoefExpr::parse("/100; import os"),
            Err(ExprError::UnexpectedChar(';', 4))
        );
        assert!(matches!(
            CoefExpr::parse("__class__"),
            Err(ExprError::UnexpectedChar('_', 0))
        ));
        assert_eq!(CoefExpr::parse("/"), Err(ExprError::UnexpectedEnd));
        assert!(matches!(
            CoefExpr::parse("100"),
            Err(ExprError::UnexpectedToken(_))
        ));
        assert!(matches!(
            CoefExpr::parse("*1.2.3"),
            Err(ExprError::InvalidNumber(_))
        ));
        assert_eq!(CoefExpr::parse("*(2+1"), Err(ExprError::UnexpectedEnd));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nested = format!("/{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(CoefExpr::parse(&nested), Err(ExprError::TooLong));

        let nested = format!("/{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(CoefExpr::parse(&nested), Err(ExprError::TooDeep));

        let signs = format!("*{}1", "-".repeat(200));
        assert_eq!(CoefExpr::parse(&signs), Err(ExprError::TooDeep));

        let powers = format!("{}2", "**2".repeat(80));
        assert_eq!(CoefExpr::parse(&powers), Err(ExprError::TooDeep));

        let signs = format!("*{}1", "-".repeat(200_000));
        assert_eq!(CoefExpr::parse(&signs), Err(ExprError::TooLong));
    }

    #[test]
    fn nesting_within_limits_parses() {
        let nested = format!("/{}4{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(eval(&nested, 8.0), 2.0);
        assert_eq!(eval(&format!("*{}1", "-".repeat(10)), 3.0), 3.0);
    }

    #[test]
    fn long_flat_chains_are_bounded() {
        let chain = "+1".repeat(100);
        assert_eq!(eval(&chain, 0.0), 100.0);
        assert_eq!(
            CoefExpr::parse(&"+1".repeat(200)),
            Err(ExprError::TooLong)
        );
    }

    #[test]
    fn evaluation_errors() {
        let expr = CoefExpr::parse("/0").unwrap();
        assert_eq!(expr.apply(1.0), Err(ExprError::DivisionByZero));

        let expr = CoefExpr::parse("**1000").unwrap();
        assert_eq!(expr.apply(10.0), Err(ExprError::NotFinite));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let expr = CoefExpr::parse("*0.1+0.2").unwrap();
        let first = expr.apply(3.0).unwrap();
        for _ in 0..10 {
            assert_eq!(expr.apply(3.0).unwrap().to_bits(), first.to_bits());
        }
        assert_eq!(expr.source(), "*0.1+0.2");
    }
}
