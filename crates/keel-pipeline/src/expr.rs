//! Boolean expression evaluation for `eval` rulesets.
//!
//! Expressions are evaluated against a container's environment. The engine is
//! hidden behind the [`Evaluator`] trait so callers can swap it out; the
//! built-in [`ExprEvaluator`] understands a small expression language:
//!
//! - **Identifiers** resolve to environment values; undefined names are `nil`.
//! - **Literals**: `"str"`, `'str'`, integers, `true`, `false`, `nil`, `[a, b]`.
//! - **Comparison**: `==`, `!=`, `<`, `<=`, `>`, `>=`.
//! - **Boolean**: `&&`/`and`, `||`/`or`, `!`/`not`, parentheses.
//! - **Membership and strings**: `in`, `not in`, `contains`, `startsWith`,
//!   `endsWith`, `matches` (regular expression).
//!
//! ```
//! use keel_pipeline::{Environment, Evaluator, ExprEvaluator};
//!
//! let mut env = Environment::new();
//! env.insert("DEPLOY_ENV".to_string(), "prod".to_string());
//!
//! let ok = ExprEvaluator
//!     .evaluate(r#"DEPLOY_ENV in ["prod", "staging"] && !(SKIP == "true")"#, &env)
//!     .unwrap();
//! assert!(ok);
//! ```

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::error::{PipelineError, Result};
use crate::rules::Environment;

/// Maximum accepted expression size in bytes.
const MAX_EXPR_BYTES: usize = 64 * 1024;
/// Maximum nesting depth for parenthesised and array expressions.
const MAX_EXPR_NESTING: usize = 32;

/// A boolean predicate engine for ruleset `eval` expressions.
pub trait Evaluator {
    /// Evaluate `expr` against `env`.
    ///
    /// Compile failures, runtime failures and non-boolean results are errors.
    fn evaluate(&self, expr: &str, env: &Environment) -> Result<bool>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Environment) -> Result<bool>,
{
    fn evaluate(&self, expr: &str, env: &Environment) -> Result<bool> {
        (self)(expr, env)
    }
}

/// The built-in expression engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &str, env: &Environment) -> Result<bool> {
        let wrap = |e: ExprError| PipelineError::Expression {
            expr: expr.to_string(),
            reason: e.to_string(),
        };

        let program = compile(expr).map_err(wrap)?;
        match program.eval(env).map_err(wrap)? {
            Value::Bool(b) => Ok(b),
            other => Err(wrap(ExprError::NotBoolean(other.type_name()))),
        }
    }
}

/// Failures raised while compiling or running an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum ExprError {
    #[error("expression is empty")]
    Empty,

    #[error("expression exceeds size limit: {actual} bytes (max {max})")]
    TooLarge { max: usize, actual: usize },

    #[error("expression nesting exceeds limit of {max} at {position}")]
    TooDeep { max: usize, position: usize },

    #[error("unexpected `{found}` at {position}, expected {expected}")]
    Unexpected {
        expected: &'static str,
        found: String,
        position: usize,
    },

    #[error("unterminated string starting at {0}")]
    UnterminatedString(usize),

    #[error("invalid integer `{0}`")]
    InvalidInteger(String),

    #[error("invalid operation: {op} between {left} and {right}")]
    Operands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("invalid regular expression {0}")]
    Regex(String),

    #[error("expected bool result, got {0}")]
    NotBoolean(&'static str),
}

type ExprResult<T> = std::result::Result<T, ExprError>;

// ── Values ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
        }
    }
}

// ── Lexer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Nil,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Matches,
    Contains,
    StartsWith,
    EndsWith,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Int(i) => write!(f, "{i}"),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn lex(input: &str) -> ExprResult<Vec<Spanned>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let start = offset;
        let ch = bytes[offset];
        let next = bytes.get(offset + 1).copied();

        let (token, width) = match ch {
            b' ' | b'\t' | b'\n' | b'\r' => {
                offset += 1;
                continue;
            }
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b'[' => (Token::LBracket, 1),
            b']' => (Token::RBracket, 1),
            b',' => (Token::Comma, 1),
            b'&' if next == Some(b'&') => (Token::And, 2),
            b'|' if next == Some(b'|') => (Token::Or, 2),
            b'=' if next == Some(b'=') => (Token::Eq, 2),
            b'!' if next == Some(b'=') => (Token::Ne, 2),
            b'!' => (Token::Not, 1),
            b'<' if next == Some(b'=') => (Token::Le, 2),
            b'<' => (Token::Lt, 1),
            b'>' if next == Some(b'=') => (Token::Ge, 2),
            b'>' => (Token::Gt, 1),
            b'"' | b'\'' => {
                let (value, end) = lex_string(input, start, ch)?;
                tokens.push(Spanned {
                    token: Token::Str(value),
                    position: start,
                });
                offset = end;
                continue;
            }
            b'0'..=b'9' => {
                let end = scan(bytes, start, |b| b.is_ascii_digit());
                let raw = &input[start..end];
                let value = raw
                    .parse::<i64>()
                    .map_err(|_| ExprError::InvalidInteger(raw.to_string()))?;
                (Token::Int(value), end - start)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let end = scan(bytes, start, |b| b.is_ascii_alphanumeric() || b == b'_');
                (keyword_or_ident(&input[start..end]), end - start)
            }
            _ => {
                let found = input[start..].chars().next().map(String::from).unwrap_or_default();
                return Err(ExprError::Unexpected {
                    expected: "identifier, literal or operator",
                    found,
                    position: start,
                });
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
        offset += width;
    }

    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }

    tokens.push(Spanned {
        token: Token::Eof,
        position: bytes.len(),
    });
    Ok(tokens)
}

fn scan(bytes: &[u8], start: usize, accept: impl Fn(u8) -> bool) -> usize {
    let mut end = start;
    while end < bytes.len() && accept(bytes[end]) {
        end += 1;
    }
    end
}

/// Lex a quoted string, returning the unescaped value and the offset after
/// the closing quote.
fn lex_string(input: &str, start: usize, quote: u8) -> ExprResult<(String, usize)> {
    let mut value = String::new();
    let mut chars = input[start + 1..].char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            c if c as u32 == u32::from(quote) => return Ok((value, start + 1 + i + 1)),
            c => value.push(c),
        }
    }

    Err(ExprError::UnterminatedString(start))
}

fn keyword_or_ident(word: &str) -> Token {
    match word {
        "true" => Token::True,
        "false" => Token::False,
        "nil" => Token::Nil,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "matches" => Token::Matches,
        "contains" => Token::Contains,
        "startsWith" => Token::StartsWith,
        "endsWith" => Token::EndsWith,
        _ => Token::Ident(word.to_string()),
    }
}

// ── Parser ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Matches,
    Contains,
    StartsWith,
    EndsWith,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Matches => "matches",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

fn compile(input: &str) -> ExprResult<Expr> {
    if input.len() > MAX_EXPR_BYTES {
        return Err(ExprError::TooLarge {
            max: MAX_EXPR_BYTES,
            actual: input.len(),
        });
    }

    let mut parser = Parser {
        tokens: lex(input)?,
        index: 0,
        nesting: 0,
    };
    let expr = parser.parse_or()?;
    parser.expect(Token::Eof, "end of input")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // The token stream always ends with Eof and the parser never advances past it.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_token(&self) -> &Token {
        &self.peek().token
    }

    fn advance(&mut self) -> Spanned {
        let current = self.peek().clone();
        if current.token != Token::Eof {
            self.index += 1;
        }
        current
    }

    fn next_is(&self, token: &Token) -> bool {
        self.tokens.get(self.index + 1).map(|t| &t.token) == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek_token() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> ExprResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ExprError {
        let current = self.peek();
        ExprError::Unexpected {
            expected,
            found: current.token.to_string(),
            position: current.position,
        }
    }

    fn enter(&mut self) -> ExprResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_EXPR_NESTING {
            return Err(ExprError::TooDeep {
                max: MAX_EXPR_NESTING,
                position: self.peek().position,
            });
        }
        Ok(())
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat(&Token::And) {
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let left = self.parse_unary()?;

        let op = match self.peek_token() {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::In => BinaryOp::In,
            Token::Matches => BinaryOp::Matches,
            Token::Contains => BinaryOp::Contains,
            Token::StartsWith => BinaryOp::StartsWith,
            Token::EndsWith => BinaryOp::EndsWith,
            Token::Not if self.next_is(&Token::In) => BinaryOp::NotIn,
            _ => return Ok(left),
        };
        if op == BinaryOp::NotIn {
            self.advance();
        }
        self.advance();

        let right = self.parse_unary()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.nesting -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let current = self.advance();
        match current.token {
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Nil)),
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "`)`")?;
                self.nesting -= 1;
                Ok(inner)
            }
            Token::LBracket => {
                self.enter()?;
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RBracket, "`,` or `]`")?;
                        break;
                    }
                }
                self.nesting -= 1;
                Ok(Expr::Array(items))
            }
            other => Err(ExprError::Unexpected {
                expected: "identifier, literal or `(`",
                found: other.to_string(),
                position: current.position,
            }),
        }
    }
}

// ── Evaluation ──────────────────────────────────────────────────────────

impl Expr {
    fn eval(&self, env: &Environment) -> ExprResult<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => Ok(env.get(name).cloned().map(Value::Str).unwrap_or(Value::Nil)),
            Expr::Array(items) => items
                .iter()
                .map(|item| item.eval(env))
                .collect::<ExprResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Not(inner) => match inner.eval(env)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(ExprError::Operands {
                    op: "!",
                    left: "bool",
                    right: other.type_name(),
                }),
            },
            Expr::And(left, right) => {
                if !expect_bool("&&", left.eval(env)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool("&&", right.eval(env)?)?))
            }
            Expr::Or(left, right) => {
                if expect_bool("||", left.eval(env)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool("||", right.eval(env)?)?))
            }
            Expr::Binary(op, left, right) => {
                let left = left.eval(env)?;
                let right = right.eval(env)?;
                binary(*op, &left, &right).map(Value::Bool)
            }
        }
    }
}

fn expect_bool(op: &'static str, value: Value) -> ExprResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::Operands {
            op,
            left: "bool",
            right: other.type_name(),
        }),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> ExprResult<bool> {
    let mismatch = || ExprError::Operands {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };

    match op {
        BinaryOp::Eq => Ok(left == right),
        BinaryOp::Ne => Ok(left != right),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(mismatch()),
            };
            Ok(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        BinaryOp::In | BinaryOp::NotIn => {
            let found = match right {
                Value::Array(items) => items.contains(left),
                Value::Nil => false,
                _ => return Err(mismatch()),
            };
            Ok(found == (op == BinaryOp::In))
        }
        BinaryOp::Matches => match (left, right) {
            (Value::Str(s), Value::Str(pattern)) => {
                let re = Regex::new(pattern).map_err(|e| ExprError::Regex(e.to_string()))?;
                Ok(re.is_match(s))
            }
            _ => Err(mismatch()),
        },
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => match (left, right) {
            (Value::Str(s), Value::Str(needle)) => Ok(match op {
                BinaryOp::Contains => s.contains(needle.as_str()),
                BinaryOp::StartsWith => s.starts_with(needle.as_str()),
                _ => s.ends_with(needle.as_str()),
            }),
            (Value::Nil, Value::Str(_)) => Ok(false),
            _ => Err(mismatch()),
        },
    }
}
