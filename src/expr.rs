//! Hand-rolled expression evaluator for trigger `when`/`once_per` strings.
//!
//! The grammar is deliberately small: dotted-path field access into
//! `payload`/`labels`/`annotations`, literals, comparison and boolean
//! operators, and a handful of builtins (`contains`, `has`, `matches`). This
//! plays the same role `monitor::matcher`'s per-variant match functions play
//! upstream, just generalized into a tiny grammar instead of a closed Rust
//! enum, since trigger predicates are author-supplied config rather than
//! code.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::value::Value;

/// Read-only view a trigger expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub payload: &'a Value,
    pub labels: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownFunction(String),
    WrongArity { function: String, expected: usize, got: usize },
    TypeError(String),
    InvalidRegex(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedToken(t) => write!(f, "unexpected token `{t}`"),
            Self::UnknownFunction(name) => write!(f, "unknown function `{name}`"),
            Self::WrongArity { function, expected, got } => {
                write!(f, "`{function}` expects {expected} argument(s), got {got}")
            }
            Self::TypeError(msg) => write!(f, "type error: {msg}"),
            Self::InvalidRegex(pattern) => write!(f, "invalid regex: {pattern}"),
        }
    }
}

impl std::error::Error for ExprError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Number(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ExprError::UnexpectedEnd);
                }
                i += 1;
                tokens.push(Token::String(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: &Token) -> Result<(), ExprError> {
        match self.advance() {
            Some(ref t) if t == want => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken(format!("{t:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(left) };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance().ok_or(ExprError::UnexpectedEnd)? {
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Number(n) => {
                if n.fract() == 0.0 {
                    Ok(Expr::Literal(Value::Int(n as i64)))
                } else {
                    Ok(Expr::Literal(Value::Float(n)))
                }
            }
            Token::String(s) => Ok(Expr::Literal(Value::String(s))),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            if matches!(self.peek(), Some(Token::Comma)) {
                                self.advance();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Path(name))
                }
            }
            other => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::UnexpectedToken(format!("{:?}", parser.tokens[parser.pos])));
    }
    Ok(expr)
}

fn resolve_path<'a>(path: &str, ctx: &EvalContext<'a>) -> Value {
    if let Some(rest) = path.strip_prefix("payload.") {
        return ctx.payload.get_path(rest).cloned().unwrap_or(Value::Null);
    }
    if path == "payload" {
        return ctx.payload.clone();
    }
    if let Some(rest) = path.strip_prefix("labels.") {
        return ctx.labels.get(rest).cloned().map(Value::String).unwrap_or(Value::Null);
    }
    if let Some(rest) = path.strip_prefix("annotations.") {
        return ctx
            .annotations
            .get(rest)
            .cloned()
            .map(Value::String)
            .unwrap_or(Value::Null);
    }
    Value::Null
}

fn as_bool(v: &Value, ctx_desc: &str) -> Result<bool, ExprError> {
    v.as_bool()
        .ok_or_else(|| ExprError::TypeError(format!("expected bool in {ctx_desc}, got {}", v.type_name())))
}

fn numeric(v: &Value) -> Option<f64> {
    v.as_float()
}

fn eval_expr(expr: &Expr, ctx: &EvalContext) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => Ok(resolve_path(path, ctx)),
        Expr::Not(inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(Value::Bool(!as_bool(&v, "`not`")?))
        }
        Expr::And(l, r) => {
            let lv = as_bool(&eval_expr(l, ctx)?, "`&&` left operand")?;
            if !lv {
                return Ok(Value::Bool(false));
            }
            let rv = as_bool(&eval_expr(r, ctx)?, "`&&` right operand")?;
            Ok(Value::Bool(rv))
        }
        Expr::Or(l, r) => {
            let lv = as_bool(&eval_expr(l, ctx)?, "`||` left operand")?;
            if lv {
                return Ok(Value::Bool(true));
            }
            let rv = as_bool(&eval_expr(r, ctx)?, "`||` right operand")?;
            Ok(Value::Bool(rv))
        }
        Expr::Cmp(op, l, r) => {
            let lv = eval_expr(l, ctx)?;
            let rv = eval_expr(r, ctx)?;
            eval_cmp(op, &lv, &rv)
        }
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_cmp(op: &CmpOp, lv: &Value, rv: &Value) -> Result<Value, ExprError> {
    let result = match op {
        CmpOp::Eq => values_equal(lv, rv),
        CmpOp::Ne => !values_equal(lv, rv),
        _ => {
            let (a, b) = match (numeric(lv), numeric(rv)) {
                (Some(a), Some(b)) => (a, b),
                _ => match (lv.as_str(), rv.as_str()) {
                    (Some(a), Some(b)) => {
                        return Ok(Value::Bool(match op {
                            CmpOp::Lt => a < b,
                            CmpOp::Le => a <= b,
                            CmpOp::Gt => a > b,
                            CmpOp::Ge => a >= b,
                            CmpOp::Eq | CmpOp::Ne => unreachable!(),
                        }));
                    }
                    _ => {
                        return Err(ExprError::TypeError(format!(
                            "cannot order {} and {}",
                            lv.type_name(),
                            rv.type_name()
                        )))
                    }
                },
            };
            match op {
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                CmpOp::Ge => a >= b,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, ExprError> {
    match name {
        "contains" => {
            let [haystack, needle] = require_args(name, args, 2)?;
            let h = eval_expr(haystack, ctx)?;
            let n = eval_expr(needle, ctx)?;
            let found = match &h {
                Value::List(items) => items.contains(&n),
                Value::String(s) => n.as_str().is_some_and(|needle| s.contains(needle)),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "has" => {
            let [target, key] = require_args(name, args, 2)?;
            let t = eval_expr(target, ctx)?;
            let k = eval_expr(key, ctx)?;
            let found = match (&t, k.as_str()) {
                (Value::Map(m), Some(key)) => m.contains_key(key),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "matches" => {
            let [subject, pattern] = require_args(name, args, 2)?;
            let s = eval_expr(subject, ctx)?;
            let p = eval_expr(pattern, ctx)?;
            let (Some(text), Some(pattern)) = (s.as_str(), p.as_str()) else {
                return Ok(Value::Bool(false));
            };
            let re = Regex::new(pattern).map_err(|_| ExprError::InvalidRegex(pattern.to_string()))?;
            Ok(Value::Bool(re.is_match(text)))
        }
        other => Err(ExprError::UnknownFunction(other.to_string())),
    }
}

fn require_args<'a, const N: usize>(name: &str, args: &'a [Expr], expected: usize) -> Result<[&'a Expr; N], ExprError> {
    if args.len() != expected {
        return Err(ExprError::WrongArity {
            function: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(std::array::from_fn(|i| &args[i]))
}

/// Parses and evaluates `source`, returning the raw result value.
pub fn eval(source: &str, ctx: &EvalContext) -> Result<Value, ExprError> {
    let expr = parse(source)?;
    eval_expr(&expr, ctx)
}

/// Convenience wrapper for `when`/`once_per` predicate strings, which must
/// resolve to a boolean.
pub fn eval_bool(source: &str, ctx: &EvalContext) -> Result<bool, ExprError> {
    let v = eval(source, ctx)?;
    as_bool(&v, &format!("expression `{source}`"))
}
