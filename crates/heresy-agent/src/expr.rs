//! Expression language used by `eval`
//!
//! A small JavaScript-flavoured expression language over JSON values:
//! literals, identifiers, member access, unary and binary operators and a
//! single top-level assignment. Identifiers resolve against the global
//! scope; assignment writes back into it.

use crate::error::EvalError;
use serde_json::{Map, Number, Value};

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal JSON value
    Literal(Value),
    /// Global identifier
    Ident(String),
    /// `object.key` or `object[key]`
    Member(Box<Expr>, Box<Expr>),
    /// Prefix operator
    Unary(UnaryOp, Box<Expr>),
    /// Infix operator
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `name = value`
    Assign(String, Box<Expr>),
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
}

/// Infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::LooseEq | Self::LooseNe | Self::StrictEq | Self::StrictNe => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }

    fn from_punct(p: &str) -> Option<Self> {
        let op = match p {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "==" => Self::LooseEq,
            "!=" => Self::LooseNe,
            "===" => Self::StrictEq,
            "!==" => Self::StrictNe,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "&&" => Self::And,
            "||" => Self::Or,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
    "=", "(", ")", "[", "]", ".", ";",
];

fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| EvalError::Syntax(format!("invalid number `{}`", text)))?;
            tokens.push(Token::Number(n));
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i).copied() {
                    None => return Err(EvalError::Syntax("unterminated string literal".into())),
                    Some(ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars
                            .get(i + 1)
                            .copied()
                            .ok_or_else(|| EvalError::Syntax("unterminated string literal".into()))?;
                        s.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => other,
                        });
                        i += 2;
                    }
                    Some(ch) => {
                        s.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(s));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let punct = PUNCTUATION
                .iter()
                .find(|p| rest.starts_with(**p))
                .ok_or_else(|| EvalError::Syntax(format!("unexpected character `{}`", c)))?;
            i += punct.chars().count();
            tokens.push(Token::Punct(*punct));
        }
    }

    // A single trailing semicolon is accepted and ignored.
    if tokens.last() == Some(&Token::Punct(";")) {
        tokens.pop();
    }
    Ok(tokens)
}

/// Deepest expression tree the parser will build
pub const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Nesting of the node currently being built
    depth: usize,
}

impl Parser {
    /// Count one more level of nesting
    ///
    /// Bounds the parser's own recursion and the depth of the tree, which
    /// `evaluate` and `Drop` both walk recursively.
    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::Range("expression too deeply nested".into()));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, punct: &'static str) -> Result<(), EvalError> {
        match self.next() {
            Some(Token::Punct(p)) if p == punct => Ok(()),
            Some(other) => Err(EvalError::Syntax(format!("expected `{}`, found {:?}", punct, other))),
            None => Err(EvalError::Syntax(format!("expected `{}`, found end of input", punct))),
        }
    }

    fn parse_assignment(&mut self) -> Result<Expr, EvalError> {
        let base = self.depth;
        let target = self.parse_binary(0)?;
        if self.peek() == Some(&Token::Punct("=")) {
            self.pos += 1;
            let name = match target {
                Expr::Ident(name) => name,
                _ => return Err(EvalError::Syntax("invalid assignment target".into())),
            };
            self.enter()?;
            let value = self.parse_assignment()?;
            self.depth = base;
            return Ok(Expr::Assign(name, Box::new(value)));
        }
        Ok(target)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, EvalError> {
        let base = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Punct(p)) => match BinaryOp::from_punct(p) {
                    Some(op) if op.precedence() > min_precedence => op,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            // Each node built here sits one level above the previous `lhs`.
            self.enter()?;
            let rhs = self.parse_binary(op.precedence())?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Some(Token::Punct("-")) => Some(UnaryOp::Neg),
            Some(Token::Punct("!")) => Some(UnaryOp::Not),
            Some(Token::Punct("+")) => None,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;

        let base = self.depth;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.depth = base;

        Ok(match op {
            Some(op) => Expr::Unary(op, Box::new(operand)),
            None => operand,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Punct(".")) => {
                    self.enter()?;
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => {
                            expr = Expr::Member(Box::new(expr), Box::new(Expr::Literal(Value::String(name))));
                        }
                        _ => return Err(EvalError::Syntax("expected property name after `.`".into())),
                    }
                }
                Some(Token::Punct("[")) => {
                    self.enter()?;
                    self.pos += 1;
                    let key = self.parse_assignment()?;
                    self.expect("]")?;
                    expr = Expr::Member(Box::new(expr), Box::new(key));
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number(n)?)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Some(Token::Punct("(")) => {
                let base = self.depth;
                self.enter()?;
                let inner = self.parse_assignment()?;
                self.expect(")")?;
                self.depth = base;
                Ok(inner)
            }
            Some(other) => Err(EvalError::Syntax(format!("unexpected token {:?}", other))),
            None => Err(EvalError::Syntax("unexpected end of input".into())),
        }
    }
}

/// Parse an expression
pub fn parse(source: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_assignment()?;
    if let Some(extra) = parser.peek() {
        return Err(EvalError::Syntax(format!("unexpected token {:?}", extra)));
    }
    Ok(expr)
}

/// Evaluate an expression against a set of global bindings
pub fn evaluate(expr: &Expr, globals: &mut Map<String, Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => globals
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Reference(name.clone())),
        Expr::Member(object, key) => {
            let object = evaluate(object, globals)?;
            let key = evaluate(key, globals)?;
            member(&object, &key)
        }
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, globals)?;
            match op {
                UnaryOp::Neg => number(-to_number(&value, "-")?),
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let left = evaluate(lhs, globals)?;
            if truthy(&left) {
                evaluate(rhs, globals)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let left = evaluate(lhs, globals)?;
            if truthy(&left) {
                Ok(left)
            } else {
                evaluate(rhs, globals)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let left = evaluate(lhs, globals)?;
            let right = evaluate(rhs, globals)?;
            binary(*op, &left, &right)
        }
        Expr::Assign(name, value) => {
            let value = evaluate(value, globals)?;
            globals.insert(name.clone(), value.clone());
            Ok(value)
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        _ => "",
    };
    match op {
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Ok(Value::String(format!("{}{}", display(left), display(right))))
        }
        BinaryOp::Add => number(to_number(left, symbol)? + to_number(right, symbol)?),
        BinaryOp::Sub => number(to_number(left, symbol)? - to_number(right, symbol)?),
        BinaryOp::Mul => number(to_number(left, symbol)? * to_number(right, symbol)?),
        BinaryOp::Div => number(to_number(left, symbol)? / to_number(right, symbol)?),
        BinaryOp::Rem => number(to_number(left, symbol)? % to_number(right, symbol)?),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(left, right))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(left, right))),
        BinaryOp::LooseEq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::LooseNe => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => to_number(left, "<")?.partial_cmp(&to_number(right, "<")?),
            };
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::And => Ok(if truthy(left) { right.clone() } else { left.clone() }),
        BinaryOp::Or => Ok(if truthy(left) { left.clone() } else { right.clone() }),
    }
}

fn member(object: &Value, key: &Value) -> Result<Value, EvalError> {
    match (object, key) {
        (Value::Null, _) => Err(EvalError::Type(format!(
            "cannot read properties of null (reading '{}')",
            display(key)
        ))),
        (Value::Object(map), key) => Ok(map.get(&display(key)).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Value::String(k)) if k == "length" => Ok(Value::from(items.len())),
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::String(k)) if k == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

/// Convert an `f64` to a JSON number, preferring integers
fn number(n: f64) -> Result<Value, EvalError> {
    if !n.is_finite() {
        return Err(EvalError::Range(format!("{} is not representable", n)));
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Range(format!("{} is not representable", n)))
}

fn to_number(value: &Value, op: &str) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EvalError::Type(format!("unsupported number {}", n))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvalError::Type(format!("cannot apply `{}` to string \"{}\"", op, s))),
        _ => Err(EvalError::Type(format!("cannot apply `{}` to {}", op, type_name(value)))),
    }
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
            strict_eq(left, right)
        }
        _ if left.is_string() && right.is_string() => left == right,
        _ => match (to_number(left, "=="), to_number(right, "==")) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
    }
}

/// JavaScript truthiness of a JSON value
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Best-effort string conversion, the way string concatenation renders values
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
