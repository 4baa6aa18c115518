//! Expression evaluator.
//!
//! Expressions are re-read every time they run: rewrite, tokenize, convert to
//! postfix with the shunting-yard algorithm, then fold the postfix sequence on
//! a value stack.  Nothing is cached between evaluations.
//!
//! Operator precedence (lowest → highest), all left-associative:
//!   comparison (`< > <= >= == !=`)  →  additive (`+ -`)  →  multiplicative (`* /`)
//!
//! Two pseudo-functions are recognised when they open the expression:
//! `READ <pin>` and `RECV <timeout>`.  Both delegate to the [`EvalContext`].

use std::fmt;

use super::lexer::{rewrite, tokenize, Token};
use super::value::Value;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// The [`Interpreter`](super::interp::Interpreter) implements this trait to
/// give the evaluator access to the variable table and to the `READ` / `RECV`
/// handlers.
pub trait EvalContext {
    /// Look up a variable by canonical name (`var_1`).
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Read an input pin.
    fn read_pin(&mut self, pin: i64) -> f64;

    /// Wait up to `timeout` seconds for an incoming message.
    fn recv(&mut self, timeout: f64) -> Option<String>;
}

// ── EvalError ─────────────────────────────────────────────────────────────────

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Nothing to evaluate.
    Empty,
    /// An operator-character run that is not in the operator table.
    UnknownOperator(String),
    /// An identifier that is neither a variable nor a pseudo-function.
    UnknownToken(String),
    /// A `#` variable that has never been assigned.
    UndefinedVariable(String),
    UnbalancedParens,
    DivisionByZero,
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    /// A number was required (pin, timeout, loop bound) but text was found.
    NotANumber(String),
    /// An operator found fewer than two operands on the stack.
    MissingOperand(&'static str),
    /// Evaluation finished with other than exactly one value on the stack.
    Malformed { depth: usize },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Empty => write!(f, "empty expression"),
            EvalError::UnknownOperator(op) => write!(f, "unknown operator '{op}'"),
            EvalError::UnknownToken(tok) => write!(f, "unexpected token in expression: {tok}"),
            EvalError::UndefinedVariable(name) => write!(f, "undefined variable {name}"),
            EvalError::UnbalancedParens => write!(f, "unbalanced parentheses"),
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::TypeMismatch { op, lhs, rhs } => {
                write!(f, "cannot apply '{op}' to {lhs} and {rhs}")
            }
            EvalError::NotANumber(v) => write!(f, "expected a number, got '{v}'"),
            EvalError::MissingOperand(op) => {
                write!(f, "not enough operands for operator '{op}'")
            }
            EvalError::Malformed { depth } => {
                write!(f, "malformed expression ({depth} values left on stack)")
            }
        }
    }
}

impl std::error::Error for EvalError {}

// ── Operator table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn from_symbol(s: &str) -> Option<BinOp> {
        Some(match s {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div => 2,
            BinOp::Add | BinOp::Sub => 1,
            _ => 0,
        }
    }

    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
        let mismatch = || EvalError::TypeMismatch {
            op: self.symbol(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        };
        match self {
            BinOp::Add => lhs.add(rhs).ok_or_else(mismatch),
            BinOp::Sub | BinOp::Mul | BinOp::Div => {
                let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
                    return Err(mismatch());
                };
                Ok(Value::Number(match self {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    _ => {
                        if *b == 0.0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        a / b
                    }
                }))
            }
            _ => match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => Ok(self.compare(a, b).into()),
                (Value::Text(a), Value::Text(b)) => Ok(self.compare(a, b).into()),
                _ => match self {
                    BinOp::Eq => Ok(false.into()),
                    BinOp::Ne => Ok(true.into()),
                    _ => Err(mismatch()),
                },
            },
        }
    }

    fn compare<T: PartialOrd + ?Sized>(self, a: &T, b: &T) -> bool {
        match self {
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::Le => a <= b,
            BinOp::Ge => a >= b,
            BinOp::Eq => a == b,
            _ => a != b,
        }
    }
}

// ── Postfix conversion ────────────────────────────────────────────────────────

/// One element of a postfix (RPN) sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Rpn {
    Number(f64),
    Var(String),
    Op(BinOp),
}

enum Pending {
    Op(BinOp),
    LParen,
}

/// Shunting-yard conversion of an infix token list to postfix order.
pub fn to_postfix(tokens: &[Token]) -> Result<Vec<Rpn>, EvalError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Pending> = Vec::new();

    for tok in tokens {
        match tok {
            Token::Number(x) => output.push(Rpn::Number(*x)),
            Token::Ident(name) => output.push(Rpn::Var(name.clone())),
            Token::Op(sym) => {
                let op = BinOp::from_symbol(sym)
                    .ok_or_else(|| EvalError::UnknownOperator(sym.clone()))?;
                while let Some(Pending::Op(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Rpn::Op(*top));
                    stack.pop();
                }
                stack.push(Pending::Op(op));
            }
            Token::LParen => stack.push(Pending::LParen),
            Token::RParen => loop {
                match stack.pop() {
                    Some(Pending::Op(op)) => output.push(Rpn::Op(op)),
                    Some(Pending::LParen) => break,
                    None => return Err(EvalError::UnbalancedParens),
                }
            },
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op) => output.push(Rpn::Op(op)),
            Pending::LParen => return Err(EvalError::UnbalancedParens),
        }
    }
    Ok(output)
}

/// Fold a postfix sequence on a value stack.
pub fn eval_postfix(rpn: &[Rpn], ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    let mut stack: Vec<Value> = Vec::new();

    for item in rpn {
        match item {
            Rpn::Number(x) => stack.push(Value::Number(*x)),
            Rpn::Var(name) => match ctx.get_var(name) {
                Some(v) => stack.push(v),
                None => return Err(unresolved(name)),
            },
            Rpn::Op(op) => {
                let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                    return Err(EvalError::MissingOperand(op.symbol()));
                };
                stack.push(op.apply(&a, &b)?);
            }
        }
    }

    if stack.len() != 1 {
        return Err(EvalError::Malformed { depth: stack.len() });
    }
    Ok(stack.pop().unwrap_or_default())
}

fn unresolved(name: &str) -> EvalError {
    match name.strip_prefix("var_") {
        Some(src) => EvalError::UndefinedVariable(format!("#{src}")),
        None => EvalError::UnknownToken(name.to_owned()),
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Rewrite, tokenize and evaluate a source expression.
pub fn evaluate(expr: &str, ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    let rewritten = rewrite(expr);
    eval_tokens(&tokenize(&rewritten), ctx)
}

/// Evaluate an already rewritten token list, handling `READ` / `RECV`.
pub fn eval_tokens(tokens: &[Token], ctx: &mut dyn EvalContext) -> Result<Value, EvalError> {
    match tokens.first() {
        None => Err(EvalError::Empty),
        Some(Token::Ident(kw)) if kw == "READ" => {
            let pin = eval_number(&tokens[1..], ctx)?;
            Ok(Value::Number(ctx.read_pin(pin.trunc() as i64)))
        }
        Some(Token::Ident(kw)) if kw == "RECV" => {
            let timeout = eval_number(&tokens[1..], ctx)?;
            Ok(Value::Text(ctx.recv(timeout).unwrap_or_default()))
        }
        Some(_) => eval_postfix(&to_postfix(tokens)?, ctx),
    }
}

fn eval_number(tokens: &[Token], ctx: &mut dyn EvalContext) -> Result<f64, EvalError> {
    let v = eval_tokens(tokens, ctx)?;
    v.as_number().ok_or_else(|| EvalError::NotANumber(v.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
