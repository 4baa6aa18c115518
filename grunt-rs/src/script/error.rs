//! Errors that abort a running program.
//!
//! Soft failures (unknown mnemonic, missing optional handler) never become a
//! [`ScriptError`]; the interpreter records them as diagnostics and moves on.

use std::fmt;

use super::expr::EvalError;

/// What went wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Malformed construct: empty `IF` condition, bad `WHILE [..]`, missing
    /// `FOR` operands, invalid variable name, …
    Syntax(String),
    /// Expression evaluation failed.
    Eval(EvalError),
    /// `CALL` named a macro that was never defined.
    MacroNotFound(String),
    /// A block opener whose terminator was never reached.
    Unterminated {
        keyword: &'static str,
        terminator: &'static str,
    },
    /// A terminator with no matching opener.
    Unexpected(&'static str),
    /// Loop/macro re-entry went deeper than the configured limit.
    TooDeep(usize),
}

/// A fatal program error, tagged with the source line when known.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub line: Option<usize>,
    pub kind: ErrorKind,
}

impl ScriptError {
    pub fn new(kind: ErrorKind) -> Self {
        ScriptError { line: None, kind }
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax(msg.into()))
    }

    /// Attach a line number unless one is already set (innermost wins).
    pub fn at(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl From<EvalError> for ScriptError {
    fn from(e: EvalError) -> Self {
        ScriptError::new(ErrorKind::Eval(e))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax(msg) => write!(f, "syntax error: {msg}"),
            ErrorKind::Eval(e) => write!(f, "{e}"),
            ErrorKind::MacroNotFound(name) => write!(f, "macro {name} not found"),
            ErrorKind::Unterminated { keyword, terminator } => {
                write!(f, "{keyword} block is missing its {terminator}")
            }
            ErrorKind::Unexpected(kw) => write!(f, "{kw} without a matching opener"),
            ErrorKind::TooDeep(limit) => write!(f, "nesting deeper than {limit} levels"),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Eval(e) => Some(e),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
