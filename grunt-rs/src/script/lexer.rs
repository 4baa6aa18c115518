//! Expression lexer and symbol rewriter.
//!
//! Source expressions name variables with a `#` sigil (`#1`, `#speed`) and
//! may spell comparisons as mnemonics (`#1 LT #2`).  [`rewrite`] turns both
//! into the tokenizer's alphabet (`var_1 < var_2`) before [`tokenize`] runs;
//! the tokenizer itself knows nothing about `#`.

use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    /// A run of operator characters (`+`, `<=`, `!=`, …).  Whether it names a
    /// real operator is decided by the evaluator.
    Op(String),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(x) => write!(f, "{x}"),
            Token::Ident(s) | Token::Op(s) => write!(f, "{s}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

// ── Regexes ───────────────────────────────────────────────────────────────────

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+\.?\d*|[+\-*/<>=!]+|[()]|[A-Za-z_]\w*").expect("token regex")
    })
}

fn numbered_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\d+)").expect("numbered var regex"))
}

fn named_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z_]\w*)").expect("named var regex"))
}

fn mnemonic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(LT|GT|LE|GE|EQ|NE)\b").expect("mnemonic regex"))
}

fn var_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#(\d+|[A-Za-z_]\w*)$").expect("var name regex"))
}

// ── Rewriter ──────────────────────────────────────────────────────────────────

/// Canonicalise `#` variable references and comparison mnemonics.
///
/// Applying it twice is harmless only because the output contains neither
/// `#` nor the mnemonics; callers still rewrite each expression exactly once.
pub fn rewrite(expr: &str) -> String {
    let s = numbered_var_re().replace_all(expr, "var_${1}");
    let s = named_var_re().replace_all(&s, "var_${1}");
    mnemonic_re()
        .replace_all(&s, |caps: &Captures| {
            match &caps[1] {
                "LT" => "<",
                "GT" => ">",
                "LE" => "<=",
                "GE" => ">=",
                "EQ" => "==",
                _ => "!=",
            }
            .to_owned()
        })
        .into_owned()
}

/// Canonical table key for a source variable reference (`#x` → `var_x`).
///
/// Returns `None` unless `src` is exactly one `#`-prefixed name.
pub fn canonical_name(src: &str) -> Option<String> {
    let caps = var_name_re().captures(src.trim())?;
    Some(format!("var_{}", &caps[1]))
}

// ── Tokenizer ─────────────────────────────────────────────────────────────────

/// Split an already rewritten expression into tokens.
///
/// Whitespace separates tokens.  Characters that fit no token class
/// (`[`, `]`, `"`, `$`, `,`, …) are dropped without complaint, which is what
/// lets `[#a + 1]` evaluate the same as `#a + 1`.
pub fn tokenize(expr: &str) -> Vec<Token> {
    token_re()
        .find_iter(expr)
        .map(|m| {
            let s = m.as_str();
            let first = s.as_bytes()[0];
            match first {
                // `\d` also matches non-ASCII digits, which `f64` rejects.
                b'0'..=b'9' => match s.parse() {
                    Ok(x) => Token::Number(x),
                    Err(_) => Token::Op(s.to_owned()),
                },
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => Token::Ident(s.to_owned()),
                _ => Token::Op(s.to_owned()),
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
