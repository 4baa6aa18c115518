//! Bracket substitution.
//!
//! `[expr]` groups embedded in text are evaluated and replaced by their
//! result.  Used for message interpolation (`WRITE "x is [#x]"`), for macro
//! bodies at call time, and for pre-evaluating `CALL` arguments.
//!
//! Groups do not nest: each `[` is closed by the first `]` after it.

use std::sync::OnceLock;

use regex::Regex;

use super::expr::EvalError;
use super::value::Value;

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(.*?)\]").expect("bracket regex"))
}

/// Replace every `[inner]` group in `text` with `subst(inner)`.
///
/// Stops at the first failing substitution.
pub fn expand_brackets<F>(text: &str, mut subst: F) -> Result<String, EvalError>
where
    F: FnMut(&str) -> Result<String, EvalError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in bracket_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&subst(&caps[1])?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Integer rendering used for `CALL` arguments: numbers are truncated toward
/// zero, text is rejected.
pub fn int_string(v: &Value) -> Result<String, EvalError> {
    match v {
        Value::Number(x) => Ok((x.trunc() as i64).to_string()),
        Value::Text(s) => Err(EvalError::NotANumber(s.clone())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
