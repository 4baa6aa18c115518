//! Macro table and call-time expansion.
//!
//! A macro is stored exactly as written.  Each `CALL` produces a fresh copy:
//! `$1`, `$2`, … are replaced by the call's arguments, then every `[expr]`
//! group is evaluated against the variables as they are at that moment.
//! The result is ordinary program text and is run like any other block.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::expand::expand_brackets;
use super::expr::EvalError;
use super::line::SourceLine;
use super::value::Value;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+)").expect("placeholder regex"))
}

/// Name → unexpanded body.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, Vec<SourceLine>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a macro.
    pub fn define(&mut self, name: impl Into<String>, body: Vec<SourceLine>) {
        self.macros.insert(name.into(), body);
    }

    pub fn get(&self, name: &str) -> Option<&[SourceLine]> {
        self.macros.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Macro names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Replace `$k` with `args[k - 1]`.  Placeholders without a matching
/// argument (including `$0`) are left as they are.
pub fn substitute_params(line: &str, args: &[String]) -> String {
    placeholder_re()
        .replace_all(line, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|k| k.checked_sub(1))
                .and_then(|i| args.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Materialise a macro body for one call.
pub fn expand_macro<F>(
    body: &[SourceLine],
    args: &[String],
    mut eval: F,
) -> Result<Vec<SourceLine>, EvalError>
where
    F: FnMut(&str) -> Result<Value, EvalError>,
{
    body.iter()
        .map(|line| {
            let text = substitute_params(&line.text, args);
            let text = expand_brackets(&text, |inner| Ok(eval(inner)?.to_string()))?;
            Ok(SourceLine::new(line.lineno, text))
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_basics() {
        let mut t = MacroTable::new();
        assert!(t.is_empty());
        t.define("move", vec![SourceLine::new(2, "G1 X$1")]);
        t.define("home", vec![]);
        assert!(t.contains("move"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.names(), vec!["home", "move"]);
        assert_eq!(t.get("move").map(<[_]>::len), Some(1));
        assert!(t.get("nope").is_none());
    }

    #[test]
    fn redefine_replaces_body() {
        let mut t = MacroTable::new();
        t.define("m", vec![SourceLine::new(1, "a")]);
        t.define("m", vec![SourceLine::new(5, "b"), SourceLine::new(6, "c")]);
        assert_eq!(t.get("m").map(<[_]>::len), Some(2));
    }

    #[test]
    fn positional_substitution() {
        assert_eq!(substitute_params("G1 X$1 Y$2", &args(&["10", "20"])), "G1 X10 Y20");
    }

    #[test]
    fn missing_argument_left_literal() {
        assert_eq!(substitute_params("G1 X$1 Y$2", &args(&["10"])), "G1 X10 Y$2");
        assert_eq!(substitute_params("$0", &args(&["a"])), "$0");
    }

    #[test]
    fn multi_digit_placeholder() {
        let many: Vec<String> = (1..=10).map(|n| format!("a{n}")).collect();
        assert_eq!(substitute_params("$10 $1", &many), "a10 a1");
    }

    #[test]
    fn expansion_evaluates_brackets() {
        let body = vec![SourceLine::new(3, "G1 X[$1 * 2]"), SourceLine::new(4, "M2")];
        let out = expand_macro(&body, &args(&["4"]), |e| {
            assert_eq!(e, "4 * 2");
            Ok(Value::Number(8.0))
        })
        .unwrap();
        assert_eq!(out, vec![SourceLine::new(3, "G1 X8.0"), SourceLine::new(4, "M2")]);
    }

    #[test]
    fn expansion_error_propagates() {
        let body = vec![SourceLine::new(1, "G1 X[#nope]")];
        let err = expand_macro(&body, &[], |_| {
            Err(EvalError::UndefinedVariable("#nope".into()))
        })
        .unwrap_err();
        assert_eq!(err, EvalError::UndefinedVariable("#nope".into()));
    }
}
