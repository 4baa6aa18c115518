//! Command argument parser.
//!
//! `G1 X10 Y[#v * 2] F200 Tfast` → `{F: 200.0, T: "fast", X: 10.0, Y: …}`.
//! The first character of each word is the key.  The rest is a bracketed
//! expression, a float, or (failing both) kept verbatim as text.  A repeated
//! key overwrites the earlier value.

use std::collections::BTreeMap;

use super::expr::{evaluate, EvalContext, EvalError};
use super::line::bracket_contents;
use super::value::Value;

/// Parsed command arguments, ordered by key.
pub type ArgMap = BTreeMap<char, Value>;

/// Parse argument words (the mnemonic already removed).
pub fn parse_args<S: AsRef<str>>(
    words: &[S],
    ctx: &mut dyn EvalContext,
) -> Result<ArgMap, EvalError> {
    let mut args = ArgMap::new();
    for word in words {
        let word = word.as_ref();
        let mut chars = word.chars();
        let Some(key) = chars.next() else { continue };
        let rest = chars.as_str();

        let value = match bracket_contents(rest) {
            Some(expr) => evaluate(expr, ctx)?,
            None => match rest.parse::<f64>() {
                Ok(x) => Value::Number(x),
                Err(_) => Value::Text(rest.to_owned()),
            },
        };
        args.insert(key, value);
    }
    Ok(args)
}

/// Render arguments as `X=10.0 Y=20.0`, in key order.
pub fn render_args(args: &ArgMap) -> String {
    args.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestCtx {
        vars: HashMap<String, Value>,
    }

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
        fn read_pin(&mut self, _pin: i64) -> f64 {
            0.0
        }
        fn recv(&mut self, _timeout: f64) -> Option<String> {
            None
        }
    }

    fn parse(words: &[&str]) -> ArgMap {
        parse_args(words, &mut TestCtx::default()).expect("parse failed")
    }

    #[test]
    fn numeric_arguments() {
        let args = parse(&["X10", "Y20", "F100"]);
        assert_eq!(args.get(&'X'), Some(&Value::Number(10.0)));
        assert_eq!(args.get(&'Y'), Some(&Value::Number(20.0)));
        assert_eq!(args.get(&'F'), Some(&Value::Number(100.0)));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn signed_and_fractional() {
        let args = parse(&["X-1.5", "Z+2"]);
        assert_eq!(args.get(&'X'), Some(&Value::Number(-1.5)));
        assert_eq!(args.get(&'Z'), Some(&Value::Number(2.0)));
    }

    #[test]
    fn bracketed_expression() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("var_v".into(), Value::Number(4.0));
        let args = parse_args(&["Y[#v * 2]"], &mut ctx).unwrap();
        assert_eq!(args.get(&'Y'), Some(&Value::Number(8.0)));
    }

    #[test]
    fn non_numeric_kept_as_text() {
        let args = parse(&["F+", "Tfast", "S"]);
        assert_eq!(args.get(&'F'), Some(&Value::from("+")));
        assert_eq!(args.get(&'T'), Some(&Value::from("fast")));
        assert_eq!(args.get(&'S'), Some(&Value::from("")));
    }

    #[test]
    fn last_duplicate_wins() {
        let args = parse(&["X1", "X2"]);
        assert_eq!(args.get(&'X'), Some(&Value::Number(2.0)));
    }

    #[test]
    fn evaluation_errors_propagate() {
        let err = parse_args(&["X[#missing]"], &mut TestCtx::default()).unwrap_err();
        assert_eq!(err, EvalError::UndefinedVariable("#missing".into()));
    }

    #[test]
    fn render_in_key_order() {
        let args = parse(&["Y20", "X10", "Tfast"]);
        assert_eq!(render_args(&args), "T=fast X=10.0 Y=20.0");
    }
}
