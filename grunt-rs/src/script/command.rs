//! Command dispatcher: every line that is not a block keyword.
//!
//! Forms, tried in order:
//!
//! - `G<n>` / `M<n>` followed by argument words → registered command handler
//! - `WRITE <pin> <value>` → `WRITEPIN` handler
//! - `WRITE <message>` → `WRITEMSG` handler, with `[expr]` interpolation
//! - `#var = <expr>` → assignment
//!
//! Anything else is ignored.

use super::{
    error::ScriptError,
    expand::expand_brackets,
    expr::{self, EvalError},
    handler::Pin,
    interp::Interpreter,
    lexer::canonical_name,
    line::{first_word, split_first, split_words},
    value::Value,
};

impl Interpreter {
    pub(super) fn exec_command(&mut self, line: &str) -> Result<(), ScriptError> {
        let word = first_word(line);
        if word.starts_with('G') || word.starts_with('M') {
            self.exec_mnemonic(line)
        } else if word == "WRITE" {
            self.exec_write(line)
        } else if line.contains('=') {
            self.exec_assignment(line)
        } else {
            log::debug!("ignoring line: {line}");
            Ok(())
        }
    }

    fn exec_mnemonic(&mut self, line: &str) -> Result<(), ScriptError> {
        let words = split_words(line);
        let Some((mnemonic, rest)) = words.split_first() else {
            return Ok(());
        };
        let args = self.parse_args(rest)?;
        log::debug!("{mnemonic} {args:?}");
        if !self.handlers.command(mnemonic, &args) {
            self.warn(format!("unknown command {mnemonic}"));
        }
        Ok(())
    }

    fn exec_write(&mut self, line: &str) -> Result<(), ScriptError> {
        let (_, rest) = split_first(line);
        if rest.is_empty() {
            return Err(ScriptError::syntax("WRITE needs a pin and value or a message"));
        }

        let words = split_words(rest);
        if let [pin, value] = words.as_slice() {
            if is_digits(pin) || is_bracketed(pin) {
                return self.exec_write_pin(pin, value);
            }
        }

        let msg = strip_quotes(rest);
        let msg = expand_brackets(msg, |inner| Ok(expr::evaluate(inner, &mut *self)?.to_string()))?;
        log::debug!("WRITEMSG {msg}");
        if !self.handlers.write_msg(&msg) {
            self.warn(format!("no WRITEMSG handler registered; dropped message '{msg}'"));
        }
        Ok(())
    }

    fn exec_write_pin(&mut self, pin: &str, value: &str) -> Result<(), ScriptError> {
        let pin = if is_digits(pin) {
            Pin::Number(pin.parse().map_err(|_| EvalError::NotANumber(pin.to_owned()))?)
        } else {
            match self.evaluate(pin)? {
                Value::Number(x) => Pin::Number(x.trunc() as i64),
                Value::Text(s) => Pin::Name(s),
            }
        };

        let value = if is_bracketed(value) {
            match self.evaluate(value)? {
                Value::Number(x) => x,
                Value::Text(s) => return Err(EvalError::NotANumber(s).into()),
            }
        } else {
            value
                .parse::<f64>()
                .map_err(|_| EvalError::NotANumber(value.to_owned()))?
        };

        log::debug!("WRITEPIN {pin} {value}");
        if !self.handlers.write_pin(&pin, value) {
            self.warn(format!("no WRITEPIN handler registered; pin {pin} not written"));
        }
        Ok(())
    }

    fn exec_assignment(&mut self, line: &str) -> Result<(), ScriptError> {
        let Some((lhs, rhs)) = line.split_once('=') else {
            return Ok(());
        };
        let Some(at) = lhs.find('#') else {
            self.warn(format!("assignment to a non-variable ignored: {line}"));
            return Ok(());
        };
        let target = lhs[at..].trim();
        let name = canonical_name(target)
            .ok_or_else(|| ScriptError::syntax(format!("invalid variable name '{target}'")))?;
        let value = self.evaluate(rhs.trim())?;
        self.vars.set(name, value);
        Ok(())
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_bracketed(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('[') && s.ends_with(']')
}

/// Remove one pair of surrounding double quotes.
fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(s)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
