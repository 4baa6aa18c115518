//! Block interpreter.
//!
//! The [`Interpreter`] owns the variable table, the macro table and the
//! handler registry, and walks program lines directly: there is no parse
//! tree.  Loop and macro bodies are captured as line slices and re-run on
//! every iteration or call, so each pass sees the current variable values.
//! It implements [`EvalContext`] so expressions can read variables, pins
//! and incoming messages through it.

use super::{
    args::{self, ArgMap},
    error::{ErrorKind, ScriptError},
    expand::{expand_brackets, int_string},
    expr::{self, EvalContext, EvalError},
    handler::Handlers,
    lexer::canonical_name,
    line::{load_program, split_first, split_words, Keyword, SourceLine},
    macros::{expand_macro, MacroTable},
    value::Value,
    var::VarTable,
};

/// Default bound on nested loop bodies and macro calls.
pub const DEFAULT_MAX_DEPTH: usize = 200;

// ── Interpreter ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Interpreter {
    pub(super) vars: VarTable,
    macros: MacroTable,
    pub(super) handlers: Handlers,
    /// Soft failures (unknown mnemonics, missing optional handlers, …) in the
    /// order they happened.  Never cleared by the interpreter itself.
    pub diagnostics: Vec<String>,
    max_depth: usize,
    depth: usize,
}

impl Interpreter {
    pub fn new(handlers: Handlers) -> Self {
        Interpreter {
            vars: VarTable::new(),
            macros: MacroTable::new(),
            handlers,
            diagnostics: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
        }
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    /// Drain and return the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Look up a variable by its source spelling (`#1`, `#speed`).
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(&canonical_name(name)?)
    }

    /// Assign a variable by its source spelling.
    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ScriptError> {
        let key = canonical_name(name)
            .ok_or_else(|| ScriptError::syntax(format!("invalid variable name '{name}'")))?;
        self.vars.set(key, value.into());
        Ok(())
    }

    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    // ── Macros ────────────────────────────────────────────────────────────────

    /// Define a macro from raw body lines (comments and blanks are dropped
    /// the same way as in a program).
    pub fn define_macro<I, S>(&mut self, name: impl Into<String>, body: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text: Vec<S> = body.into_iter().collect();
        let joined = text.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
        self.macros.define(name, load_program(&joined));
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Expand and run a macro with already evaluated positional arguments.
    pub fn call_macro(&mut self, name: &str, args: &[String]) -> Result<(), ScriptError> {
        let body = self
            .macros
            .get(name)
            .ok_or_else(|| ScriptError::new(ErrorKind::MacroNotFound(name.to_owned())))?
            .to_vec();
        log::debug!("CALL {name} {args:?}");
        let lines = expand_macro(&body, args, |e| expr::evaluate(e, &mut *self))?;
        self.nested(|this| this.run_lines(&lines))
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    /// Evaluate a source expression against the current variables.
    pub fn evaluate(&mut self, expr: &str) -> Result<Value, EvalError> {
        expr::evaluate(expr, self)
    }

    /// Parse command argument words (`X10`, `Y[#a]`, …).
    pub fn parse_args<S: AsRef<str>>(&mut self, words: &[S]) -> Result<ArgMap, EvalError> {
        args::parse_args(words, self)
    }

    fn condition(&mut self, expr: &str) -> Result<bool, ScriptError> {
        Ok(self.evaluate(expr)?.is_truthy())
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Run a complete program.
    pub fn run(&mut self, program: &str) -> Result<(), ScriptError> {
        let lines = load_program(program);
        log::debug!("running program ({} lines)", lines.len());
        self.run_lines(&lines)
    }

    /// Run a sequence of already loaded lines.
    pub fn run_lines(&mut self, lines: &[SourceLine]) -> Result<(), ScriptError> {
        let mut i = 0;
        while i < lines.len() {
            let lineno = lines[i].lineno;
            i = self.step(lines, i).map_err(|e| e.at(lineno))?;
        }
        Ok(())
    }

    /// Execute the construct starting at `lines[i]`; returns the index of the
    /// next line to run.
    fn step(&mut self, lines: &[SourceLine], i: usize) -> Result<usize, ScriptError> {
        let line = &lines[i];
        match line.keyword() {
            None => {
                self.exec_command(&line.text)?;
                Ok(i + 1)
            }
            Some(Keyword::Macro) => self.exec_macro_def(lines, i),
            Some(Keyword::If) => self.exec_if(lines, i),
            // End of a taken branch.
            Some(Keyword::ElseIf) | Some(Keyword::Else) => Ok(skip_to_endif(lines, i)? + 1),
            Some(Keyword::EndIf) => Ok(i + 1),
            Some(Keyword::For) => self.exec_for(lines, i),
            Some(Keyword::While) => self.exec_while(lines, i),
            Some(Keyword::Call) => {
                self.exec_call(&line.text)?;
                Ok(i + 1)
            }
            Some(kw @ (Keyword::EndFor | Keyword::EndWhile | Keyword::EndMacro)) => {
                Err(ScriptError::new(ErrorKind::Unexpected(kw.as_str())))
            }
        }
    }

    /// Run `f` one level deeper, failing once the depth bound is reached.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= self.max_depth {
            return Err(ScriptError::new(ErrorKind::TooDeep(self.max_depth)));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn exec_macro_def(&mut self, lines: &[SourceLine], i: usize) -> Result<usize, ScriptError> {
        let (_, rest) = split_first(&lines[i].text);
        let name = split_first(rest).0;
        if name.is_empty() {
            return Err(ScriptError::syntax("MACRO needs a name"));
        }
        let close = find_block_end(lines, i, Keyword::Macro)?;
        log::debug!("defined macro {name} ({} lines)", close - i - 1);
        self.macros.define(name, lines[i + 1..close].to_vec());
        Ok(close + 1)
    }

    fn exec_if(&mut self, lines: &[SourceLine], i: usize) -> Result<usize, ScriptError> {
        let cond = condition_text(&lines[i].text, "IF")?;
        if self.condition(cond)? {
            return Ok(i + 1);
        }

        // Find the branch to take: a true ELSEIF, an ELSE, or the ENDIF.
        let mut depth = 0usize;
        for (j, line) in lines.iter().enumerate().skip(i + 1) {
            match line.keyword() {
                Some(Keyword::If) => depth += 1,
                Some(Keyword::EndIf) if depth > 0 => depth -= 1,
                Some(Keyword::EndIf) | Some(Keyword::Else) if depth == 0 => return Ok(j + 1),
                Some(Keyword::ElseIf) if depth == 0 => {
                    let taken = condition_text(&line.text, "ELSEIF")
                        .and_then(|cond| self.condition(cond))
                        .map_err(|e| e.at(line.lineno))?;
                    if taken {
                        return Ok(j + 1);
                    }
                }
                _ => {}
            }
        }
        Err(unterminated(Keyword::If))
    }

    fn exec_for(&mut self, lines: &[SourceLine], i: usize) -> Result<usize, ScriptError> {
        let words = split_words(&lines[i].text);
        let [_, var, start, end, ..] = words.as_slice() else {
            return Err(ScriptError::syntax("FOR needs a variable, a start and an end"));
        };
        let name = canonical_name(var)
            .ok_or_else(|| ScriptError::syntax(format!("invalid loop variable '{var}'")))?;
        let start = self.loop_bound(start)?;
        let end = self.loop_bound(end)?;

        let close = find_block_end(lines, i, Keyword::For)?;
        let body = &lines[i + 1..close];
        for n in start..=end {
            self.vars.set(name.clone(), Value::Number(n as f64));
            self.nested(|this| this.run_lines(body))?;
        }
        Ok(close + 1)
    }

    fn loop_bound(&mut self, expr: &str) -> Result<i64, ScriptError> {
        match self.evaluate(expr)? {
            Value::Number(x) => Ok(x.trunc() as i64),
            Value::Text(s) => Err(EvalError::NotANumber(s).into()),
        }
    }

    fn exec_while(&mut self, lines: &[SourceLine], i: usize) -> Result<usize, ScriptError> {
        let cond = while_condition(&lines[i].text)?;
        let close = find_block_end(lines, i, Keyword::While)?;
        let body = &lines[i + 1..close];
        while self.condition(cond)? {
            self.nested(|this| this.run_lines(body))?;
        }
        Ok(close + 1)
    }

    fn exec_call(&mut self, text: &str) -> Result<(), ScriptError> {
        let (_, rest) = split_first(text);
        let (name, arg_text) = split_first(rest);
        if name.is_empty() {
            return Err(ScriptError::syntax("CALL needs a macro name"));
        }
        let arg_text =
            expand_brackets(arg_text, |inner| int_string(&expr::evaluate(inner, &mut *self)?))?;
        let args: Vec<String> = arg_text.split_whitespace().map(str::to_owned).collect();
        self.call_macro(name, &args)
    }

    /// Record a soft failure.
    pub(super) fn warn(&mut self, msg: String) {
        log::warn!("{msg}");
        self.diagnostics.push(msg);
    }
}

impl EvalContext for Interpreter {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn read_pin(&mut self, pin: i64) -> f64 {
        self.handlers.read(pin).unwrap_or_else(|| {
            log::debug!("READ {pin}: no handler registered, using 0");
            0.0
        })
    }

    fn recv(&mut self, timeout: f64) -> Option<String> {
        self.handlers.recv(timeout).unwrap_or_else(|| {
            log::debug!("RECV: no handler registered");
            None
        })
    }
}

// ── Block scanning ────────────────────────────────────────────────────────────

/// Index of the terminator matching the opener at `lines[open]`, counting
/// nested openers of the same kind.
fn find_block_end(
    lines: &[SourceLine],
    open: usize,
    opener: Keyword,
) -> Result<usize, ScriptError> {
    let terminator = opener.terminator().ok_or_else(|| unterminated(opener))?;
    let mut depth = 0usize;
    for (j, line) in lines.iter().enumerate().skip(open + 1) {
        match line.keyword() {
            Some(kw) if kw == opener => depth += 1,
            Some(kw) if kw == terminator => {
                if depth == 0 {
                    return Ok(j);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(unterminated(opener))
}

/// Index of the `ENDIF` closing the `IF` block that `lines[from]` sits in.
fn skip_to_endif(lines: &[SourceLine], from: usize) -> Result<usize, ScriptError> {
    find_block_end(lines, from, Keyword::If)
}

fn unterminated(opener: Keyword) -> ScriptError {
    ScriptError::new(ErrorKind::Unterminated {
        keyword: opener.as_str(),
        terminator: opener.terminator().map_or("terminator", Keyword::as_str),
    })
}

/// Everything after the keyword; must be non-empty.
fn condition_text<'a>(text: &'a str, keyword: &str) -> Result<&'a str, ScriptError> {
    let (_, cond) = split_first(text);
    if cond.is_empty() {
        return Err(ScriptError::syntax(format!("{keyword} condition is empty")));
    }
    Ok(cond)
}

/// `WHILE [cond]` → `cond`.
fn while_condition(text: &str) -> Result<&str, ScriptError> {
    let (_, rest) = split_first(text);
    let inner = rest
        .strip_prefix('[')
        .and_then(|r| r.rfind(']').map(|end| r[..end].trim()))
        .filter(|c| !c.is_empty());
    inner.ok_or_else(|| ScriptError::syntax("WHILE expects a condition in brackets: WHILE [cond]"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
