//! `grunt.rc` configuration file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set listen=<addr>` | server listen address |
//! | `/set log=<level>` | `error`, `warn`, `info`, `debug` or `trace` |
//! | `/set max_depth=<n>` | nesting bound for loops and macro calls |
//! | `/pin <n> <value>` | initial value of a simulated pin |
//! | `/var #<name> <value>` | variable assigned before every session |
//! | `/command <mnemonic>…` | extra `G`/`M` mnemonics to register |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! `/set` and `/var` accept both `name=value` and `name value`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::LevelFilter;

use crate::script::interp::DEFAULT_MAX_DEPTH;
use crate::script::{Interpreter, ScriptError, Value};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

/// Mnemonics registered with the simulated host when no config says otherwise.
pub const DEFAULT_MNEMONICS: &[&str] = &[
    "G0", "G1", "G2", "G3", "G4", "G14", "G15", "G16", "G28", "G90", "G91", "M0", "M2", "M3",
    "M5", "M30",
];

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Parsed configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub log_level: LevelFilter,
    pub max_depth: usize,
    /// Initial simulated pin values.
    pub pins: BTreeMap<i64, f64>,
    /// Pre-assigned variables, keyed by source spelling (`#name`).
    pub vars: Vec<(String, Value)>,
    /// Mnemonics added by `/command`, on top of [`DEFAULT_MNEMONICS`].
    pub commands: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: DEFAULT_LISTEN.to_owned(),
            log_level: LevelFilter::Info,
            max_depth: DEFAULT_MAX_DEPTH,
            pins: BTreeMap::new(),
            vars: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any parse errors on recognised lines.
    /// A bad line leaves the corresponding setting at its previous value.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let tokens = split_args(args_str.trim());

            let result = match cmd {
                "set" => config.parse_set(&tokens),
                "pin" => config.parse_pin(&tokens),
                "var" => config.parse_var(&tokens),
                "command" => config.parse_command(&tokens),
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Default mnemonics followed by the configured extras, without repeats.
    pub fn mnemonics(&self) -> Vec<String> {
        let mut out: Vec<String> = DEFAULT_MNEMONICS.iter().map(|&m| m.to_owned()).collect();
        for m in &self.commands {
            if !out.contains(m) {
                out.push(m.clone());
            }
        }
        out
    }

    /// Apply the interpreter-level settings: depth bound and `/var` values.
    pub fn apply(&self, interp: &mut Interpreter) -> Result<(), ScriptError> {
        interp.set_max_depth(self.max_depth);
        for (name, value) in &self.vars {
            interp.set_var(name, value.clone())?;
        }
        Ok(())
    }

    // ── Directives ────────────────────────────────────────────────────────────

    fn parse_set(&mut self, tokens: &[String]) -> Result<(), String> {
        let (name, value) = name_value("/set", tokens)?;
        match name.as_str() {
            "listen" => self.listen = value,
            "log" => {
                self.log_level = value
                    .parse()
                    .map_err(|_| format!("/set: invalid log level '{value}'"))?;
            }
            "max_depth" => {
                self.max_depth = value
                    .parse()
                    .map_err(|_| format!("/set: max_depth must be a positive integer, got '{value}'"))?;
            }
            _ => return Err(format!("/set: unknown setting '{name}'")),
        }
        Ok(())
    }

    fn parse_pin(&mut self, tokens: &[String]) -> Result<(), String> {
        let [pin, value] = tokens else {
            return Err("/pin: usage: /pin <number> <value>".into());
        };
        let pin: i64 = pin.parse().map_err(|_| format!("/pin: invalid pin number '{pin}'"))?;
        let value: f64 = value.parse().map_err(|_| format!("/pin: invalid value '{value}'"))?;
        self.pins.insert(pin, value);
        Ok(())
    }

    fn parse_var(&mut self, tokens: &[String]) -> Result<(), String> {
        let (name, value) = name_value("/var", tokens)?;
        if crate::script::lexer::canonical_name(&name).is_none() {
            return Err(format!("/var: '{name}' is not a variable (expected #name)"));
        }
        let value = match value.parse::<f64>() {
            Ok(x) => Value::Number(x),
            Err(_) => Value::Text(value),
        };
        self.vars.retain(|(n, _)| *n != name);
        self.vars.push((name, value));
        Ok(())
    }

    fn parse_command(&mut self, tokens: &[String]) -> Result<(), String> {
        if tokens.is_empty() {
            return Err("/command: requires at least one mnemonic".into());
        }
        for m in tokens {
            if !(m.starts_with('G') || m.starts_with('M')) {
                return Err(format!("/command: '{m}' is not a G or M mnemonic"));
            }
            if !self.commands.contains(m) {
                self.commands.push(m.clone());
            }
        }
        Ok(())
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file: the platform config directory
/// (`~/.config/grunt/grunt.rc` on Linux), then `./grunt.rc`.
pub fn find_user_config() -> Option<PathBuf> {
    let user = directories::ProjectDirs::from("", "", "grunt")
        .map(|dirs| dirs.config_dir().join("grunt.rc"));
    user.into_iter()
        .chain(std::iter::once(PathBuf::from("./grunt.rc")))
        .find(|p| p.exists())
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

/// `name=value` or `name value…`.
fn name_value(directive: &str, tokens: &[String]) -> Result<(String, String), String> {
    let Some(first) = tokens.first() else {
        return Err(format!("{directive}: requires an argument"));
    };

    let (name, value) = if let Some(eq) = first.find('=') {
        (first[..eq].to_owned(), first[eq + 1..].to_owned())
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("{directive}: missing value for '{first}'"));
    };

    if name.is_empty() {
        return Err(format!("{directive}: name cannot be empty"));
    }
    Ok((name, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- split_args -----------------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(split_args("a b  c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#"#greeting "hello world""#), vec!["#greeting", "hello world"]);
    }

    #[test]
    fn split_escaped_quote_inside_quotes() {
        assert_eq!(split_args(r#""say \"hi\"""#), vec![r#"say "hi""#]);
    }

    // -- /set -----------------------------------------------------------------

    #[test]
    fn defaults() {
        let (cfg, errs) = Config::load_str("");
        assert!(errs.is_empty());
        assert_eq!(cfg.listen, DEFAULT_LISTEN);
        assert_eq!(cfg.log_level, LevelFilter::Info);
        assert_eq!(cfg.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("/set listen=0.0.0.0:6000\n/set log=debug");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.listen, "0.0.0.0:6000");
        assert_eq!(cfg.log_level, LevelFilter::Debug);
    }

    #[test]
    fn set_space_syntax() {
        let (cfg, errs) = Config::load_str("/set max_depth 50");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.max_depth, 50);
    }

    #[test]
    fn set_errors() {
        let (cfg, errs) = Config::load_str("/set log=loud\n/set colour=red\n/set max_depth=-1\n/set");
        assert_eq!(errs.len(), 4);
        assert_eq!(errs[1].line, 2);
        assert_eq!(cfg.log_level, LevelFilter::Info);
    }

    // -- /pin, /var, /command -------------------------------------------------

    #[test]
    fn pins() {
        let (cfg, errs) = Config::load_str("/pin 1 0\n/pin 7 3.5\n/pin x 1\n/pin 2");
        assert_eq!(errs.len(), 2);
        assert_eq!(cfg.pins.get(&7), Some(&3.5));
        assert_eq!(cfg.pins.len(), 2);
    }

    #[test]
    fn vars_number_and_text() {
        let (cfg, errs) = Config::load_str("/var #speed=100\n/var #name \"tool one\"\n/var speed 1");
        assert_eq!(errs.len(), 1);
        assert_eq!(
            cfg.vars,
            vec![
                ("#speed".to_owned(), Value::Number(100.0)),
                ("#name".to_owned(), Value::Text("tool one".into())),
            ]
        );
    }

    #[test]
    fn var_redefinition_keeps_last() {
        let (cfg, _) = Config::load_str("/var #a 1\n/var #a 2");
        assert_eq!(cfg.vars, vec![("#a".to_owned(), Value::Number(2.0))]);
    }

    #[test]
    fn commands_extend_defaults() {
        let (cfg, errs) = Config::load_str("/command G5 M7 G1\n/command T1\n/command");
        assert_eq!(errs.len(), 2);
        let m = cfg.mnemonics();
        assert_eq!(m.len(), DEFAULT_MNEMONICS.len() + 2);
        assert!(m.iter().any(|x| x == "G5"));
        assert!(m.iter().any(|x| x == "M7"));
    }

    #[test]
    fn apply_to_interpreter() {
        let (cfg, _) = Config::load_str("/set max_depth=12\n/var #feed 250");
        let mut interp = Interpreter::new(crate::script::Handlers::new());
        cfg.apply(&mut interp).unwrap();
        assert_eq!(interp.max_depth(), 12);
        assert_eq!(interp.var("#feed"), Some(&Value::Number(250.0)));
    }

    // -- Comments & skipping --------------------------------------------------

    #[test]
    fn comments_blank_and_unknown_skipped() {
        let src = "\
;; grunt config\n\
\n\
/set listen=127.0.0.1:7000\n\
/def something else\n\
not a directive\n\
/pin 3 1\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.listen, "127.0.0.1:7000");
        assert_eq!(cfg.pins.get(&3), Some(&1.0));
    }

    #[test]
    fn load_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grunt.rc");
        std::fs::write(&path, "/set log=trace\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.log_level, LevelFilter::Trace);
        assert!(Config::load_file(&dir.path().join("missing.rc")).is_err());
    }
}
