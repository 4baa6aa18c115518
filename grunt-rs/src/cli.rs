//! Command-line argument parsing.
//!
//! Usage:
//!   grunt [-f[<file>]] [-v…] [-q] <program>|-
//!   grunt [-f[<file>]] [-v…] [-q] -s [-l<addr>]

use std::path::PathBuf;

use log::LevelFilter;

pub const USAGE: &str = "\
Usage: grunt [-f[<file>]] [-v...] [-q] <program>|-
       grunt [-f[<file>]] [-v...] [-q] -s [-l<addr>]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Run the command server (`-s`).
    pub serve: bool,
    /// Listen address override (`-l<addr>`).
    pub listen: Option<String>,
    /// Number of `-v` flags.
    pub verbose: u8,
    /// Errors only (`-q`).
    pub quiet: bool,
    /// Program to run.
    pub program: Option<ProgramSource>,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq)]
pub enum ConfigFile {
    /// Search the user config directory, then `./grunt.rc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where the program text comes from.
#[derive(Debug, PartialEq)]
pub enum ProgramSource {
    File(PathBuf),
    /// `-`: read standard input.
    Stdin,
}

impl CliArgs {
    /// Log level after `-v` / `-q` adjustments to `base`.
    pub fn log_level(&self, base: LevelFilter) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        const LEVELS: [LevelFilter; 6] = [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ];
        let idx = base as usize + self.verbose as usize;
        LEVELS[idx.min(LEVELS.len() - 1)]
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
///
/// `-f` only takes its file in attached form (`-fmy.rc`), so `grunt -f prog.g`
/// runs `prog.g` without a config file.
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                's' => args.serve = true,
                'q' => args.quiet = true,
                'v' => args.verbose = args.verbose.saturating_add(1),

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -l<addr>
                'l' => {
                    let addr = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-l requires an address argument".to_owned());
                    };
                    args.listen = Some(addr);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => {
            let p = positional.remove(0);
            args.program = Some(if p == "-" {
                ProgramSource::Stdin
            } else {
                ProgramSource::File(PathBuf::from(p))
            });
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    if args.serve && args.program.is_some() {
        return Err("-s does not take a program".to_owned());
    }
    if !args.serve && args.program.is_none() {
        return Err("no program given".to_owned());
    }
    if !args.serve && args.listen.is_some() {
        return Err("-l only applies with -s".to_owned());
    }

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
