use std::cell::RefCell;
use std::io::{self, BufRead, Read};
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use simple_logger::SimpleLogger;

use grunt::cli::{self, CliArgs, ConfigFile, ProgramSource};
use grunt::config::{self, Config, ConfigError};
use grunt::host::{build_handlers, Inbox, Machine};
use grunt::script::Interpreter;
use grunt::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("grunt: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    // ── Config ────────────────────────────────────────────────────────────────
    let (mut config, config_errors) = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("grunt: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }

    // ── Logging ───────────────────────────────────────────────────────────────
    if let Err(e) = SimpleLogger::new()
        .with_level(args.log_level(config.log_level))
        .init()
    {
        eprintln!("grunt: cannot initialise logging: {e}");
    }
    for e in &config_errors {
        log::warn!("config {e}");
    }

    if args.serve {
        serve(config).await
    } else {
        run_program(&args, &config)
    }
}

fn load_config(which: &ConfigFile) -> Result<(Config, Vec<ConfigError>), String> {
    let path = match which {
        ConfigFile::Skip => return Ok((Config::new(), Vec::new())),
        ConfigFile::Explicit(p) => p.clone(),
        ConfigFile::Search => match config::find_user_config() {
            Some(p) => p,
            None => return Ok((Config::new(), Vec::new())),
        },
    };
    Config::load_file(&path).map_err(|e| format!("{}: {e}", path.display()))
}

async fn serve(config: Config) -> ExitCode {
    let server = match Server::bind(config).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("cannot listen: {e}");
            return ExitCode::FAILURE;
        }
    };
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("server stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run one program against the simulated machine, printing events on stdout.
fn run_program(args: &CliArgs, config: &Config) -> ExitCode {
    let source = match &args.program {
        Some(ProgramSource::File(path)) => read_file(path),
        Some(ProgramSource::Stdin) => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).map(|_| s)
        }
        None => return ExitCode::from(2),
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("grunt: cannot read program: {e}");
            return ExitCode::from(2);
        }
    };

    // RECV reads standard input unless the program itself came from there.
    let (inbox_tx, inbox) = Inbox::channel();
    if args.program != Some(ProgramSource::Stdin) {
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if !inbox_tx.send(line) {
                    break;
                }
            }
        });
    }

    let machine = Rc::new(RefCell::new(Machine::with_pins(
        config.pins.iter().map(|(&p, &v)| (p, v)),
    )));
    let handlers = build_handlers(machine, Rc::new(inbox), &config.mnemonics(), |ev| {
        println!("{ev}")
    });
    let mut interp = Interpreter::new(handlers);
    if let Err(e) = config.apply(&mut interp) {
        log::warn!("config variables not applied: {e}");
    }

    match interp.run(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("grunt: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_file(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}
