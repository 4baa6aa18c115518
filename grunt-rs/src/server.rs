//! Line-oriented command server.
//!
//! Each TCP connection gets its own interpreter, so variables and macros
//! survive from one program to the next within a session.
//!
//! ## Protocol
//!
//! Newline-delimited UTF-8 in both directions.
//!
//! ```text
//!   client                          server
//!   ──────                          ──────
//!   #1 = 5
//!   WRITE "x is [#1]"
//!   G1 X[#1]
//!   .                     ──►       (program runs)
//!                         ◄──       MSG x is 5.0
//!                         ◄──       CMD G1 X=5.0
//!                         ◄──       OK
//! ```
//!
//! A line holding only `.` ends a program.  While a program is running,
//! incoming lines go to its `RECV` inbox instead.  Each program only ever
//! sees lines sent after its own `.`: a fence is queued in the inbox ahead of
//! every program and the worker discards whatever precedes it.  A failed
//! program is answered with `ERR <message>` and the session continues.
//!
//! ## Control lines
//!
//! While no program is running or being collected, a line starting with one
//! of these words is a control line and gets a single reply line:
//!
//! | Line             | Reply                                              |
//! |------------------|----------------------------------------------------|
//! | `listen <n>`     | `Listening on pin <n>`                             |
//! | `unlisten <n>`   | `Stopped listening on pin <n>` or `Pin <n> is not being listened to.` |
//! | `autoauth <code>`| `<code>`                                           |
//!
//! A malformed control line is answered with `ERR <message>`.  Once a pin is
//! listened to, every `WRITE` that changes it is followed by a
//! `Pin <n> changed to <value>` line.
//!
//! The interpreter is synchronous, so it lives on a `spawn_blocking` worker
//! and talks to the connection task through channels:
//!
//! ```text
//!   connection task ── program ──►  worker (Interpreter)
//!        │          ── RECV lines ──►  Inbox
//!        ◄──────── events / OK / ERR ──┘
//! ```

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::host::{build_handlers, Inbox, Machine};
use crate::script::Interpreter;

/// Line that terminates a program.
pub const END_OF_PROGRAM: &str = ".";

/// Bound on replies queued between the worker and the connection task.
const REPLY_QUEUE: usize = 256;

// ── Control lines ─────────────────────────────────────────────────────────────

/// A session command handled outside the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Listen(i64),
    Unlisten(i64),
    AutoAuth(i64),
}

impl Control {
    /// Recognise a control line.  `None` means the line belongs to a
    /// program; `Some(Err(_))` is a control word with a bad argument.
    pub fn parse(line: &str) -> Option<Result<Control, String>> {
        let mut words = line.split_whitespace();
        let keyword = words.next()?;
        let make: fn(i64) -> Control = match keyword {
            "listen" => Control::Listen,
            "unlisten" => Control::Unlisten,
            "autoauth" => Control::AutoAuth,
            _ => return None,
        };
        let parsed = match (words.next(), words.next()) {
            (Some(arg), None) => arg
                .parse()
                .map(make)
                .map_err(|_| format!("{keyword}: '{arg}' is not an integer")),
            _ => Err(format!("{keyword} takes exactly one integer argument")),
        };
        Some(parsed)
    }
}

/// Work handed to a session worker, in arrival order.
#[derive(Debug)]
enum Job {
    Program(String),
    Control(Result<Control, String>),
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
}

impl Server {
    /// Bind to `config.listen`.
    pub async fn bind(config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.listen).await?;
        Ok(Server {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until Ctrl-C.
    pub async fn run(self) -> io::Result<()> {
        log::info!("listening on {}", self.local_addr()?);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            log::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    log::info!("{peer}: connected");
                    let config = Arc::clone(&self.config);
                    tokio::spawn(async move {
                        match handle_connection(stream, config).await {
                            Ok(()) => log::info!("{peer}: disconnected"),
                            Err(e) => log::warn!("{peer}: connection error: {e}"),
                        }
                    });
                }
                _ = &mut shutdown => {
                    log::info!("interrupted, shutting down");
                    return Ok(());
                }
            }
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, config: Arc<Config>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (job_tx, job_rx) = std_mpsc::channel::<Job>();
    let (inbox_tx, inbox) = Inbox::channel();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_QUEUE);
    let running = Arc::new(AtomicBool::new(false));

    let worker_running = Arc::clone(&running);
    tokio::task::spawn_blocking(move || {
        session_worker(&config, job_rx, inbox, reply_tx, &worker_running)
    });

    // Dropped at end of input so the worker exits after its current job.
    let mut job_tx = Some(job_tx);
    let mut inbox_tx = Some(inbox_tx);
    let mut program: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            line = lines.next_line(), if job_tx.is_some() => {
                let Some(line) = line? else {
                    if !program.is_empty() {
                        log::debug!("discarding unterminated program ({} lines)", program.len());
                    }
                    job_tx = None;
                    inbox_tx = None;
                    continue;
                };
                if running.load(Ordering::SeqCst) {
                    if let Some(tx) = &inbox_tx {
                        tx.send(line);
                    }
                } else if line.trim() == END_OF_PROGRAM {
                    running.store(true, Ordering::SeqCst);
                    if let Some(tx) = &inbox_tx {
                        tx.fence();
                    }
                    let source = std::mem::take(&mut program).join("\n");
                    if let Some(tx) = &job_tx {
                        if tx.send(Job::Program(source)).is_err() {
                            break;
                        }
                    }
                } else if let Some(control) =
                    program.is_empty().then(|| Control::parse(&line)).flatten()
                {
                    if let Some(tx) = &job_tx {
                        if tx.send(Job::Control(control)).is_err() {
                            break;
                        }
                    }
                } else {
                    program.push(line);
                }
            }
            reply = reply_rx.recv() => {
                let Some(reply) = reply else { break };
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
    }

    writer.shutdown().await
}

/// Owns the interpreter for one connection.  Runs until the job channel
/// closes or the connection task stops listening.
fn session_worker(
    config: &Config,
    jobs: std_mpsc::Receiver<Job>,
    inbox: Inbox,
    replies: mpsc::Sender<String>,
    running: &AtomicBool,
) {
    let machine = Rc::new(RefCell::new(Machine::with_pins(
        config.pins.iter().map(|(&p, &v)| (p, v)),
    )));
    let inbox = Rc::new(inbox);
    let events = replies.clone();
    let handlers = build_handlers(
        Rc::clone(&machine),
        Rc::clone(&inbox),
        &config.mnemonics(),
        move |ev| {
            let _ = events.blocking_send(ev.to_string());
        },
    );

    let mut interp = Interpreter::new(handlers);
    if let Err(e) = config.apply(&mut interp) {
        log::warn!("config variables not applied: {e}");
    }

    for job in jobs {
        let program = match job {
            Job::Program(program) => program,
            Job::Control(control) => {
                let reply = match control {
                    Ok(control) => control_reply(&mut machine.borrow_mut(), control),
                    Err(e) => format!("ERR {e}"),
                };
                if replies.blocking_send(reply).is_err() {
                    break;
                }
                continue;
            }
        };

        let stale = inbox.skip_to_fence();
        if stale > 0 {
            log::debug!("discarded {stale} stale inbox lines");
        }

        let result = interp.run(&program);
        running.store(false, Ordering::SeqCst);

        let reply = match result {
            Ok(()) => "OK".to_owned(),
            Err(e) => {
                log::warn!("program failed: {e}");
                format!("ERR {e}")
            }
        };
        if replies.blocking_send(reply).is_err() {
            break;
        }
    }
}

fn control_reply(machine: &mut Machine, control: Control) -> String {
    log::info!("{control:?}");
    match control {
        Control::Listen(pin) => {
            machine.watch(pin);
            format!("Listening on pin {pin}")
        }
        Control::Unlisten(pin) => {
            if machine.unwatch(pin) {
                format!("Stopped listening on pin {pin}")
            } else {
                format!("Pin {pin} is not being listened to.")
            }
        }
        Control::AutoAuth(code) => code.to_string(),
    }
}
