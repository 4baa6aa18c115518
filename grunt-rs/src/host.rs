//! Simulated machine host.
//!
//! Stands in for real motion and I/O hardware: a pin table that `READ` and
//! `WRITE <pin> <value>` operate on, an [`Inbox`] that feeds `RECV`, and an
//! event stream describing every command the program issued.  Pins can be
//! watched; a write that changes a watched pin adds a
//! [`HostEvent::PinChanged`] notification.  The server and the command-line
//! runner both drive programs through it.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use crate::script::args::{render_args, ArgMap};
use crate::script::{Handlers, Pin, Value};

// ── Machine ───────────────────────────────────────────────────────────────────

/// Simulated pin table.  Unwritten pins read as 0.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pins: HashMap<i64, f64>,
    watched: BTreeSet<i64>,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pins(pins: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Machine {
            pins: pins.into_iter().collect(),
            watched: BTreeSet::new(),
        }
    }

    pub fn read(&self, pin: i64) -> f64 {
        self.pins.get(&pin).copied().unwrap_or(0.0)
    }

    /// Store `value`; returns `true` when `pin` is watched and its value
    /// changed.
    pub fn write(&mut self, pin: i64, value: f64) -> bool {
        let old = self.pins.insert(pin, value).unwrap_or(0.0);
        self.watched.contains(&pin) && old != value
    }

    /// Start watching `pin`.  Returns `false` if it already was.
    pub fn watch(&mut self, pin: i64) -> bool {
        self.watched.insert(pin)
    }

    /// Stop watching `pin`.  Returns `false` if it was not watched.
    pub fn unwatch(&mut self, pin: i64) -> bool {
        self.watched.remove(&pin)
    }

    pub fn is_watched(&self, pin: i64) -> bool {
        self.watched.contains(&pin)
    }

    pub fn pins(&self) -> &HashMap<i64, f64> {
        &self.pins
    }
}

// ── Inbox ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Input {
    Line(String),
    /// Everything queued before this belongs to an earlier program.
    Fence,
}

/// Sending half of an [`Inbox`].  Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: Sender<Input>,
}

impl InboxSender {
    /// Queue a line; `false` once the inbox is gone.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.tx.send(Input::Line(line.into())).is_ok()
    }

    /// Mark the start of a new program.  See [`Inbox::skip_to_fence`].
    pub fn fence(&self) -> bool {
        self.tx.send(Input::Fence).is_ok()
    }
}

/// Incoming text lines for `RECV`.
#[derive(Debug)]
pub struct Inbox {
    rx: Receiver<Input>,
}

impl Inbox {
    pub fn channel() -> (InboxSender, Inbox) {
        let (tx, rx) = mpsc::channel();
        (InboxSender { tx }, Inbox { rx })
    }

    /// Wait up to `timeout` seconds for a non-blank line; returns it trimmed.
    ///
    /// Blank lines and fences are consumed and ignored.  A negative or NaN
    /// timeout only checks what is already queued.  A closed channel counts
    /// as a timeout.
    pub fn recv(&self, timeout: f64) -> Option<String> {
        let wait = Duration::try_from_secs_f64(timeout.max(0.0)).unwrap_or(Duration::MAX);
        let deadline = Instant::now().checked_add(wait);

        loop {
            let input = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        match self.rx.try_recv() {
                            Ok(input) => input,
                            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
                        }
                    } else {
                        match self.rx.recv_timeout(remaining) {
                            Ok(input) => input,
                            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                                return None
                            }
                        }
                    }
                }
                None => self.rx.recv().ok()?,
            };
            if let Input::Line(line) = input {
                let line = line.trim();
                if !line.is_empty() {
                    return Some(line.to_owned());
                }
            }
        }
    }

    /// Discard lines up to and including the next fence; returns how many
    /// lines were dropped.  Blocks until the fence arrives or every sender is
    /// gone.
    pub fn skip_to_fence(&self) -> usize {
        let mut n = 0;
        while let Ok(Input::Line(_)) = self.rx.recv() {
            n += 1;
        }
        n
    }
}

// ── HostEvent ─────────────────────────────────────────────────────────────────

/// Something a program did to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Command { mnemonic: String, args: ArgMap },
    PinWrite { pin: Pin, value: f64 },
    /// A watched pin took a new value.
    PinChanged { pin: i64, value: f64 },
    Message(String),
}

impl fmt::Display for HostEvent {
    /// Wire form: `CMD G1 F=100.0 X=10.0`, `PIN 1 42.0`,
    /// `Pin 1 changed to 42.0`, `MSG text`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::Command { mnemonic, args } if args.is_empty() => {
                write!(f, "CMD {mnemonic}")
            }
            HostEvent::Command { mnemonic, args } => {
                write!(f, "CMD {mnemonic} {}", render_args(args))
            }
            HostEvent::PinWrite { pin, value } => write!(f, "PIN {pin} {}", Value::Number(*value)),
            HostEvent::PinChanged { pin, value } => {
                write!(f, "Pin {pin} changed to {}", Value::Number(*value))
            }
            HostEvent::Message(msg) => write!(f, "MSG {msg}"),
        }
    }
}

// ── Handler wiring ────────────────────────────────────────────────────────────

/// Build the handler registry for a simulated machine.
///
/// Every mnemonic in `mnemonics` is registered; each call, pin write and
/// message is logged and passed to `sink`.
pub fn build_handlers<F>(
    machine: Rc<RefCell<Machine>>,
    inbox: Rc<Inbox>,
    mnemonics: &[String],
    sink: F,
) -> Handlers
where
    F: Fn(HostEvent) + 'static,
{
    let sink: Rc<dyn Fn(HostEvent)> = Rc::new(sink);
    let mut handlers = Handlers::new();

    for mnemonic in mnemonics {
        let sink = Rc::clone(&sink);
        let name = mnemonic.clone();
        handlers.register_command(mnemonic.clone(), move |args| {
            log::info!("{name} {}", render_args(args));
            sink(HostEvent::Command {
                mnemonic: name.clone(),
                args: args.clone(),
            });
        });
    }

    let reader = Rc::clone(&machine);
    let pin_sink = Rc::clone(&sink);
    handlers
        .on_read(move |pin| {
            let value = reader.borrow().read(pin);
            log::debug!("READ {pin} -> {value}");
            value
        })
        .on_write_pin(move |pin, value| {
            let changed = match pin {
                Pin::Number(n) => machine.borrow_mut().write(*n, value).then_some(*n),
                Pin::Name(name) => {
                    log::warn!("pin '{name}' is not a simulated pin");
                    None
                }
            };
            log::info!("WRITEPIN {pin} {value}");
            pin_sink(HostEvent::PinWrite {
                pin: pin.clone(),
                value,
            });
            if let Some(pin) = changed {
                log::debug!("watched pin {pin} changed to {value}");
                pin_sink(HostEvent::PinChanged { pin, value });
            }
        })
        .on_write_msg(move |msg| {
            log::info!("WRITEMSG {msg}");
            sink(HostEvent::Message(msg.to_owned()));
        })
        .on_recv(move |timeout| {
            let line = inbox.recv(timeout);
            match &line {
                Some(l) => log::debug!("RECV -> {l}"),
                None => log::debug!("RECV timed out after {timeout}s"),
            }
            line
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
