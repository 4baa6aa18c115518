//! Handler registry.
//!
//! Everything that touches the outside world (motion, pins, messaging) is a
//! host-supplied closure looked up by mnemonic.  The registry is built once,
//! handed to [`Interpreter::new`](super::interp::Interpreter::new), and only
//! read from afterwards.
//!
//! Handlers run synchronously on the interpreter's thread and must not call
//! back into the interpreter that invoked them.

use std::collections::HashMap;
use std::fmt;

use super::args::ArgMap;

/// Target of a pin write: a literal pin number, or whatever text a bracketed
/// expression produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Pin {
    Number(i64),
    Name(String),
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Number(n) => write!(f, "{n}"),
            Pin::Name(s) => write!(f, "{s}"),
        }
    }
}

/// `G<code>` / `M<code>` handler.
pub type CommandFn = Box<dyn FnMut(&ArgMap)>;
/// `READ` handler: pin → value.
pub type ReadFn = Box<dyn FnMut(i64) -> f64>;
/// `WRITEPIN` handler.
pub type WritePinFn = Box<dyn FnMut(&Pin, f64)>;
/// `WRITEMSG` handler.
pub type WriteMsgFn = Box<dyn FnMut(&str)>;
/// `RECV` handler: timeout in seconds → message, or `None` on timeout.
pub type RecvFn = Box<dyn FnMut(f64) -> Option<String>>;

/// Mnemonic → handler table.
#[derive(Default)]
pub struct Handlers {
    commands: HashMap<String, CommandFn>,
    read: Option<ReadFn>,
    write_pin: Option<WritePinFn>,
    write_msg: Option<WriteMsgFn>,
    recv: Option<RecvFn>,
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<&str> = self.mnemonics().collect();
        commands.sort_unstable();
        f.debug_struct("Handlers")
            .field("commands", &commands)
            .field("read", &self.read.is_some())
            .field("write_pin", &self.write_pin.is_some())
            .field("write_msg", &self.write_msg.is_some())
            .field("recv", &self.recv.is_some())
            .finish()
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Register a `G`/`M` mnemonic (builder form).
    pub fn on_command(
        mut self,
        mnemonic: impl Into<String>,
        f: impl FnMut(&ArgMap) + 'static,
    ) -> Self {
        self.register_command(mnemonic, f);
        self
    }

    /// Register a `G`/`M` mnemonic, replacing any previous handler.
    pub fn register_command(
        &mut self,
        mnemonic: impl Into<String>,
        f: impl FnMut(&ArgMap) + 'static,
    ) {
        self.commands.insert(mnemonic.into(), Box::new(f));
    }

    pub fn on_read(mut self, f: impl FnMut(i64) -> f64 + 'static) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    pub fn on_write_pin(mut self, f: impl FnMut(&Pin, f64) + 'static) -> Self {
        self.write_pin = Some(Box::new(f));
        self
    }

    pub fn on_write_msg(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.write_msg = Some(Box::new(f));
        self
    }

    pub fn on_recv(mut self, f: impl FnMut(f64) -> Option<String> + 'static) -> Self {
        self.recv = Some(Box::new(f));
        self
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    pub fn has_command(&self, mnemonic: &str) -> bool {
        self.commands.contains_key(mnemonic)
    }

    pub fn mnemonics(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    // ── Invocation ────────────────────────────────────────────────────────────
    //
    // Each returns `None` (or `false`) when the handler is not registered so
    // the caller can decide between a fallback value and a diagnostic.

    pub(crate) fn command(&mut self, mnemonic: &str, args: &ArgMap) -> bool {
        match self.commands.get_mut(mnemonic) {
            Some(f) => {
                f(args);
                true
            }
            None => false,
        }
    }

    pub(crate) fn read(&mut self, pin: i64) -> Option<f64> {
        self.read.as_mut().map(|f| f(pin))
    }

    pub(crate) fn write_pin(&mut self, pin: &Pin, value: f64) -> bool {
        match self.write_pin.as_mut() {
            Some(f) => {
                f(pin, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn write_msg(&mut self, msg: &str) -> bool {
        match self.write_msg.as_mut() {
            Some(f) => {
                f(msg);
                true
            }
            None => false,
        }
    }

    pub(crate) fn recv(&mut self, timeout: f64) -> Option<Option<String>> {
        self.recv.as_mut().map(|f| f(timeout))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
