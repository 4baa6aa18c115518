//! The G-code superset scripting language.
//!
//! Programs are plain G-code extended with:
//!
//! - Variables: `#1`, `#speed`, assigned with `#x = <expr>`
//! - Expressions with `+ - * /`, comparisons (`<`, `LT`, `==`, `EQ`, …) and
//!   parentheses, plus `READ <pin>` and `RECV <timeout>`
//! - `[expr]` interpolation in command arguments and messages
//! - `IF` / `ELSEIF` / `ELSE` / `ENDIF`, `FOR #i a b` / `ENDFOR`,
//!   `WHILE [cond]` / `ENDWHILE`
//! - Macros: `MACRO name` … `ENDMACRO`, invoked with `CALL name args…`
//!
//! Motion, pins and messaging are delegated to host [`Handlers`].
//!
//! # Quick start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use grunt::script::{Handlers, Interpreter};
//!
//! let moves = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&moves);
//! let handlers = Handlers::new().on_command("G1", move |args| {
//!     sink.borrow_mut().push(args.get(&'X').cloned());
//! });
//!
//! let mut interp = Interpreter::new(handlers);
//! interp.run("FOR #i 1 3\nG1 X[#i * 10]\nENDFOR").unwrap();
//! assert_eq!(moves.borrow().len(), 3);
//! ```

pub mod args;
pub mod command;
pub mod error;
pub mod expand;
pub mod expr;
pub mod handler;
pub mod interp;
pub mod lexer;
pub mod line;
pub mod macros;
pub mod value;
pub mod var;

// Re-exports for convenience.
pub use args::ArgMap;
pub use error::{ErrorKind, ScriptError};
pub use expr::{EvalContext, EvalError};
pub use handler::{Handlers, Pin};
pub use interp::Interpreter;
pub use value::Value;
