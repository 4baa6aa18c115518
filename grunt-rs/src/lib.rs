//! G-code superset scripting interpreter.
//!
//! [`script`] is the language itself and is usable on its own.  [`host`]
//! simulates a machine for it to drive, [`server`] exposes that over TCP,
//! and [`config`] / [`cli`] back the `grunt` binary.

pub mod cli;
pub mod config;
pub mod host;
pub mod script;
pub mod server;
