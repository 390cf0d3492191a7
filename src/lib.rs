//! Debug adapter bridging the Debug Adapter Protocol to the ZEsarUX remote command protocol,
//! with reverse debugging through the emulator's instruction history.

pub mod config;
pub mod dap;
pub mod debugger;
pub mod error;
pub mod parser;
pub mod z80;

pub use error::{Error, Result};
