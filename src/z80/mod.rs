pub mod opcodes;
pub mod registers;

pub use registers::{decode_flags, DecodeError, RegisterSnapshot};

/// Label of frames entered through an interrupt.
pub const INTERRUPT_LABEL: &str = "__INTERRUPT__";
/// Label of the outermost frame.
pub const MAIN_LABEL: &str = "__MAIN__";

/// Default display name of an address without a label.
pub fn hex_label(addr: u16) -> String {
    format!("{:04X}h", addr)
}
