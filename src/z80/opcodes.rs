//! Classification of the Z80 instructions that move the stack pointer.
//!
//! All predicates work on the raw encoding (1 to 4 bytes, first byte first) as found in the
//! `(PC)=` field of a history line.

use super::registers::{RegisterSnapshot, FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};

pub const OPCODE_CALL: u8 = 0xCD;
pub const OPCODE_RET: u8 = 0xC9;
const PREFIX_ED: u8 = 0xED;
const PREFIX_DD: u8 = 0xDD;
const PREFIX_FD: u8 = 0xFD;

/// How an instruction changes SP when it is not a call, return, push or pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpChange {
    /// SP is moved by a fixed amount (0 for most instructions).
    Delta(i32),
    /// SP is loaded with a known value.
    Load(u16),
    /// SP is loaded from memory (`LD SP,(nn)`), the value is unknown without a read.
    Indeterminate,
}

/// Evaluate condition `cc` (bits 5..3 of the opcode) against the flags.
pub fn condition_met(cc: u8, flags: u8) -> bool {
    match cc & 0x07 {
        0 => flags & FLAG_Z == 0,  // NZ
        1 => flags & FLAG_Z != 0,  // Z
        2 => flags & FLAG_C == 0,  // NC
        3 => flags & FLAG_C != 0,  // C
        4 => flags & FLAG_PV == 0, // PO
        5 => flags & FLAG_PV != 0, // PE
        6 => flags & FLAG_S == 0,  // P
        _ => flags & FLAG_S != 0,  // M
    }
}

fn cc_of(opcode: u8) -> u8 {
    (opcode >> 3) & 0x07
}

/// `CALL nn` or `CALL cc,nn`.
pub fn is_call(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(&op) if op == OPCODE_CALL || op & 0xC7 == 0xC4)
}

/// True if the call is unconditional or its condition holds for `flags`.
pub fn is_conditional_call_taken(bytes: &[u8], flags: u8) -> bool {
    match bytes.first() {
        Some(&OPCODE_CALL) => true,
        Some(&op) if op & 0xC7 == 0xC4 => condition_met(cc_of(op), flags),
        _ => false,
    }
}

/// Target of a `CALL`, the operand is little endian.
pub fn call_target(bytes: &[u8]) -> Option<u16> {
    if !is_call(bytes) || bytes.len() < 3 {
        return None;
    }
    Some(u16::from_le_bytes([bytes[1], bytes[2]]))
}

/// `RST p`.
pub fn is_rst(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(&op) if op & 0xC7 == 0xC7)
}

/// Page of an `RST` (0x00, 0x08 .. 0x38).
pub fn rst_target(opcode: u8) -> u16 {
    (opcode & 0x38) as u16
}

/// `RET`, `RET cc`, `RETI` or `RETN`.
pub fn is_ret(bytes: &[u8]) -> bool {
    match bytes {
        [OPCODE_RET, ..] => true,
        [op, ..] if op & 0xC7 == 0xC0 => true,
        // RETN, RETI and their undocumented mirrors
        [PREFIX_ED, op, ..] => op & 0xC7 == 0x45,
        _ => false,
    }
}

/// True if a return instruction actually returned with the given flags.
pub fn is_conditional_ret_taken(bytes: &[u8], flags: u8) -> bool {
    match bytes {
        [op, ..] if *op & 0xC7 == 0xC0 => condition_met(cc_of(*op), flags),
        _ => is_ret(bytes),
    }
}

/// `PUSH qq`, `PUSH IX/IY` and the ZX Next `PUSH nn`.
pub fn is_push(bytes: &[u8]) -> bool {
    match bytes {
        [op, ..] if op & 0xCF == 0xC5 => true,
        [PREFIX_DD | PREFIX_FD, 0xE5, ..] => true,
        [PREFIX_ED, 0x8A, ..] => true,
        _ => false,
    }
}

/// `POP qq` and `POP IX/IY`.
pub fn is_pop(bytes: &[u8]) -> bool {
    match bytes {
        [op, ..] if op & 0xCF == 0xC1 => true,
        [PREFIX_DD | PREFIX_FD, 0xE1, ..] => true,
        _ => false,
    }
}

/// The word a push instruction stores on the stack.
pub fn pushed_value(bytes: &[u8], regs: &RegisterSnapshot) -> Option<u16> {
    match bytes {
        [0xC5, ..] => Some(regs.bc),
        [0xD5, ..] => Some(regs.de),
        [0xE5, ..] => Some(regs.hl),
        [0xF5, ..] => Some(regs.af),
        [PREFIX_DD, 0xE5, ..] => Some(regs.ix),
        [PREFIX_FD, 0xE5, ..] => Some(regs.iy),
        // operand of the Next PUSH is big endian
        [PREFIX_ED, 0x8A, hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// SP effect of every instruction that is not a call, return, push or pop.
pub fn direct_sp_change(bytes: &[u8], regs: &RegisterSnapshot) -> SpChange {
    match bytes {
        [0x33, ..] => SpChange::Delta(1),
        [0x3B, ..] => SpChange::Delta(-1),
        [0x31, lo, hi, ..] => SpChange::Load(u16::from_le_bytes([*lo, *hi])),
        [0xF9, ..] => SpChange::Load(regs.hl),
        [PREFIX_DD, 0xF9, ..] => SpChange::Load(regs.ix),
        [PREFIX_FD, 0xF9, ..] => SpChange::Load(regs.iy),
        [PREFIX_ED, 0x7B, ..] => SpChange::Indeterminate,
        _ => SpChange::Delta(0),
    }
}

/// Encoded length of the instructions the reconstructor needs to step over.
pub fn instruction_len(bytes: &[u8]) -> u16 {
    match bytes {
        [op, ..] if is_call(&[*op]) => 3,
        [0x31, ..] => 3,
        [PREFIX_ED, 0x7B, ..] | [PREFIX_ED, 0x8A, ..] => 4,
        [PREFIX_DD | PREFIX_FD | PREFIX_ED, ..] => 2,
        _ => 1,
    }
}

/// Classify the 3 bytes preceding a return address: the subroutine that was entered, if any.
///
/// Returns `None` when neither a `CALL` nor an `RST` ends right before the return address,
/// which happens when the address was pushed by an interrupt.
pub fn caller_target(preceding: &[u8; 3]) -> Option<u16> {
    if is_call(&preceding[..]) {
        return call_target(&preceding[..]);
    }
    if is_rst(&preceding[2..]) {
        return Some(rst_target(preceding[2]));
    }
    None
}
