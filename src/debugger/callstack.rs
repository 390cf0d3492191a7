//! Call stack reconstruction.
//!
//! Two algorithms build the same [`Frame`] list:
//!
//! - [`live_call_stack`] walks the annotated hardware stack of the running machine
//!   (`extended-stack get`), slot by slot, reading the bytes before each return address to find
//!   the subroutine that was entered.
//! - [`ReverseStack`] keeps a virtual stack in sync with a cursor that moves one instruction at a
//!   time through the instruction history, in either direction.
//!
//! Both keep a per frame data stack of pushed words so that a change of SP can be attributed
//! either to data (`PUSH`/`POP`) or to frames (`CALL`/`RET`/interrupts).

use super::session::CommandChannel;
use super::Frame;
use crate::error::{Error, Result};
use crate::parser::SymbolTable;
use crate::z80::opcodes::{
    caller_target, direct_sp_change, instruction_len, is_call, is_conditional_call_taken,
    is_conditional_ret_taken, is_pop, is_push, is_ret, is_rst, pushed_value, SpChange,
};
use crate::z80::{hex_label, DecodeError, RegisterSnapshot, INTERRUPT_LABEL, MAIN_LABEL};
use log::trace;

/// How a stack slot got its value, as annotated by ZEsarUX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Push,
    Call,
    Rst,
    Interrupt,
    Default,
}

impl SlotKind {
    fn from_tag(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        if tag.starts_with("push") {
            SlotKind::Push
        } else if tag.starts_with("call") {
            SlotKind::Call
        } else if tag.starts_with("rst") {
            SlotKind::Rst
        } else if tag.contains("interrupt") || tag.starts_with("nmi") {
            SlotKind::Interrupt
        } else {
            SlotKind::Default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub value: u16,
    pub kind: SlotKind,
}

/// Parse the `extended-stack get <n>` response, one `XXXXH <tag>` per line, top of stack first.
pub fn parse_extended_stack(response: &str) -> Result<Vec<StackSlot>> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let malformed = || Error::protocol("extended-stack get", line);
            let (value, tag) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let digits = value
                .strip_suffix('H')
                .or_else(|| value.strip_suffix('h'))
                .ok_or_else(malformed)?;
            if digits.len() != 4 {
                return Err(malformed());
            }
            let value = u16::from_str_radix(digits, 16).map_err(|_| malformed())?;
            Ok(StackSlot {
                value,
                kind: SlotKind::from_tag(tag.trim()),
            })
        })
        .collect()
}

/// Subroutine entered by the `CALL`/`RST` that pushed `return_addr`, if one did.
fn call_target_before(channel: &mut dyn CommandChannel, return_addr: u16) -> Result<Option<u16>> {
    let bytes = channel.read_memory(return_addr.wrapping_sub(3), 3)?;
    Ok(caller_target(&[bytes[0], bytes[1], bytes[2]]))
}

fn sp_delta(from: u16, to: u16) -> i32 {
    to.wrapping_sub(from) as i16 as i32
}

fn opcode_bytes(line: &RegisterSnapshot) -> Result<[u8; 4]> {
    Ok(line.pc_bytes.ok_or(DecodeError::MissingField("(PC)"))?)
}

fn stack_content(channel: &mut dyn CommandChannel, line: &RegisterSnapshot) -> Result<u16> {
    match line.sp_content {
        Some(value) => Ok(value),
        None => channel.read_word(line.sp),
    }
}

/// Build the call stack of the live machine, innermost frame first.
///
/// `slots` is the annotated stack from SP upwards. Every `call`/`rst` slot closes the current
/// frame (named after the entered subroutine) and opens the caller's frame at the return address.
/// An `interrupt` slot does the same with the interrupt label. `push` slots become data of the
/// frame they were pushed in. The last frame is the outermost scope.
pub fn live_call_stack(
    channel: &mut dyn CommandChannel,
    symbols: &dyn SymbolTable,
    pc: u16,
    sp: u16,
    slots: &[StackSlot],
) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut current = Frame::new(pc, sp, "");

    for (index, slot) in slots.iter().enumerate() {
        let slot_sp = sp.wrapping_add(2 * index as u16);
        let name = match slot.kind {
            SlotKind::Push => {
                current.stack.push(slot.value);
                continue;
            }
            SlotKind::Default => continue,
            SlotKind::Interrupt => INTERRUPT_LABEL.to_string(),
            SlotKind::Call | SlotKind::Rst => match call_target_before(channel, slot.value)? {
                Some(target) => symbols.label_or_hex(target),
                None => hex_label(slot.value),
            },
        };
        current.sp = slot_sp;
        current.name = name;
        current.stack.reverse();
        let caller = Frame::new(slot.value, slot_sp.wrapping_add(2), "");
        frames.push(std::mem::replace(&mut current, caller));
    }

    current.name = MAIN_LABEL.to_string();
    current.stack.reverse();
    frames.push(current);
    Ok(frames)
}

/// Virtual call stack maintained while replaying the instruction history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseStack {
    // innermost frame last
    frames: Vec<Frame>,
}

impl ReverseStack {
    /// Seed from a live call stack (innermost first).
    pub fn from_frames(innermost_first: Vec<Frame>) -> Self {
        let mut frames = innermost_first;
        frames.reverse();
        Self { frames }
    }

    /// Frames innermost first.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.iter().rev().cloned().collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of words on all data stacks.
    pub fn data_len(&self) -> usize {
        self.frames.iter().map(|f| f.stack.len()).sum()
    }

    fn top(&mut self, pc: u16, sp: u16) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::new(pc, sp, MAIN_LABEL));
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Account for `count` bytes released from the stack: data words of the innermost frame
    /// first, then the frame itself, until the count is used up or no frame is left.
    fn reconcile(&mut self, count: i32) {
        let mut count = count;
        while count > 0 {
            let Some(top) = self.frames.last_mut() else {
                break;
            };
            if top.stack.pop().is_none() {
                trace!(target: "stack", "leaving frame {}", top.name);
                self.frames.pop();
            }
            count -= 2;
        }
    }

    /// Move from `current` to the older line `previous`, un-executing the instruction at
    /// `previous`.
    pub fn step_back(
        &mut self,
        channel: &mut dyn CommandChannel,
        symbols: &dyn SymbolTable,
        current: &RegisterSnapshot,
        previous: &RegisterSnapshot,
    ) -> Result<()> {
        let bytes = opcode_bytes(previous)?;

        if is_ret(&bytes) && is_conditional_ret_taken(&bytes, previous.flags()) {
            // back inside the subroutine that returned
            let return_addr = previous.sp_content.unwrap_or(current.pc);
            let name = match call_target_before(channel, return_addr)? {
                Some(target) => symbols.label_or_hex(target),
                None => INTERRUPT_LABEL.to_string(),
            };
            trace!(target: "stack", "re-entering {} at {:04X}", name, previous.pc);
            self.frames.push(Frame::new(previous.pc, previous.sp, name));
        } else {
            if is_pop(&bytes) {
                let value = stack_content(channel, previous)?;
                self.top(current.pc, current.sp).stack.push(value);
            }
            self.reconcile(sp_delta(current.sp, previous.sp));
        }

        self.top(previous.pc, previous.sp).addr = previous.pc;
        Ok(())
    }

    /// Move from `current` to the newer line `next`, executing the instruction at `current`.
    pub fn step_forward(
        &mut self,
        channel: &mut dyn CommandChannel,
        symbols: &dyn SymbolTable,
        current: &RegisterSnapshot,
        next: &RegisterSnapshot,
    ) -> Result<()> {
        let bytes = opcode_bytes(current)?;
        let flags = current.flags();
        let sp = current.sp;
        let mut expected_pc = None;

        let expected_sp = if (is_call(&bytes) && is_conditional_call_taken(&bytes, flags))
            || is_rst(&bytes)
        {
            let entered_sp = sp.wrapping_sub(2);
            self.top(current.pc, sp).addr = current.pc.wrapping_add(instruction_len(&bytes));
            self.frames
                .push(Frame::new(next.pc, entered_sp, symbols.label_or_hex(next.pc)));
            Some(entered_sp)
        } else if is_push(&bytes) {
            let value = pushed_value(&bytes, current).unwrap_or_default();
            self.top(current.pc, sp).stack.push(value);
            Some(sp.wrapping_sub(2))
        } else if is_pop(&bytes) || (is_ret(&bytes) && is_conditional_ret_taken(&bytes, flags)) {
            Some(sp.wrapping_add(2))
        } else {
            match direct_sp_change(&bytes, current) {
                SpChange::Delta(delta) => Some(sp.wrapping_add(delta as u16)),
                SpChange::Load(value) => Some(value),
                SpChange::Indeterminate => {
                    expected_pc = Some(current.pc.wrapping_add(instruction_len(&bytes)));
                    None
                }
            }
        };

        // an interrupt between the two lines pushed one more return address
        let interrupted = match (expected_sp, expected_pc) {
            (Some(expected), _) => next.sp == expected.wrapping_sub(2),
            (None, Some(pc)) => next.pc != pc,
            (None, None) => false,
        };

        let released = match expected_sp {
            Some(expected) => sp_delta(sp, expected),
            None if interrupted => sp_delta(sp, next.sp) + 2,
            None => sp_delta(sp, next.sp),
        };
        self.reconcile(released);

        if interrupted {
            let resume = stack_content(channel, next)?;
            trace!(target: "stack", "interrupt at {:04X}, resumes at {:04X}", next.pc, resume);
            self.top(current.pc, sp).addr = resume;
            self.frames.push(Frame::new(next.pc, next.sp, INTERRUPT_LABEL));
        }

        self.top(next.pc, next.sp).addr = next.pc;
        Ok(())
    }
}
