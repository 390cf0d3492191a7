#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use zesarux_dap::debugger::{CloseHook, CommandChannel, HistorySource};
use zesarux_dap::z80::RegisterSnapshot;
use zesarux_dap::Result;

/// In-memory stand-in for ZEsarUX.
///
/// `read-memory` is answered from `memory`, every other command from the scripted responses
/// (the last scripted response of a command repeats), anything unscripted gets an empty answer.
pub struct MockEmulator {
    pub memory: Vec<u8>,
    pub responses: HashMap<String, VecDeque<String>>,
    pub run_responses: VecDeque<String>,
    pub sent: Vec<String>,
    pub closed: bool,
    pub close_hook: Option<CloseHook>,
}

impl MockEmulator {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            responses: HashMap::new(),
            run_responses: VecDeque::new(),
            sent: Vec::new(),
            closed: false,
            close_hook: None,
        }
    }

    pub fn respond(&mut self, command: &str, response: &str) -> &mut Self {
        self.responses
            .entry(command.to_string())
            .or_default()
            .push_back(response.to_string());
        self
    }

    pub fn poke(&mut self, addr: u16, bytes: &[u8]) -> &mut Self {
        for (i, b) in bytes.iter().enumerate() {
            self.memory[addr.wrapping_add(i as u16) as usize] = *b;
        }
        self
    }

    /// Behave like a socket whose peer went away.
    pub fn lose_connection(&mut self, reason: &str) {
        self.closed = true;
        if let Some(hook) = self.close_hook.take() {
            hook(reason.to_string());
        }
    }

    pub fn sent_matching(&self, prefix: &str) -> Vec<String> {
        self.sent
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl CommandChannel for MockEmulator {
    fn send(&mut self, command: &str) -> Result<String> {
        self.sent.push(command.to_string());
        if let Some(args) = command.strip_prefix("read-memory ") {
            let mut parts = args.split_whitespace().map(|p| p.parse::<usize>().unwrap());
            let addr = parts.next().unwrap();
            let len = parts.next().unwrap();
            return Ok((0..len)
                .map(|i| format!("{:02X}", self.memory[(addr + i) & 0xFFFF]))
                .collect());
        }
        Ok(match self.responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => String::new(),
        })
    }

    fn run(&mut self) -> Result<String> {
        self.sent.push("run".to_string());
        Ok(self.run_responses.pop_front().unwrap_or_default())
    }

    fn shutdown(&mut self) {
        self.closed = true;
    }

    fn on_close(&mut self, hook: CloseHook) {
        self.close_hook = Some(hook);
    }
}

/// Recorded instruction history, index 0 is the newest line.
pub struct VecHistory {
    pub lines: Vec<RegisterSnapshot>,
}

impl VecHistory {
    /// Lines given oldest first, the way they were executed.
    pub fn from_oldest_first(mut lines: Vec<RegisterSnapshot>) -> Self {
        lines.reverse();
        Self { lines }
    }
}

impl HistorySource for VecHistory {
    fn line(
        &mut self,
        _channel: &mut dyn CommandChannel,
        index: usize,
    ) -> Result<Option<RegisterSnapshot>> {
        Ok(self.lines.get(index).cloned())
    }

    fn clear(&mut self) {}
}

/// A register dump in the ZEsarUX format.
pub fn reg_dump(pc: u16, sp: u16, flags: &str) -> String {
    format!(
        "PC={:04x} SP={:04x} AF=00{:02x} BC=1234 HL=5678 DE=9abc IX=ffff IY=5c3a AF'=0044 BC'=ffff HL'=ffff DE'=5cb9 I=3f R=78  F={} F'=-Z---P-- MEMPTR=0000 IM1 IFF-- VPS: 0",
        pc,
        sp,
        zesarux_dap::z80::decode_flags(flags).unwrap(),
        flags
    )
}

/// A history line: register dump plus the opcode bytes at PC and the word at SP.
pub fn history_dump(pc: u16, sp: u16, flags: &str, opcode: [u8; 4], sp_content: u16) -> String {
    format!(
        "{} (PC)={:02x}{:02x}{:02x}{:02x} (SP)={:04x}",
        reg_dump(pc, sp, flags),
        opcode[0],
        opcode[1],
        opcode[2],
        opcode[3],
        sp_content
    )
}

pub fn history_line(pc: u16, sp: u16, opcode: [u8; 4], sp_content: u16) -> RegisterSnapshot {
    flagged_history_line(pc, sp, "--------", opcode, sp_content)
}

/// History line with the flags in the `F=` notation, e.g. `-Z------`.
pub fn flagged_history_line(
    pc: u16,
    sp: u16,
    flags: &str,
    opcode: [u8; 4],
    sp_content: u16,
) -> RegisterSnapshot {
    history_dump(pc, sp, flags, opcode, sp_content).parse().unwrap()
}
