use super::breakpoints::{Breakpoint, BreakpointManager, BreakpointRequest, Watchpoint};
use super::callstack::{live_call_stack, parse_extended_stack, ReverseStack};
use super::events::{DebugEvent, Events};
use super::history::{CpuHistory, HistorySource};
use super::session::CommandChannel;
use super::sprites::SpriteCache;
use super::stepping::{StepResult, END_OF_HISTORY, START_OF_HISTORY};
use super::Frame;
use crate::config::LaunchConfig;
use crate::error::{Error, Result};
use crate::parser::{parse_console_command, parse_number, ConsoleCommand, Labels, SymbolTable, CONSOLE_HELP};
use crate::z80::opcodes::is_rst;
use crate::z80::registers::is_register_name;
use crate::z80::RegisterSnapshot;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Oldest ZEsarUX with the remote commands used here.
pub const MIN_ZESARUX_VERSION: &str = "7.1";

/// `set-debug-settings` bit: step over interrupt routines.
const DEBUG_SETTING_SKIP_INTERRUPT: u32 = 32;

/// Cursor into the instruction history while stepping backwards.
#[derive(Debug)]
struct ReverseState {
    /// History index of the line the cursor is on, 0 is the newest.
    index: usize,
    line: RegisterSnapshot,
    stack: ReverseStack,
}

/// How the session ends, shared with the channel's close hook.
#[derive(Debug, Clone, Default)]
struct SessionEnd {
    terminating: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
}

impl SessionEnd {
    /// Report the first connection loss as fatal, unless the debugger is terminating.
    fn connection_lost(&self, events: &Events, message: String) {
        if self.terminating.load(Ordering::Acquire) {
            debug!(target: "zesarux", "ignored while terminating: {}", message);
            return;
        }
        if self.lost.swap(true, Ordering::AcqRel) {
            debug!(target: "zesarux", "already reported: {}", message);
            return;
        }
        events.error(message);
        events.emit(DebugEvent::Terminated);
    }
}

/// Debug session state on top of a command channel.
///
/// Owns the register cache, the reverse replay cursor and the sprite cache. All three are
/// dropped on every operation that changes the machine state.
pub struct DebugContext<C: CommandChannel> {
    channel: C,
    labels: Labels,
    breakpoints: BreakpointManager,
    history: Box<dyn HistorySource>,
    events: Events,
    registers: Option<RegisterSnapshot>,
    reverse: Option<ReverseState>,
    sprites: SpriteCache,
    history_size: usize,
    code_coverage: bool,
    skip_interrupt: bool,
    quiet_period: Duration,
    stack_depth: u16,
    max_breakpoints: u16,
    end: SessionEnd,
}

impl<C: CommandChannel> DebugContext<C> {
    pub fn new(channel: C, config: &LaunchConfig, labels: Labels, events: Events) -> Self {
        Self {
            channel,
            labels,
            breakpoints: BreakpointManager::new(config.max_breakpoints),
            history: Box::new(CpuHistory::new()),
            events,
            registers: None,
            reverse: None,
            sprites: SpriteCache::new(),
            history_size: config.history_size,
            code_coverage: config.code_coverage,
            skip_interrupt: config.skip_interrupt,
            quiet_period: config.quiet_period(),
            stack_depth: config.stack_depth,
            max_breakpoints: config.max_breakpoints,
            end: SessionEnd::default(),
        }
    }

    /// Replace the instruction history backend.
    pub fn with_history(mut self, history: Box<dyn HistorySource>) -> Self {
        self.history = history;
        self
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    pub fn is_reverse_active(&self) -> bool {
        self.reverse.is_some()
    }

    pub fn is_terminating(&self) -> bool {
        self.end.terminating.load(Ordering::Acquire)
    }

    /// The emulator went away and the session is over.
    pub fn is_connection_lost(&self) -> bool {
        self.end.lost.load(Ordering::Acquire)
    }

    // ---------------------------------- session ----------------------------------------------

    /// Check the emulator version and put it into a known debugging state.
    pub fn init(&mut self) -> Result<()> {
        let end = self.end.clone();
        let events = self.events.clone();
        self.channel.on_close(Box::new(move |reason| {
            end.connection_lost(&events, Error::ChannelClosed(reason).to_string())
        }));

        let about = self.channel.send("about")?;
        info!(target: "zesarux", "{}", about.trim());

        let version = self.channel.send("get-version")?;
        let version = version.trim();
        if !version_at_least(version, MIN_ZESARUX_VERSION) {
            let err = Error::VersionTooOld {
                found: version.to_string(),
                required: MIN_ZESARUX_VERSION.to_string(),
            };
            self.events.error(err.to_string());
            self.end.terminating.store(true, Ordering::Release);
            self.channel.shutdown();
            return Err(err);
        }
        info!(target: "zesarux", "ZEsarUX version {}", version);
        self.events.log(format!("Connected to ZEsarUX {}", version));

        self.channel.send_checked("close-all-menus")?;
        self.channel.send_checked("clear-membreakpoints")?;
        self.channel.send_checked("enable-breakpoints")?;
        for id in 1..=self.max_breakpoints {
            self.channel.send_checked(&format!("disable-breakpoint {}", id))?;
        }
        let settings = if self.skip_interrupt { DEBUG_SETTING_SKIP_INTERRUPT } else { 0 };
        self.channel.send_checked(&format!("set-debug-settings {}", settings))?;
        self.channel.send_checked("cpu-history enabled yes")?;
        self.channel
            .send_checked(&format!("cpu-history set-max-size {}", self.history_size))?;
        self.channel.send_checked("cpu-history started yes")?;
        let coverage = if self.code_coverage { "yes" } else { "no" };
        self.channel
            .send_checked(&format!("cpu-code-coverage enabled {}", coverage))?;
        self.channel.send_checked("extended-stack enabled yes")?;

        self.channel.wait_until_quiet(self.quiet_period)?;
        self.events.emit(DebugEvent::Initialized);
        Ok(())
    }

    /// End the session; connection errors from here on are expected and not reported.
    pub fn terminate(&mut self) {
        if self.end.terminating.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.breakpoints.remove_all(&mut self.channel) {
            debug!(target: "zesarux", "removing breakpoints on terminate: {}", err);
        }
        if let Err(err) = self.channel.send("disable-breakpoints") {
            debug!(target: "zesarux", "disable-breakpoints on terminate: {}", err);
        }
        self.channel.shutdown();
        self.events.emit(DebugEvent::Terminated);
    }

    /// Forward an error to the event stream. A lost connection ends the session, except while
    /// terminating where it is expected.
    pub fn report_error(&self, err: &Error) {
        match err {
            Error::ChannelClosed(_) => self.end.connection_lost(&self.events, err.to_string()),
            _ => self.events.error(err.to_string()),
        }
    }

    /// Drop everything derived from the machine state.
    pub fn invalidate(&mut self) {
        self.registers = None;
        self.history.clear();
        self.sprites.invalidate();
    }

    fn leave_reverse(&mut self) {
        if self.reverse.take().is_some() {
            debug!(target: "stack", "back to live execution");
        }
    }

    // ---------------------------------- machine state ----------------------------------------

    /// Registers at the cursor: the replayed line in reverse mode, the live CPU otherwise.
    pub fn registers(&mut self) -> Result<RegisterSnapshot> {
        if let Some(state) = &self.reverse {
            return Ok(state.line.clone());
        }
        self.live_registers()
    }

    fn live_registers(&mut self) -> Result<RegisterSnapshot> {
        if let Some(regs) = &self.registers {
            return Ok(regs.clone());
        }
        let response = self.channel.send_checked("get-registers")?;
        let regs: RegisterSnapshot = response.trim().parse()?;
        self.registers = Some(regs.clone());
        Ok(regs)
    }

    pub fn set_register(&mut self, name: &str, value: u16) -> Result<RegisterSnapshot> {
        if !is_register_name(name) {
            return Err(Error::InvalidArgument(format!("unknown register {}", name)));
        }
        self.leave_reverse();
        self.channel
            .send_checked(&format!("set-register {}={}", name.to_ascii_uppercase(), value))?;
        self.invalidate();
        self.live_registers()
    }

    pub fn read_memory(&mut self, addr: u16, len: u16) -> Result<Vec<u8>> {
        self.channel.read_memory(addr, len)
    }

    pub fn write_memory(&mut self, addr: u16, bytes: &[u8]) -> Result<()> {
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        self.channel
            .send_checked(&format!("write-memory-raw {} {}", addr, hex))?;
        self.sprites.invalidate();
        Ok(())
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.channel
            .send_checked(&format!("write-memory {} {}", addr, value))?;
        self.sprites.invalidate();
        Ok(())
    }

    pub fn disassemble(&mut self, addr: u16) -> Result<String> {
        let response = self.channel.send_checked(&format!("disassemble {}", addr))?;
        Ok(response.trim().to_string())
    }

    /// Address of a label, or the value of a number in any of the usual notations.
    pub fn resolve_address(&self, text: &str) -> Result<u16> {
        if let Some(addr) = self.labels.address_of(text) {
            return Ok(addr);
        }
        if let Some(value) = parse_number(text) {
            return u16::try_from(value)
                .map_err(|_| Error::InvalidArgument(format!("address out of range: {}", text)));
        }
        Err(Error::UnknownLabel(text.to_string()))
    }

    // ---------------------------------- call stack -------------------------------------------

    /// Call stack at the cursor, innermost frame first.
    pub fn stack_trace(&mut self) -> Result<Vec<Frame>> {
        if let Some(state) = &self.reverse {
            return Ok(state.stack.frames());
        }
        self.live_stack_trace()
    }

    /// Call stack of the live machine built from `extended-stack get`.
    pub fn live_stack_trace(&mut self) -> Result<Vec<Frame>> {
        let regs = self.live_registers()?;
        let response = self
            .channel
            .send_checked(&format!("extended-stack get {}", self.stack_depth))?;
        let slots = parse_extended_stack(&response)?;
        live_call_stack(&mut self.channel, &self.labels, regs.pc, regs.sp, &slots)
    }

    // ---------------------------------- breakpoints ------------------------------------------

    pub fn set_breakpoint(&mut self, request: BreakpointRequest) -> Result<Breakpoint> {
        self.breakpoints
            .set_breakpoint(&mut self.channel, &self.labels, &self.events, request)
    }

    pub fn remove_breakpoint(&mut self, id: u16) -> Result<()> {
        self.breakpoints.remove_breakpoint(&mut self.channel, id)
    }

    pub fn remove_all_breakpoints(&mut self) -> Result<()> {
        self.breakpoints.remove_all(&mut self.channel)
    }

    pub fn set_watchpoint(&mut self, watchpoint: Watchpoint) -> Result<()> {
        self.breakpoints
            .set_watchpoint(&mut self.channel, &self.events, watchpoint)
    }

    pub fn remove_watchpoint(&mut self, addr: u16, size: u16) -> Result<()> {
        self.breakpoints.remove_watchpoint(&mut self.channel, addr, size)
    }

    // ---------------------------------- live execution ---------------------------------------

    pub fn continue_(&mut self) -> Result<StepResult> {
        if self.reverse.is_some() {
            return self.replay_continue();
        }
        self.live_operation(Self::run_live)
    }

    pub fn step_into(&mut self) -> Result<StepResult> {
        if self.reverse.is_some() {
            let reason = if self.step_forward_once()? { None } else { Some(END_OF_HISTORY.to_string()) };
            return self.replay_result(reason);
        }
        self.live_operation(|ctx| ctx.channel.send_checked("cpu-step").map(|_| None))
    }

    /// Step over calls. `RST` may be followed by inline data, so it is stepped over with a
    /// temporary breakpoint on the next byte instead of `cpu-step-over`.
    pub fn step_over(&mut self) -> Result<StepResult> {
        if self.reverse.is_some() {
            return self.replay_step_over();
        }
        let pc = self.live_registers()?.pc;
        let opcode = self.channel.read_memory(pc, 1)?;
        if is_rst(&opcode) {
            let condition = format!("PC={:04X}H", pc.wrapping_add(1));
            return self.live_operation(move |ctx| ctx.run_to(&condition));
        }
        self.live_operation(|ctx| ctx.channel.send_checked("cpu-step-over").map(|_| None))
    }

    /// Run until the innermost frame returns to its caller.
    pub fn step_out(&mut self) -> Result<StepResult> {
        if self.reverse.is_some() {
            return self.replay_step_out();
        }
        let frames = self.live_stack_trace()?;
        match frames.as_slice() {
            [inner, caller, ..] => {
                let condition = format!("PC={:04X}H AND SP>{:04X}H", caller.addr, inner.sp);
                self.live_operation(move |ctx| ctx.run_to(&condition))
            }
            _ => self.live_operation(Self::run_live),
        }
    }

    fn run_live(&mut self) -> Result<Option<String>> {
        let response = self.channel.run()?;
        Ok(stop_reason(&response))
    }

    fn run_to(&mut self, condition: &str) -> Result<Option<String>> {
        self.breakpoints.arm_transient(&mut self.channel, condition)?;
        let stopped = self.run_live();
        self.breakpoints.disarm_transient(&mut self.channel)?;
        stopped
    }

    /// Common frame of every live operation: timing, disassembly, coverage and cache cleanup.
    fn live_operation(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<Option<String>>,
    ) -> Result<StepResult> {
        self.leave_reverse();
        self.invalidate();
        self.channel.send_checked("reset-tstates-partial")?;
        let reason = operation(self);
        // the machine may have moved even if the operation failed
        self.invalidate();
        let reason = reason?;

        let tstates = self
            .channel
            .send_checked("get-tstates-partial")
            .ok()
            .and_then(|t| t.trim().parse().ok());
        let cpu_freq = self
            .channel
            .send_checked("get-cpu-frequency")
            .ok()
            .and_then(|f| f.trim().parse().ok());
        let pc = self.live_registers()?.pc;
        let instruction = self.disassemble(pc)?;
        self.emit_coverage()?;

        Ok(StepResult {
            instruction,
            reason,
            tstates,
            cpu_freq,
            error: None,
        })
    }

    // ---------------------------------- reverse execution ------------------------------------

    pub fn step_back(&mut self) -> Result<StepResult> {
        let reason = if self.step_back_once()? { None } else { Some(START_OF_HISTORY.to_string()) };
        self.replay_result(reason)
    }

    /// Step back until a breakpoint address or the start of the history.
    pub fn reverse_continue(&mut self) -> Result<StepResult> {
        let reason = loop {
            if !self.step_back_once()? {
                break START_OF_HISTORY.to_string();
            }
            if let Some(reason) = self.breakpoint_at_cursor() {
                break reason;
            }
        };
        self.replay_result(Some(reason))
    }

    fn replay_step_over(&mut self) -> Result<StepResult> {
        let start = self.reverse_depth();
        loop {
            if !self.step_forward_once()? {
                return self.replay_result(Some(END_OF_HISTORY.to_string()));
            }
            if self.reverse_depth() <= start {
                return self.replay_result(None);
            }
        }
    }

    fn replay_step_out(&mut self) -> Result<StepResult> {
        let start = self.reverse_depth();
        loop {
            if !self.step_forward_once()? {
                return self.step_out();
            }
            if self.reverse_depth() < start {
                return self.replay_result(None);
            }
        }
    }

    /// Replay forward to the next breakpoint, continuing live once the history is used up.
    fn replay_continue(&mut self) -> Result<StepResult> {
        loop {
            if !self.step_forward_once()? {
                return self.live_operation(Self::run_live);
            }
            if let Some(reason) = self.breakpoint_at_cursor() {
                return self.replay_result(Some(reason));
            }
        }
    }

    fn reverse_depth(&self) -> usize {
        self.reverse.as_ref().map_or(0, |state| state.stack.depth())
    }

    fn breakpoint_at_cursor(&self) -> Option<String> {
        let pc = self.reverse.as_ref()?.line.pc;
        if self.breakpoints.has_address(pc) {
            Some(format!("Break: breakpoint at {:04X}h", pc))
        } else {
            None
        }
    }

    /// Move the cursor one line back, entering reverse mode on the first step.
    ///
    /// Returns false when there is no older line.
    fn step_back_once(&mut self) -> Result<bool> {
        let (index, current) = if let Some(state) = &self.reverse {
            (state.index + 1, state.line.clone())
        } else {
            (0, self.live_registers()?)
        };
        let Some(previous) = self.history.line(&mut self.channel, index)? else {
            debug!(target: "stack", "no history line {}", index);
            return Ok(false);
        };

        if self.reverse.is_none() {
            let frames = self.live_stack_trace()?;
            debug!(target: "stack", "entering reverse mode with {} frames", frames.len());
            self.reverse = Some(ReverseState {
                index,
                line: current.clone(),
                stack: ReverseStack::from_frames(frames),
            });
        }
        if let Some(state) = self.reverse.as_mut() {
            state
                .stack
                .step_back(&mut self.channel, &self.labels, &current, &previous)?;
            state.index = index;
            state.line = previous;
        }
        Ok(true)
    }

    /// Move the cursor one line forward.
    ///
    /// Returns false once the cursor passes the newest line; reverse mode is over then.
    fn step_forward_once(&mut self) -> Result<bool> {
        let (index, current) = match &self.reverse {
            Some(state) => (state.index, state.line.clone()),
            None => return Ok(false),
        };
        if index == 0 {
            self.leave_reverse();
            return Ok(false);
        }
        let index = index - 1;
        let Some(next) = self.history.line(&mut self.channel, index)? else {
            warn!(target: "stack", "history line {} vanished during replay", index);
            self.leave_reverse();
            return Ok(false);
        };
        if let Some(state) = self.reverse.as_mut() {
            state
                .stack
                .step_forward(&mut self.channel, &self.labels, &current, &next)?;
            state.index = index;
            state.line = next;
        }
        Ok(true)
    }

    fn replay_result(&mut self, reason: Option<String>) -> Result<StepResult> {
        self.sprites.invalidate();
        let pc = self.registers()?.pc;
        let instruction = self.disassemble(pc)?;
        Ok(StepResult {
            instruction,
            reason,
            ..StepResult::default()
        })
    }

    // ---------------------------------- coverage ---------------------------------------------

    /// Send the addresses executed since the last stop, if coverage is on.
    pub fn emit_coverage(&mut self) -> Result<()> {
        if !self.code_coverage {
            return Ok(());
        }
        let command = "cpu-code-coverage get";
        let response = self.channel.send_checked(command)?;
        let addresses = response
            .split_whitespace()
            .map(|token| {
                let digits = token.trim_end_matches(|c: char| c == 'H' || c == 'h');
                u16::from_str_radix(digits, 16).map_err(|_| Error::protocol(command, &response))
            })
            .collect::<Result<BTreeSet<u16>>>()?;
        self.channel.send_checked("cpu-code-coverage clear")?;
        self.events.emit(DebugEvent::Coverage(addresses));
        Ok(())
    }

    // ---------------------------------- debug console ----------------------------------------

    /// Run a debug console line and return the text to show.
    pub fn evaluate(&mut self, line: &str) -> Result<String> {
        let command = parse_console_command(line).map_err(Error::InvalidArgument)?;
        match command {
            ConsoleCommand::Help => Ok(CONSOLE_HELP.to_string()),
            ConsoleCommand::Exec(raw) => {
                self.leave_reverse();
                let response = self.channel.send(&raw);
                self.invalidate();
                Ok(response?.trim_end().to_string())
            }
            ConsoleCommand::MemoryDump { addr, len } => {
                let addr = self.resolve_address(&addr)?;
                let bytes = self.channel.read_memory(addr, len)?;
                Ok(format_dump(addr, &bytes))
            }
            ConsoleCommand::Label(text) => self.describe_label(&text),
            ConsoleCommand::WatchAdd { addr, size, access } => {
                let addr = self.resolve_address(&addr)?;
                self.set_watchpoint(Watchpoint {
                    addr,
                    size,
                    access,
                    condition: None,
                })?;
                Ok(format!(
                    "Watchpoint set at {:04X}h, size {}, access {}",
                    addr, size, access
                ))
            }
            ConsoleCommand::WatchRemove { addr, size } => {
                let addr = self.resolve_address(&addr)?;
                self.remove_watchpoint(addr, size)?;
                Ok(format!("Watchpoint removed at {:04X}h, size {}", addr, size))
            }
            ConsoleCommand::Patterns { index, count } => {
                let patterns = self.sprites.patterns(&mut self.channel, index, count)?;
                let text: Vec<String> = patterns
                    .iter()
                    .enumerate()
                    .map(|(i, bytes)| {
                        let rows: Vec<String> = bytes
                            .chunks(16)
                            .map(hex_bytes)
                            .collect();
                        format!("Pattern {}:\n{}", index as usize + i, rows.join("\n"))
                    })
                    .collect();
                Ok(text.join("\n"))
            }
            ConsoleCommand::Sprites { slot, count } => {
                let palette = self.sprites.active_palette_index(&mut self.channel)?;
                let sprites = self.sprites.sprites(&mut self.channel, slot, count)?;
                let mut lines = vec![format!("Sprite palette: {}", palette)];
                lines.extend(sprites.iter().map(|s| {
                    format!(
                        "{:3}: x={} y={} pattern={} palette offset={} {}{}{}{}",
                        s.slot,
                        s.x,
                        s.y,
                        s.pattern,
                        s.palette_offset,
                        if s.visible { "visible" } else { "hidden" },
                        if s.mirror_x { " mirror-x" } else { "" },
                        if s.mirror_y { " mirror-y" } else { "" },
                        if s.rotate { " rotated" } else { "" },
                    )
                }));
                Ok(lines.join("\n"))
            }
            ConsoleCommand::Palette(index) => {
                let index = match index {
                    Some(index) => index,
                    None => self.sprites.active_palette_index(&mut self.channel)?,
                };
                let colours = self.sprites.palette(&mut self.channel, index)?;
                let mut lines = vec![format!("Sprite palette {} (RGB333):", index)];
                lines.extend(colours.chunks(16).enumerate().map(|(row, chunk)| {
                    let entries: Vec<String> = chunk.iter().map(|c| format!("{:03X}", c)).collect();
                    format!("{:02X}: {}", row * 16, entries.join(" "))
                }));
                Ok(lines.join("\n"))
            }
            ConsoleCommand::Lookup(name) => {
                let regs = self.registers()?;
                if let Some(value) = regs.get(&name) {
                    return Ok(format!("{}: {:04X}h ({})", name.to_ascii_uppercase(), value, value));
                }
                self.describe_label(&name)
            }
        }
    }

    fn describe_label(&self, text: &str) -> Result<String> {
        if let Some(addr) = self.labels.address_of(text) {
            return Ok(format!("{}: {:04X}h", text, addr));
        }
        let addr = parse_number(text)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| Error::UnknownLabel(text.to_string()))?;
        let names = self.labels.labels_for(addr);
        if names.is_empty() {
            Ok(format!("{:04X}h: no label", addr))
        } else {
            Ok(format!("{:04X}h: {}", addr, names.join(", ")))
        }
    }
}

/// Compare dotted version numbers, ignoring any suffix such as `-SN`.
pub fn version_at_least(found: &str, required: &str) -> bool {
    fn parts(version: &str) -> Vec<u32> {
        version
            .split('.')
            .map_while(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().ok()
            })
            .collect()
    }
    let found = parts(found);
    !found.is_empty() && found >= parts(required)
}

/// First line of every `run` response.
const RUN_BANNER: &str = "Running until a breakpoint";

/// The line of a `run` response that says why execution stopped.
fn stop_reason(response: &str) -> Option<String> {
    let lines: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(RUN_BANNER))
        .collect();
    lines
        .iter()
        .find(|l| l.starts_with("Break"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_dump(addr: u16, bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let row_addr = addr.wrapping_add((row * 16) as u16);
            let ascii: String = chunk
                .iter()
                .map(|&b| if (0x20..0x7f).contains(&b) { b as char } else { '.' })
                .collect();
            format!("{:04X}h: {:<47}  {}", row_addr, hex_bytes(chunk), ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
