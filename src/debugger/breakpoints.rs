use super::events::Events;
use super::session::{is_error_response, CommandChannel};
use crate::error::{Error, Result};
use crate::parser::{translate_condition, SymbolTable};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of breakpoint slots of ZEsarUX.
pub const MAX_BREAKPOINTS: u16 = 100;

/// Free list of breakpoint ids `1..=max`; freed ids are handed out again first.
#[derive(Debug, Clone)]
pub struct IdPool {
    free: Vec<u16>,
    allocated: Vec<bool>,
}

impl IdPool {
    pub fn new(max: u16) -> Self {
        Self {
            free: (1..=max).rev().collect(),
            allocated: vec![false; max as usize + 1],
        }
    }

    pub fn allocate(&mut self) -> Option<u16> {
        let id = self.free.pop()?;
        self.allocated[id as usize] = true;
        Some(id)
    }

    /// Return `id` to the pool, false if it was not allocated.
    pub fn release(&mut self, id: u16) -> bool {
        match self.allocated.get_mut(id as usize) {
            Some(slot) if *slot => {
                *slot = false;
                self.free.push(id);
                true
            }
            _ => false,
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// What the editor asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointRequest {
    /// `None` breaks on the condition alone, at any address.
    pub address: Option<u16>,
    /// Condition in the portable syntax.
    pub condition: Option<String>,
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u16,
    pub address: Option<u16>,
    pub condition: Option<String>,
    /// Condition as sent to the emulator.
    pub native_condition: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchAccess {
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl FromStr for WatchAccess {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(WatchAccess::Read),
            "w" | "write" => Ok(WatchAccess::Write),
            "rw" | "wr" | "readwrite" => Ok(WatchAccess::ReadWrite),
            other => Err(format!("invalid access {:?}, expected r, w or rw", other)),
        }
    }
}

impl fmt::Display for WatchAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WatchAccess::Read => "r",
            WatchAccess::Write => "w",
            WatchAccess::ReadWrite => "rw",
        };
        f.write_str(text)
    }
}

/// Memory access breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    pub addr: u16,
    pub size: u16,
    pub access: WatchAccess,
    pub condition: Option<String>,
}

/// Owns the emulator's breakpoint slots and the registered watchpoints.
#[derive(Debug)]
pub struct BreakpointManager {
    pool: IdPool,
    /// Slot reserved for the temporary breakpoints of step-out and step-over.
    transient_id: u16,
    breakpoints: BTreeMap<u16, Breakpoint>,
    watchpoints: Vec<Watchpoint>,
}

impl BreakpointManager {
    /// Slots `1..max`, `max` itself is kept for transient breakpoints.
    pub fn new(max: u16) -> Self {
        Self {
            pool: IdPool::new(max.saturating_sub(1)),
            transient_id: max,
            breakpoints: BTreeMap::new(),
            watchpoints: Vec::new(),
        }
    }

    pub fn transient_id(&self) -> u16 {
        self.transient_id
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn watchpoints(&self) -> &[Watchpoint] {
        &self.watchpoints
    }

    /// True if an unconditional or conditional breakpoint sits at `addr`.
    pub fn has_address(&self, addr: u16) -> bool {
        self.breakpoints
            .values()
            .any(|bp| bp.verified && bp.address == Some(addr))
    }

    pub fn set_breakpoint(
        &mut self,
        channel: &mut dyn CommandChannel,
        symbols: &dyn SymbolTable,
        events: &Events,
        request: BreakpointRequest,
    ) -> Result<Breakpoint> {
        let mut request = request;
        if let Some(message) = request.log_message.take() {
            events.warning(format!(
                "log points are not supported by ZEsarUX, `{}` becomes a plain breakpoint",
                message
            ));
            request.condition = None;
        }
        if request.address.is_none() && request.condition.is_none() {
            return Err(Error::InvalidArgument(
                "a breakpoint needs an address or a condition".to_string(),
            ));
        }

        let id = self.pool.allocate().ok_or(Error::NoBreakpointId)?;
        let native_condition = native_condition(request.address, request.condition.as_deref(), symbols);

        let response = channel.send(&format!("set-breakpoint {} {}", id, native_condition))?;
        let verified = if is_error_response(&response) {
            events.warning(format!(
                "breakpoint `{}` rejected by ZEsarUX: {}",
                native_condition,
                response.trim()
            ));
            false
        } else {
            channel.send_checked(&format!("enable-breakpoint {}", id))?;
            true
        };

        let breakpoint = Breakpoint {
            id,
            address: request.address,
            condition: request.condition,
            native_condition,
            verified,
        };
        if verified {
            log::debug!(target: "breakpoints", "breakpoint {} set: {}", id, breakpoint.native_condition);
            self.breakpoints.insert(id, breakpoint.clone());
        } else {
            self.pool.release(id);
        }
        Ok(breakpoint)
    }

    pub fn remove_breakpoint(&mut self, channel: &mut dyn CommandChannel, id: u16) -> Result<()> {
        if self.breakpoints.remove(&id).is_none() {
            return Err(Error::InvalidArgument(format!("no breakpoint with id {}", id)));
        }
        self.pool.release(id);
        channel.send_checked(&format!("disable-breakpoint {}", id))?;
        Ok(())
    }

    pub fn remove_all(&mut self, channel: &mut dyn CommandChannel) -> Result<()> {
        let ids: Vec<u16> = self.breakpoints.keys().copied().collect();
        for id in ids {
            self.remove_breakpoint(channel, id)?;
        }
        Ok(())
    }

    /// Conditional watchpoints cannot be expressed as ZEsarUX memory breakpoints and are refused.
    pub fn set_watchpoint(
        &mut self,
        channel: &mut dyn CommandChannel,
        events: &Events,
        watchpoint: Watchpoint,
    ) -> Result<()> {
        if watchpoint.condition.as_deref().map_or(false, |c| !c.trim().is_empty()) {
            let msg = format!(
                "watchpoint at {:04X}h not set: ZEsarUX does not support conditions on memory breakpoints",
                watchpoint.addr
            );
            events.warning(msg.clone());
            return Err(Error::Unsupported(msg));
        }
        channel.send_checked(&format!(
            "set-membreakpoint {:04X}h {} {}",
            watchpoint.addr, watchpoint.access as u8, watchpoint.size
        ))?;
        self.watchpoints
            .retain(|w| !(w.addr == watchpoint.addr && w.size == watchpoint.size));
        self.watchpoints.push(watchpoint);
        Ok(())
    }

    pub fn remove_watchpoint(
        &mut self,
        channel: &mut dyn CommandChannel,
        addr: u16,
        size: u16,
    ) -> Result<()> {
        channel.send_checked(&format!("set-membreakpoint {:04X}h 0 {}", addr, size))?;
        self.watchpoints.retain(|w| !(w.addr == addr && w.size == size));
        Ok(())
    }

    /// Arm the reserved slot with a raw ZEsarUX condition.
    pub fn arm_transient(&mut self, channel: &mut dyn CommandChannel, native_condition: &str) -> Result<()> {
        channel.send_checked(&format!(
            "set-breakpoint {} {}",
            self.transient_id, native_condition
        ))?;
        channel.send_checked(&format!("enable-breakpoint {}", self.transient_id))?;
        Ok(())
    }

    pub fn disarm_transient(&mut self, channel: &mut dyn CommandChannel) -> Result<()> {
        channel.send_checked(&format!("disable-breakpoint {}", self.transient_id))?;
        Ok(())
    }
}

/// `PC=XXXXH`, joined with the translated condition if there is one.
pub fn native_condition(address: Option<u16>, condition: Option<&str>, symbols: &dyn SymbolTable) -> String {
    let condition = condition
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| translate_condition(c, symbols));
    match (address, condition) {
        (Some(addr), Some(cond)) => format!("PC={:04X}H AND ({})", addr, cond),
        (Some(addr), None) => format!("PC={:04X}H", addr),
        (None, Some(cond)) => cond,
        (None, None) => String::new(),
    }
}
