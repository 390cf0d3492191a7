use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stop reason when a backward replay runs out of recorded lines.
pub const START_OF_HISTORY: &str = "Break: Reached start of instruction history.";
/// Stop reason when a forward replay arrives back at the live machine state.
pub const END_OF_HISTORY: &str = "Break: Reached end of instruction history.";

/// Run modes for the debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continue,
    StepOver,
    StepInto,
    StepOut,
    StepBack,
    ReverseContinue,
}

impl RunMode {
    /// DAP `stopped` reason reported after the operation.
    pub fn stop_reason(self) -> &'static str {
        match self {
            RunMode::Continue | RunMode::ReverseContinue => "breakpoint",
            RunMode::StepOver | RunMode::StepInto | RunMode::StepOut | RunMode::StepBack => "step",
        }
    }
}

/// Outcome of a step or continue.
///
/// A non-empty `error` means the operation failed, whatever the other fields say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    /// Disassembly at the stop address.
    pub instruction: String,
    /// Why execution stopped, for instance a breakpoint hit or the end of the history.
    pub reason: Option<String>,
    /// T-states executed by the operation.
    pub tstates: Option<u64>,
    /// CPU clock in Hz.
    pub cpu_freq: Option<u32>,
    pub error: Option<String>,
}

impl StepResult {
    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.as_deref().map_or(false, |e| !e.is_empty())
    }

    /// Line for the debug console, e.g. `8003 LD A,(HL)  (7 T-states, 2.00 us)`.
    pub fn summary(&self) -> String {
        let mut text = self.instruction.clone();
        if let Some(tstates) = self.tstates {
            text.push_str(&format!("  ({} T-states", tstates));
            if let Some(freq) = self.cpu_freq.filter(|f| *f > 0) {
                let micros = tstates as f64 * 1_000_000.0 / freq as f64;
                text.push_str(&format!(", {:.2} us", micros));
            }
            text.push(')');
        }
        if let Some(reason) = &self.reason {
            text.push_str(&format!("\n{}", reason));
        }
        text
    }
}

/// Rejects a step or continue while another one is still running.
#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of one operation; dropping it frees the guard.
#[derive(Debug)]
pub struct ExecutionTicket {
    running: Arc<AtomicBool>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Result<ExecutionTicket> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(ExecutionTicket {
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for ExecutionTicket {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
