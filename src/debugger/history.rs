use super::session::{is_error_response, CommandChannel};
use crate::error::Result;
use crate::z80::RegisterSnapshot;
use std::collections::HashMap;

/// Previously executed machine states, one per retired instruction.
///
/// Index 0 is the most recently executed instruction, higher indices are older.
pub trait HistorySource: Send {
    /// The line `index` steps back from the live state, `None` past the oldest recorded line.
    fn line(&mut self, channel: &mut dyn CommandChannel, index: usize) -> Result<Option<RegisterSnapshot>>;

    /// Forget cached lines, indices shift whenever the emulator executes.
    fn clear(&mut self);
}

/// ZEsarUX `cpu-history`.
#[derive(Debug, Default)]
pub struct CpuHistory {
    cache: HashMap<usize, RegisterSnapshot>,
}

impl CpuHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistorySource for CpuHistory {
    fn line(&mut self, channel: &mut dyn CommandChannel, index: usize) -> Result<Option<RegisterSnapshot>> {
        if let Some(line) = self.cache.get(&index) {
            return Ok(Some(line.clone()));
        }
        let response = channel.send(&format!("cpu-history get {}", index))?;
        let text = response.trim();
        if text.is_empty() || is_error_response(text) {
            log::debug!(target: "stack", "history ends before index {}: {:?}", index, text);
            return Ok(None);
        }
        let line: RegisterSnapshot = text.parse()?;
        self.cache.insert(index, line.clone());
        Ok(Some(line))
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}
