mod breakpoints;
mod callstack;
mod context;
mod events;
mod history;
mod session;
mod sprites;
mod stepping;

pub use breakpoints::{
    native_condition, Breakpoint, BreakpointManager, BreakpointRequest, IdPool, WatchAccess,
    Watchpoint, MAX_BREAKPOINTS,
};
pub use callstack::{live_call_stack, parse_extended_stack, ReverseStack, SlotKind, StackSlot};
pub use context::{version_at_least, DebugContext, MIN_ZESARUX_VERSION};
pub use events::{DebugEvent, Events};
pub use history::{CpuHistory, HistorySource};
pub use session::{
    is_error_response, CloseHook, CommandChannel, Interrupter, PendingReply, ZesaruxSocket,
    RUN_COMMAND,
};
pub use sprites::{SpriteAttributes, SpriteCache};
pub use stepping::{
    ExecutionGuard, ExecutionTicket, RunMode, StepResult, END_OF_HISTORY, START_OF_HISTORY,
};

/// One entry of the call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Current address for the innermost frame, return address for the others.
    pub addr: u16,
    /// SP at the time the frame was entered.
    pub sp: u16,
    /// Label of the entered subroutine, an address in hex or a sentinel label.
    pub name: String,
    /// Words pushed since the frame was entered, last pushed last.
    pub stack: Vec<u16>,
}

impl Frame {
    pub fn new(addr: u16, sp: u16, name: impl Into<String>) -> Self {
        Self {
            addr,
            sp,
            name: name.into(),
            stack: Vec::new(),
        }
    }
}
