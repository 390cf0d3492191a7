use log::{error, info, warn};
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;

/// Events produced for the surrounding debug adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Initialized,
    Terminated,
    Error(String),
    Warning(String),
    Log(String),
    Coverage(BTreeSet<u16>),
}

/// Sending side of the event stream, a no-op when nobody listens.
#[derive(Debug, Clone, Default)]
pub struct Events {
    tx: Option<Sender<DebugEvent>>,
}

impl Events {
    pub fn new(tx: Sender<DebugEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: DebugEvent) {
        match &event {
            DebugEvent::Error(msg) => error!(target: "events", "{}", msg),
            DebugEvent::Warning(msg) => warn!(target: "events", "{}", msg),
            DebugEvent::Log(msg) => info!(target: "events", "{}", msg),
            _ => {}
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.emit(DebugEvent::Warning(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(DebugEvent::Error(msg.into()));
    }

    pub fn log(&self, msg: impl Into<String>) {
        self.emit(DebugEvent::Log(msg.into()));
    }
}
