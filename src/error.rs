use crate::z80::registers::DecodeError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- protocol errors -------------------------------------------
    #[error("unexpected response to `{command}`: {response:?}")]
    Protocol { command: String, response: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("ZEsarUX version {found} is too old, at least {required} is required")]
    VersionTooOld { found: String, required: String },

    // --------------------------------- connection errors -----------------------------------------
    #[error("connection to the emulator closed: {0}")]
    ChannelClosed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // --------------------------------- resource exhaustion ---------------------------------------
    #[error("no breakpoint id available")]
    NoBreakpointId,

    // --------------------------------- unsupported features --------------------------------------
    #[error("not supported by ZEsarUX: {0}")]
    Unsupported(String),

    // --------------------------------- usage errors ----------------------------------------------
    #[error("another step or continue request is still running")]
    Busy,
    #[error("the program is running, pause it first")]
    Running,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown label `{0}`")]
    UnknownLabel(String),

    // --------------------------------- serialization ---------------------------------------------
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn protocol(command: impl Into<String>, response: impl Into<String>) -> Self {
        Error::Protocol {
            command: command.into(),
            response: response.into(),
        }
    }
}
