use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Arguments of the DAP `launch` and `attach` requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchConfig {
    /// Host running ZEsarUX with `--enable-remoteprotocol`.
    pub hostname: String,
    pub port: u16,
    pub socket_timeout_ms: u64,
    /// sjasmplus label exports or z88dk map files.
    pub label_files: Vec<PathBuf>,
    /// Assembler listings used to map source lines to addresses.
    pub list_files: Vec<PathBuf>,
    /// Instructions kept by `cpu-history`.
    pub history_size: usize,
    pub code_coverage: bool,
    pub stop_on_entry: bool,
    /// Step over interrupt routines when stepping.
    pub skip_interrupt: bool,
    /// Idle time that ends the setup burst after connecting.
    pub quiet_period_ms: u64,
    pub max_breakpoints: u16,
    /// Slots read by `extended-stack get` for the call stack.
    pub stack_depth: u16,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 10000,
            socket_timeout_ms: 5000,
            label_files: Vec::new(),
            list_files: Vec::new(),
            history_size: 10000,
            code_coverage: false,
            stop_on_entry: true,
            skip_interrupt: false,
            quiet_period_ms: 200,
            max_breakpoints: 100,
            stack_depth: 50,
        }
    }
}

impl LaunchConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}
