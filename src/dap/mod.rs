mod protocol;
mod server;

use crate::error::Result;
use log::{info, trace, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;

pub use protocol::{read_message, write_message, DapMessage, DapMessageContent};
pub use server::{forward_event, report_stop, DapOutput, DapServer, Session};

/// Serve one client until it disconnects or closes its end.
pub fn run_session<R: BufRead, W: Write + Send + 'static>(mut reader: R, writer: W) -> Result<()> {
    let mut server = DapServer::new(writer);
    let mut msg_count = 0u64;

    while let Some(msg) = read_message(&mut reader)? {
        msg_count += 1;
        trace!(target: "dap", "message #{}: {:?}", msg_count, msg.content);
        if !server.handle(msg) {
            break;
        }
    }

    server.shutdown();
    info!(target: "dap", "session ended after {} messages", msg_count);
    Ok(())
}

/// Serve DAP on stdio, or on a local TCP port one client at a time.
pub fn run_dap_mode(port: Option<u16>) -> Result<()> {
    let Some(port) = port else {
        info!(target: "dap", "DAP server on stdio");
        return run_session(io::stdin().lock(), io::stdout());
    };

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    info!(target: "dap", "DAP server listening on 127.0.0.1:{}", port);
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(target: "dap", "accept failed: {}", err);
                continue;
            }
        };
        info!(target: "dap", "client connected: {}", peer);
        let reader = BufReader::new(stream.try_clone()?);
        if let Err(err) = run_session(reader, stream) {
            warn!(target: "dap", "session with {} ended with error: {}", peer, err);
        }
    }
}
