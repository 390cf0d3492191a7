use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};

#[derive(Debug, Serialize, Deserialize)]
pub struct DapMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub content: DapMessageContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DapMessageContent {
    Request {
        command: String,
        arguments: Option<Value>,
    },
    Response {
        request_seq: u64,
        success: bool,
        command: String,
        message: Option<String>,
        body: Option<Value>,
    },
    Event {
        event: String,
        body: Option<Value>,
    },
}

/// Read one `Content-Length` framed message, `None` at end of input.
pub fn read_message(reader: &mut impl BufRead) -> Result<Option<DapMessage>> {
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        if line.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidArgument(format!("bad header {:?}", line)))?;
            content_length = Some(len);
        }
    }

    let mut buffer = vec![0u8; content_length.unwrap_or_default()];
    reader.read_exact(&mut buffer)?;
    Ok(Some(serde_json::from_slice(&buffer)?))
}

/// Must be exactly `Content-Length: {len}\r\n\r\n{json}`.
pub fn write_message(writer: &mut impl Write, msg: &DapMessage) -> Result<()> {
    let json = serde_json::to_vec(msg)?;
    write!(writer, "Content-Length: {}\r\n\r\n", json.len())?;
    writer.write_all(&json)?;
    writer.flush()?;
    Ok(())
}
