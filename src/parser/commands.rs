use super::labels::parse_number;
use crate::debugger::WatchAccess;

pub const CONSOLE_HELP: &str = "\
Debug console commands:
  -exec <cmd> [args...]       send a raw command to ZEsarUX
  -md <addr> <len>            dump memory
  -label <name|addr>          look up a label or an address
  -wpadd <addr> [size] [r|w|rw]  add a watchpoint (default: 1 byte, rw)
  -wprm <addr> [size]         remove a watchpoint
  -patterns <index> [count]   dump ZX Next sprite patterns
  -sprites [slot] [count]     dump ZX Next sprite attributes
  -palette [first|second]     dump a sprite palette (default: the active one)
Anything else is looked up as a register or label.";

/// A command typed into the debug console (DAP `evaluate`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Exec(String),
    MemoryDump { addr: String, len: u16 },
    Label(String),
    WatchAdd { addr: String, size: u16, access: WatchAccess },
    WatchRemove { addr: String, size: u16 },
    Patterns { index: u8, count: u8 },
    Sprites { slot: u8, count: u8 },
    /// Sprite palette 0 or 1, `None` for the active one.
    Palette(Option<u8>),
    Lookup(String),
}

/// Tokenize a console line (shell quoting rules) and parse it.
pub fn parse_console_command(line: &str) -> Result<ConsoleCommand, String> {
    let tokens = shlex::split(line.trim()).ok_or_else(|| format!("unbalanced quotes in {:?}", line))?;
    let (first, args) = match tokens.split_first() {
        Some((first, args)) => (first.as_str(), args),
        None => return Err("empty command".to_string()),
    };

    match first {
        "-help" | "-h" => Ok(ConsoleCommand::Help),
        "-exec" | "-e" => {
            if args.is_empty() {
                return Err("-exec needs a command".to_string());
            }
            let quoted: Vec<&str> = args.iter().map(String::as_str).collect();
            Ok(ConsoleCommand::Exec(quoted.join(" ")))
        }
        "-md" => {
            let addr = arg(args, 0, "address")?;
            let len = number(args.get(1).map(String::as_str).unwrap_or("16"), "length")?;
            Ok(ConsoleCommand::MemoryDump { addr, len })
        }
        "-label" => Ok(ConsoleCommand::Label(arg(args, 0, "label or address")?)),
        "-wpadd" => {
            let addr = arg(args, 0, "address")?;
            let size = number(args.get(1).map(String::as_str).unwrap_or("1"), "size")?;
            let access = args
                .get(2)
                .map(|a| a.parse::<WatchAccess>())
                .transpose()?
                .unwrap_or(WatchAccess::ReadWrite);
            Ok(ConsoleCommand::WatchAdd { addr, size, access })
        }
        "-wprm" => {
            let addr = arg(args, 0, "address")?;
            let size = number(args.get(1).map(String::as_str).unwrap_or("1"), "size")?;
            Ok(ConsoleCommand::WatchRemove { addr, size })
        }
        "-patterns" => {
            let index = number(&arg(args, 0, "pattern index")?, "pattern index")?;
            let count = number(args.get(1).map(String::as_str).unwrap_or("1"), "count")?;
            Ok(ConsoleCommand::Patterns {
                index: byte(index, "pattern index")?,
                count: byte(count, "count")?,
            })
        }
        "-sprites" => {
            let slot = number(args.first().map(String::as_str).unwrap_or("0"), "slot")?;
            let count = number(args.get(1).map(String::as_str).unwrap_or("1"), "count")?;
            Ok(ConsoleCommand::Sprites {
                slot: byte(slot, "slot")?,
                count: byte(count, "count")?,
            })
        }
        "-palette" => match args.first().map(String::as_str) {
            None => Ok(ConsoleCommand::Palette(None)),
            Some("first") | Some("0") => Ok(ConsoleCommand::Palette(Some(0))),
            Some("second") | Some("1") => Ok(ConsoleCommand::Palette(Some(1))),
            Some(other) => Err(format!("invalid palette {:?}", other)),
        },
        other if other.starts_with('-') => Err(format!("unknown command {}", other)),
        _ => Ok(ConsoleCommand::Lookup(line.trim().to_string())),
    }
}

fn arg(args: &[String], index: usize, what: &str) -> Result<String, String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| format!("missing {}", what))
}

fn number(text: &str, what: &str) -> Result<u16, String> {
    match parse_number(text) {
        Some(n) if n <= 0xFFFF => Ok(n as u16),
        _ => Err(format!("invalid {} {:?}", what, text)),
    }
}

fn byte(value: u16, what: &str) -> Result<u8, String> {
    u8::try_from(value).map_err(|_| format!("{} out of range: {}", what, value))
}
