use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Address <-> label lookup used to name frames and resolve breakpoint conditions.
pub trait SymbolTable {
    /// Labels at `addr`, the first one is the primary label.
    fn labels_for(&self, addr: u16) -> Vec<String>;
    fn address_of(&self, label: &str) -> Option<u16>;

    /// Primary label for `addr` or the address in hex.
    fn label_or_hex(&self, addr: u16) -> String {
        self.labels_for(addr)
            .into_iter()
            .next()
            .unwrap_or_else(|| crate::z80::hex_label(addr))
    }
}

#[derive(Debug, Default, Clone)]
pub struct Labels {
    by_name: HashMap<String, u16>,
    // case-insensitive fallback
    by_lower_name: HashMap<String, u16>,
    by_addr: HashMap<u16, Vec<String>>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn insert(&mut self, name: &str, addr: u16) {
        if self.by_name.insert(name.to_string(), addr).is_some() {
            return;
        }
        self.by_lower_name.insert(name.to_lowercase(), addr);
        self.by_addr.entry(addr).or_default().push(name.to_string());
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> io::Result<usize> {
        let contents = fs::read_to_string(path)?;
        let lines: Vec<&str> = contents.lines().collect();
        Ok(self.parse_lines(&lines))
    }

    /// Scan label definitions, returns how many were added.
    ///
    /// Understood formats:
    /// - sjasmplus label export: `name: EQU 0x00008000`
    /// - z88dk map file: `name = $8000 ; addr, local, ...`
    pub fn parse_lines(&mut self, lines: &[&str]) -> usize {
        let before = self.len();
        for line in lines {
            let line = line.split(';').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = split_definition(line) {
                match parse_number(value) {
                    Some(addr) if addr <= 0xFFFF => self.insert(name, addr as u16),
                    _ => log::debug!(target: "labels", "skipping label line {:?}", line),
                }
            }
        }
        self.len() - before
    }
}

impl SymbolTable for Labels {
    fn labels_for(&self, addr: u16) -> Vec<String> {
        self.by_addr.get(&addr).cloned().unwrap_or_default()
    }

    fn address_of(&self, label: &str) -> Option<u16> {
        self.by_name
            .get(label)
            .or_else(|| self.by_lower_name.get(&label.to_lowercase()))
            .copied()
    }
}

fn split_definition(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let second = tokens.next()?;
    if second.eq_ignore_ascii_case("equ") || second == "=" {
        let name = first.trim_end_matches(':');
        return Some((name, tokens.next()?));
    }
    None
}

/// Parse a number written as decimal, `0x1F`, `$1F`, `#1F` or `1Fh`.
pub fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();
    let hex = lower
        .strip_prefix("0x")
        .or_else(|| lower.strip_prefix('$'))
        .or_else(|| lower.strip_prefix('#'))
        .or_else(|| lower.strip_suffix('h'));
    match hex {
        Some(digits) if !digits.is_empty() => u32::from_str_radix(digits, 16).ok(),
        Some(_) => None,
        None => lower.parse::<u32>().ok(),
    }
}
