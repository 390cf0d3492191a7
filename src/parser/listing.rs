use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One listing line that carries an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    /// 0-based line in the list file.
    pub line: usize,
    pub addr: u16,
    /// Line emits bytes (instruction or data), as opposed to a bare label.
    pub has_code: bool,
}

/// Line <-> address mapping of an assembler list file.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub path: PathBuf,
    line_to_addr: HashMap<usize, u16>,
    addr_to_line: HashMap<u16, ListingLine>,
}

impl Listing {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let lines: Vec<&str> = contents.lines().collect();
        let mut listing = Self::from_lines(&lines);
        listing.path = path.as_ref().to_path_buf();
        Ok(listing)
    }

    pub fn from_lines(lines: &[&str]) -> Self {
        let mut listing = Self::default();
        for entry in lines.iter().enumerate().filter_map(|(i, l)| parse_line(i, l)) {
            listing.line_to_addr.insert(entry.line, entry.addr);
            let replace = match listing.addr_to_line.get(&entry.addr) {
                None => true,
                Some(existing) => !existing.has_code && entry.has_code,
            };
            if replace {
                listing.addr_to_line.insert(entry.addr, entry);
            }
        }
        listing
    }

    pub fn address_of_line(&self, line: usize) -> Option<u16> {
        self.line_to_addr.get(&line).copied()
    }

    pub fn line_of_address(&self, addr: u16) -> Option<usize> {
        self.addr_to_line.get(&addr).map(|l| l.line)
    }

    pub fn len(&self) -> usize {
        self.line_to_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_to_addr.is_empty()
    }
}

fn is_hex(token: &str, digits: usize) -> bool {
    token.len() == digits && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse `<lineno>[+~] <ADDR> [bytes...] [source]`.
fn parse_line(index: usize, text: &str) -> Option<ListingLine> {
    let mut tokens = text.split_whitespace();
    let lineno = tokens.next()?;
    let digits = lineno.trim_end_matches(['+', '~']);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let addr = tokens.next()?;
    if !is_hex(addr, 4) {
        return None;
    }
    let has_code = tokens.next().map_or(false, |t| is_hex(t, 2) || is_hex(t, 4));
    Some(ListingLine {
        line: index,
        addr: u16::from_str_radix(addr, 16).ok()?,
        has_code,
    })
}
