//! Decoder for the register dump printed by `get-registers` and `cpu-history get`.
//!
//! A dump is a single line of space separated `KEY=VALUE` fields, e.g.
//!
//! ```text
//! PC=8000 SP=ff44 AF=005c BC=174b HL=107f DE=0006 IX=ffff IY=5c3a AF'=0044 BC'=ffff HL'=ffff
//! DE'=5cb9 I=3f R=78  F=-Z-H-P-- F'=-Z---P-- MEMPTR=0000 IM1 IFF-- VPS: 0
//! ```
//!
//! History lines additionally carry `(PC)=<4 opcode bytes>` and `(SP)=<word at SP>`.

use std::str::FromStr;

pub const FLAG_S: u8 = 0x80;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_C: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("register dump is missing field `{0}`")]
    MissingField(&'static str),
    #[error("register field `{field}` has malformed value {value:?}")]
    MalformedField { field: String, value: String },
    #[error("flags string {0:?} must have 8 positions")]
    MalformedFlags(String),
}

/// Immutable, typed view over one register dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub pc: u16,
    pub sp: u16,
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub af2: u16,
    pub bc2: u16,
    pub de2: u16,
    pub hl2: u16,
    pub i: u8,
    pub r: u8,
    pub im: Option<u8>,
    pub iff1: bool,
    pub iff2: bool,
    /// The (up to) 4 bytes at PC, only present in history lines.
    pub pc_bytes: Option<[u8; 4]>,
    /// The word at SP, only present in history lines.
    pub sp_content: Option<u16>,
}

/// Decode a flag mnemonic string such as `-Z-H-P--` into the F register.
///
/// Positions are S, Z, 5, H, 3, P/V, N, C from left to right, a dash means cleared.
pub fn decode_flags(text: &str) -> Result<u8, DecodeError> {
    if text.chars().count() != 8 {
        return Err(DecodeError::MalformedFlags(text.to_string()));
    }
    Ok(text
        .chars()
        .enumerate()
        .filter(|(_, ch)| *ch != '-')
        .fold(0u8, |flags, (pos, _)| flags | (0x80 >> pos)))
}

fn parse_hex<T>(field: &str, value: &str, digits: usize) -> Result<T, DecodeError>
where
    T: TryFrom<u32>,
{
    let malformed = || DecodeError::MalformedField {
        field: field.to_string(),
        value: value.to_string(),
    };
    if value.len() != digits || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    let raw = u32::from_str_radix(value, 16).map_err(|_| malformed())?;
    T::try_from(raw).map_err(|_| malformed())
}

struct Fields<'a> {
    pairs: Vec<(&'a str, &'a str)>,
    flags: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn split(line: &'a str) -> Self {
        let mut pairs = Vec::new();
        let mut flags = Vec::new();
        for token in line.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) => pairs.push((key, value)),
                None => flags.push(token),
            }
        }
        Self { pairs, flags }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn word(&self, key: &'static str) -> Result<u16, DecodeError> {
        let value = self.raw(key).ok_or(DecodeError::MissingField(key))?;
        parse_hex(key, value, 4)
    }

    fn byte(&self, key: &'static str) -> Result<u8, DecodeError> {
        let value = self.raw(key).ok_or(DecodeError::MissingField(key))?;
        parse_hex(key, value, 2)
    }
}

impl FromStr for RegisterSnapshot {
    type Err = DecodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = Fields::split(line);

        let af = fields.word("AF")?;
        if let Some(text) = fields.raw("F") {
            decode_flags(text)?;
        }

        let pc_bytes = match fields.raw("(PC)") {
            Some(value) => {
                let raw: u32 = parse_hex("(PC)", value, 8)?;
                Some(raw.to_be_bytes())
            }
            None => None,
        };
        let sp_content = match fields.raw("(SP)") {
            Some(value) => Some(parse_hex("(SP)", value, 4)?),
            None => None,
        };

        let im = fields
            .flags
            .iter()
            .find_map(|t| t.strip_prefix("IM"))
            .and_then(|m| m.parse::<u8>().ok());
        let iff = fields
            .flags
            .iter()
            .find_map(|t| t.strip_prefix("IFF"))
            .unwrap_or("--");

        Ok(Self {
            pc: fields.word("PC")?,
            sp: fields.word("SP")?,
            af,
            bc: fields.word("BC")?,
            de: fields.word("DE")?,
            hl: fields.word("HL")?,
            ix: fields.word("IX")?,
            iy: fields.word("IY")?,
            af2: fields.word("AF'")?,
            bc2: fields.word("BC'")?,
            de2: fields.word("DE'")?,
            hl2: fields.word("HL'")?,
            i: fields.byte("I")?,
            r: fields.byte("R")?,
            im,
            iff1: iff.starts_with('1'),
            iff2: iff.ends_with('2'),
            pc_bytes,
            sp_content,
        })
    }
}

impl RegisterSnapshot {
    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    pub fn flags(&self) -> u8 {
        (self.af & 0xff) as u8
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.flags() & mask != 0
    }

    /// Value of a register by its assembler name, case insensitive.
    pub fn get(&self, name: &str) -> Option<u16> {
        let hi = |w: u16| w >> 8;
        let lo = |w: u16| w & 0xff;
        let value = match name.to_ascii_uppercase().as_str() {
            "PC" => self.pc,
            "SP" => self.sp,
            "AF" => self.af,
            "BC" => self.bc,
            "DE" => self.de,
            "HL" => self.hl,
            "IX" => self.ix,
            "IY" => self.iy,
            "AF'" => self.af2,
            "BC'" => self.bc2,
            "DE'" => self.de2,
            "HL'" => self.hl2,
            "A" => hi(self.af),
            "F" => lo(self.af),
            "B" => hi(self.bc),
            "C" => lo(self.bc),
            "D" => hi(self.de),
            "E" => lo(self.de),
            "H" => hi(self.hl),
            "L" => lo(self.hl),
            "IXH" => hi(self.ix),
            "IXL" => lo(self.ix),
            "IYH" => hi(self.iy),
            "IYL" => lo(self.iy),
            "I" => self.i as u16,
            "R" => self.r as u16,
            _ => return None,
        };
        Some(value)
    }

    /// Registers in display order with their width in hex digits.
    pub fn entries(&self) -> Vec<(&'static str, u16, usize)> {
        vec![
            ("PC", self.pc, 4),
            ("SP", self.sp, 4),
            ("A", self.a() as u16, 2),
            ("F", self.flags() as u16, 2),
            ("HL", self.hl, 4),
            ("DE", self.de, 4),
            ("BC", self.bc, 4),
            ("IX", self.ix, 4),
            ("IY", self.iy, 4),
            ("AF'", self.af2, 4),
            ("HL'", self.hl2, 4),
            ("DE'", self.de2, 4),
            ("BC'", self.bc2, 4),
            ("I", self.i as u16, 2),
            ("R", self.r as u16, 2),
        ]
    }

    /// The F register rendered the way ZEsarUX prints it.
    pub fn flags_string(&self) -> String {
        const NAMES: &[u8; 8] = b"SZ5H3PNC";
        let flags = self.flags();
        NAMES
            .iter()
            .enumerate()
            .map(|(pos, name)| {
                if flags & (0x80 >> pos) != 0 {
                    *name as char
                } else {
                    '-'
                }
            })
            .collect()
    }
}

/// Names accepted as registers in breakpoint conditions and console lookups.
pub fn is_register_name(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "A" | "F" | "B" | "C" | "D" | "E" | "H" | "L" | "I" | "R" | "AF" | "BC" | "DE" | "HL"
            | "IX" | "IY" | "SP" | "PC" | "IXH" | "IXL" | "IYH" | "IYL" | "AF'" | "BC'"
            | "DE'" | "HL'"
    )
}
