use super::session::CommandChannel;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Bytes of one 8 bit sprite pattern (16x16).
pub const PATTERN_SIZE: usize = 256;
/// Next register selecting the active sprite palette (bit 3).
const PALETTE_CONTROL_REGISTER: u8 = 67;

/// Decoded ZX Next sprite attribute slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteAttributes {
    pub slot: u8,
    pub x: u16,
    pub y: u16,
    pub pattern: u8,
    pub palette_offset: u8,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub rotate: bool,
    pub visible: bool,
}

impl SpriteAttributes {
    /// Decode 4 attribute bytes, or 5 when bit 6 of the fourth enables the extended byte.
    pub fn decode(slot: u8, bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let extended = bytes[3] & 0x40 != 0;
        let y_msb = if extended {
            bytes.get(4).map_or(0, |b| (*b as u16 & 0x01) << 8)
        } else {
            0
        };
        Some(Self {
            slot,
            x: bytes[0] as u16 | ((bytes[2] as u16 & 0x01) << 8),
            y: bytes[1] as u16 | y_msb,
            pattern: bytes[3] & 0x3f,
            palette_offset: bytes[2] >> 4,
            mirror_x: bytes[2] & 0x08 != 0,
            mirror_y: bytes[2] & 0x04 != 0,
            rotate: bytes[2] & 0x02 != 0,
            visible: bytes[3] & 0x80 != 0,
        })
    }
}

/// Session scoped cache of the sprite palettes and patterns of a ZX Next.
///
/// Everything cached here can change as soon as the machine executes, so the owner calls
/// [`SpriteCache::invalidate`] on every step, continue and mode switch.
#[derive(Debug, Default)]
pub struct SpriteCache {
    palettes: [Option<Vec<u16>>; 2],
    patterns: HashMap<u8, Vec<u8>>,
    palette_index: Option<u8>,
}

impl SpriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.palettes = [None, None];
        self.patterns.clear();
        self.palette_index = None;
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.iter().all(Option::is_none)
            && self.patterns.is_empty()
            && self.palette_index.is_none()
    }

    /// 0 for the first sprite palette, 1 for the second.
    pub fn active_palette_index(&mut self, channel: &mut dyn CommandChannel) -> Result<u8> {
        if let Some(index) = self.palette_index {
            return Ok(index);
        }
        let command = format!("tbblue-get-register {}", PALETTE_CONTROL_REGISTER);
        let response = channel.send_checked(&command)?;
        let value = parse_hex_tokens(&response, &command)?
            .first()
            .copied()
            .ok_or_else(|| Error::protocol(&command, &response))?;
        let index = ((value >> 3) & 1) as u8;
        self.palette_index = Some(index);
        Ok(index)
    }

    /// 256 nine bit RGB333 colours of sprite palette `index`.
    pub fn palette(&mut self, channel: &mut dyn CommandChannel, index: u8) -> Result<&[u16]> {
        let slot = (index & 1) as usize;
        if self.palettes[slot].is_none() {
            let which = if slot == 0 { "first" } else { "second" };
            let command = format!("tbblue-get-palette sprite {} 0 256", which);
            let response = channel.send_checked(&command)?;
            let colours = parse_hex_tokens(&response, &command)?;
            if colours.len() != 256 {
                return Err(Error::protocol(command, response));
            }
            self.palettes[slot] = Some(colours);
        }
        Ok(self.palettes[slot].as_deref().unwrap_or(&[]))
    }

    /// Patterns `index..index + count`, fetching only those not cached yet.
    pub fn patterns(
        &mut self,
        channel: &mut dyn CommandChannel,
        index: u8,
        count: u8,
    ) -> Result<Vec<Vec<u8>>> {
        let wanted: Vec<u8> = (0..count).filter_map(|i| index.checked_add(i)).collect();
        for &pattern in &wanted {
            if self.patterns.contains_key(&pattern) {
                continue;
            }
            let command = format!("tbblue-get-pattern {} 1", pattern);
            let response = channel.send_checked(&command)?;
            let bytes = parse_hex_tokens(&response, &command)?;
            if bytes.len() != PATTERN_SIZE {
                return Err(Error::protocol(command, response));
            }
            self.patterns
                .insert(pattern, bytes.into_iter().map(|b| b as u8).collect());
        }
        Ok(wanted
            .iter()
            .filter_map(|p| self.patterns.get(p).cloned())
            .collect())
    }

    /// Attribute slots are read fresh on every call.
    pub fn sprites(
        &mut self,
        channel: &mut dyn CommandChannel,
        slot: u8,
        count: u8,
    ) -> Result<Vec<SpriteAttributes>> {
        let command = format!("tbblue-get-sprite {} {}", slot, count);
        let response = channel.send_checked(&command)?;
        let mut sprites = Vec::new();
        for (i, line) in response.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            let bytes: Vec<u8> = parse_hex_tokens(line, &command)?
                .into_iter()
                .map(|b| b as u8)
                .collect();
            let slot = slot.wrapping_add(i as u8);
            let sprite = SpriteAttributes::decode(slot, &bytes)
                .ok_or_else(|| Error::protocol(&command, line))?;
            sprites.push(sprite);
        }
        Ok(sprites)
    }
}

/// Whitespace separated hex numbers, with or without an `H` suffix.
fn parse_hex_tokens(response: &str, command: &str) -> Result<Vec<u16>> {
    response
        .split_whitespace()
        .map(|token| {
            let digits = token.trim_end_matches(|c: char| c == 'H' || c == 'h');
            u16::from_str_radix(digits, 16).map_err(|_| Error::protocol(command, response))
        })
        .collect()
}
