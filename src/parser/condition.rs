//! Translation of portable breakpoint conditions into the ZEsarUX expression syntax.
//!
//! | portable     | ZEsarUX   |
//! |--------------|-----------|
//! | `&&`, `\|\|` | `AND`, `OR` |
//! | `==`, `!=`   | `=`, `<>` |
//! | `!`          | `NOT`     |
//! | `b@(x)`      | `peek(x)` |
//! | `w@(x)`      | `peekw(x)`|
//! | `0x1F`       | `1FH`     |
//!
//! Identifiers that are not register names are replaced by their address when the symbol
//! table knows them and left untouched otherwise.

use super::labels::SymbolTable;
use crate::z80::registers::is_register_name;

pub fn translate_condition(condition: &str, symbols: &dyn SymbolTable) -> String {
    let chars: Vec<char> = condition.chars().collect();
    let mut out = String::with_capacity(condition.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match (ch, next) {
            ('&', Some('&')) => {
                out.push_str("AND");
                i += 2;
            }
            ('|', Some('|')) => {
                out.push_str("OR");
                i += 2;
            }
            ('=', Some('=')) => {
                out.push('=');
                i += 2;
            }
            ('!', Some('=')) => {
                out.push_str("<>");
                i += 2;
            }
            ('!', _) => {
                out.push_str("NOT");
                i += 1;
                if let Some(c) = chars.get(i) {
                    if c.is_alphanumeric() || *c == '_' || *c == '$' {
                        out.push(' ');
                    }
                }
            }
            ('b' | 'B' | 'w' | 'W', Some('@')) => {
                out.push_str(if ch.eq_ignore_ascii_case(&'b') { "peek" } else { "peekw" });
                i += 2;
            }
            ('0', Some('x' | 'X')) | ('$', _) => {
                let start = if ch == '$' { i + 1 } else { i + 2 };
                let end = scan(&chars, start, |c| c.is_ascii_hexdigit());
                if end == start {
                    out.push(ch);
                    i += 1;
                    continue;
                }
                let digits: String = chars[start..end].iter().collect();
                out.push_str(&digits.to_ascii_uppercase());
                out.push('H');
                i = end;
            }
            (c, _) if c.is_ascii_digit() => {
                let end = scan(&chars, i, |c| c.is_ascii_alphanumeric());
                out.extend(&chars[i..end]);
                i = end;
            }
            (c, _) if c.is_alphabetic() || c == '_' || c == '.' => {
                let mut end = scan(&chars, i, |c| c.is_alphanumeric() || c == '_' || c == '.');
                if chars.get(end) == Some(&'\'') {
                    end += 1;
                }
                let ident: String = chars[i..end].iter().collect();
                out.push_str(&translate_identifier(&ident, symbols));
                i = end;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn scan(chars: &[char], from: usize, accept: impl Fn(char) -> bool) -> usize {
    let mut end = from;
    while end < chars.len() && accept(chars[end]) {
        end += 1;
    }
    end
}

fn translate_identifier(ident: &str, symbols: &dyn SymbolTable) -> String {
    if is_register_name(ident) {
        return ident.to_ascii_uppercase();
    }
    match symbols.address_of(ident) {
        Some(addr) => addr.to_string(),
        None => {
            log::debug!(target: "breakpoints", "condition identifier `{}` left unresolved", ident);
            ident.to_string()
        }
    }
}
