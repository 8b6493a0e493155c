//! Reversible byte <-> printable character mapping used by byte-level BPE.
//!
//! Printable ASCII and most of Latin-1 map to themselves; the remaining 68
//! bytes (controls, space, `0x7f..=0xa0`, soft hyphen) map to `U+0100` onward
//! in byte order, matching the GPT-2 vocabulary files.

use std::{collections::HashMap, sync::LazyLock};

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let direct = |b: u8| matches!(b, b'!'..=b'~' | 0xa1..=0xac | 0xae..=0xff);
    let mut table = ['\0'; 256];
    let mut next = 0x100u32;
    for b in 0..=255u8 {
        table[b as usize] = if direct(b) {
            b as char
        } else {
            let c = char::from_u32(next).unwrap_or('\0');
            next += 1;
            c
        };
    }
    table
});

static CHAR_TO_BYTE: LazyLock<HashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(b, &c)| (c, b as u8))
        .collect()
});

#[inline]
pub fn byte_to_char(b: u8) -> char {
    BYTE_TO_CHAR[b as usize]
}

#[inline]
pub fn char_to_byte(c: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&c).copied()
}

/// Maps every byte of `bytes` to its surrogate character.
pub fn encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_char(b)).collect()
}

/// Reverses [`encode_bytes`]; characters outside the table are kept as UTF-8.
pub fn decode_chars(text: &str) -> Vec<u8> {
    let mut ans = Vec::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for c in text.chars() {
        match char_to_byte(c) {
            Some(b) => ans.push(b),
            None => ans.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
        }
    }
    ans
}
