//! ASCIIHexDecode.

use crate::error::{PdfError, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode ASCIIHex data up to the `>` end marker; an odd final digit is
/// padded with zero.
pub fn asciihex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for (i, &byte) in data.iter().enumerate() {
        if byte == b'>' {
            break;
        }
        if crate::parser::lexer::is_whitespace(byte) {
            continue;
        }
        let nibble = hex_nibble(byte).ok_or_else(|| PdfError::Decode {
            filter: "ASCIIHexDecode".into(),
            msg: format!("invalid byte {byte:#04x} at {i}"),
        })?;
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Encode as uppercase hex terminated by `>`.
pub fn asciihex_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &b in data {
        out.push(HEX_DIGITS[usize::from(b >> 4)]);
        out.push(HEX_DIGITS[usize::from(b & 0x0f)]);
    }
    out.push(b'>');
    out
}
