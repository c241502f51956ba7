//! ASCII85Decode.

use crate::error::{PdfError, Result};

/// Decode ASCII85 data (PDF variant).
///
/// Handles `z` groups, an optional `<~` prefix, whitespace and a missing
/// `~>` end marker.
pub fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut len = 0;

    for (i, &byte) in data.iter().enumerate() {
        match byte {
            b' ' | b'\t' | b'\n' | b'\r' | b'\x00' | b'\x0c' => {}
            b'z' if len == 0 => result.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[len] = byte - b'!';
                len += 1;
                if len == 5 {
                    result.extend_from_slice(&group_value(&group, i)?.to_be_bytes());
                    len = 0;
                }
            }
            _ => {
                return Err(PdfError::Decode {
                    filter: "ASCII85Decode".into(),
                    msg: format!("invalid byte {byte:#04x} at {i}"),
                });
            }
        }
    }

    if len == 1 {
        return Err(PdfError::Decode {
            filter: "ASCII85Decode".into(),
            msg: "dangling single character in final group".into(),
        });
    }
    if len > 1 {
        // Pad with 'u' and keep len - 1 bytes
        group[len..].fill(84);
        let bytes = group_value(&group, data.len())?.to_be_bytes();
        result.extend_from_slice(&bytes[..len - 1]);
    }

    Ok(result)
}

fn group_value(group: &[u8; 5], pos: usize) -> Result<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &d| acc * 85 + u64::from(d));
    u32::try_from(value).map_err(|_| PdfError::Decode {
        filter: "ASCII85Decode".into(),
        msg: format!("group overflow near {pos}"),
    })
}

/// Encode as ASCII85 with `z` groups and the `~>` end marker.
pub fn ascii85_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);
        if chunk.len() == 4 && value == 0 {
            out.push(b'z');
            continue;
        }
        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}
