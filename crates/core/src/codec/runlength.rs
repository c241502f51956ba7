//! RunLengthDecode.

use crate::error::Result;

/// End-of-data marker.
const EOD: u8 = 128;

/// Decode RunLength data.
///
/// Format:
/// - Length byte 0-127: copy next (length + 1) bytes literally
/// - Length byte 128: end of data
/// - Length byte 129-255: repeat next byte (257 - length) times
///
/// Truncated runs at the end of the input are dropped without error.
pub fn rl_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            EOD => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                if i + count > data.len() {
                    break;
                }
                result.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else {
                    break;
                };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - usize::from(length)));
            }
        }
    }

    Ok(result)
}

/// Encode RunLength data; runs of 2..=128 equal bytes become repeat runs.
pub fn rl_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut literal_start = 0;
    let mut i = 0;

    let flush_literal = |out: &mut Vec<u8>, lit: &[u8]| {
        for chunk in lit.chunks(128) {
            out.push((chunk.len() - 1) as u8);
            out.extend_from_slice(chunk);
        }
    };

    while i < data.len() {
        let byte = data[i];
        let run = data[i..]
            .iter()
            .take(128)
            .take_while(|&&b| b == byte)
            .count();
        if run >= 2 {
            flush_literal(&mut out, &data[literal_start..i]);
            out.push((257 - run) as u8);
            out.push(byte);
            i += run;
            literal_start = i;
        } else {
            i += 1;
        }
    }
    flush_literal(&mut out, &data[literal_start..]);
    out.push(EOD);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_literal_and_repeat_runs() {
        let data = b"\x02abc\xfdz\x80ignored";
        assert_eq!(rl_decode(data).unwrap(), b"abczzzz");
    }

    #[test]
    fn truncated_literal_is_dropped() {
        assert_eq!(rl_decode(b"\x05ab").unwrap(), b"");
    }

    #[test]
    fn encode_mixes_runs() {
        let encoded = rl_encode(b"abzzzzc");
        assert_eq!(encoded, b"\x01ab\xfdz\x00c\x80");
    }

    #[test]
    fn long_runs_are_split() {
        let data = vec![7u8; 300];
        let encoded = rl_encode(&data);
        assert_eq!(rl_decode(&encoded).unwrap(), data);
        assert_eq!(encoded.len(), 7);
    }
}
