//! LZWDecode via the weezl crate (MSB first, 8-bit).

use crate::error::{PdfError, Result};
use weezl::{BitOrder, decode::Decoder, encode::Encoder};

/// Decode LZW data with the `/EarlyChange` setting.
///
/// EarlyChange=1 (the PDF default) widens codes one entry early, which is
/// the TIFF flavour of LZW; EarlyChange=0 is the plain variant.
pub fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    // Streams missing the end-of-data code still yield their content
    let result = decoder.into_vec(&mut output).decode(data);
    if let Err(err) = result.status {
        if output.is_empty() && !data.is_empty() {
            return Err(PdfError::Decode {
                filter: "LZWDecode".into(),
                msg: err.to_string(),
            });
        }
        tracing::debug!(error = %err, recovered = output.len(), "partial LZW decode");
    }
    Ok(output)
}

/// Encode LZW data with the `/EarlyChange` setting.
pub fn lzw_encode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut encoder = if early_change {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Encoder::new(BitOrder::Msb, 8)
    };
    encoder.encode(data).map_err(|err| PdfError::Decode {
        filter: "LZWDecode".into(),
        msg: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_vector() {
        let input = b"\x80\x0b\x60\x50\x22\x0c\x0c\x85\x01";
        let expected = b"\x2d\x2d\x2d\x2d\x2d\x41\x2d\x2d\x2d\x42";
        assert_eq!(lzw_decode(input, true).unwrap(), expected);
    }

    #[test]
    fn long_input_crosses_code_width_changes() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect();
        for early in [true, false] {
            let encoded = lzw_encode(&data, early).unwrap();
            assert_eq!(lzw_decode(&encoded, early).unwrap(), data);
        }
    }
}
