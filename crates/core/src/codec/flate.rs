//! FlateDecode (zlib) via flate2.

use crate::error::{PdfError, Result};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{Read, Write};

/// Inflate zlib data.
///
/// Streams with a damaged tail (bad checksum, missing end marker) return
/// what could be decompressed; a stream that yields nothing is an error.
pub fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2));
    if decoder.read_to_end(&mut out).is_ok() {
        return Ok(out);
    }

    let partial = decompress_corrupted(data);
    if partial.is_empty() && !data.is_empty() {
        return Err(PdfError::Decode {
            filter: "FlateDecode".into(),
            msg: "invalid zlib data".into(),
        });
    }
    tracing::debug!(recovered = partial.len(), "partial flate decode of corrupted stream");
    Ok(partial)
}

/// Deflate with zlib framing.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Feed the decoder one byte at a time and keep output up to the first error.
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}
