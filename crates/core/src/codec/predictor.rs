//! PNG and TIFF predictors for FlateDecode and LZWDecode.

use crate::error::{PdfError, Result};
use crate::model::Dictionary;

/// Largest predictor row accepted, in bytes.
const MAX_ROW_BYTES: usize = 1 << 24;

/// `/DecodeParms` entries that control prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

fn predictor_error(msg: impl Into<String>) -> PdfError {
    PdfError::Decode {
        filter: "Predictor".into(),
        msg: msg.into(),
    }
}

impl PredictorParams {
    /// Read predictor settings; `None` when no prediction applies.
    pub fn from_dict(parms: Option<&Dictionary>) -> Result<Option<Self>> {
        let Some(parms) = parms else {
            return Ok(None);
        };
        let int = |key: &str, default: i64| {
            parms
                .get(key)
                .and_then(|v| v.as_int().ok())
                .unwrap_or(default)
        };
        let predictor = int("Predictor", 1);
        if predictor <= 1 {
            return Ok(None);
        }
        if predictor != 2 && !(10..=15).contains(&predictor) {
            return Err(predictor_error(format!("unknown predictor {predictor}")));
        }
        let positive = |key: &str, default: i64| {
            usize::try_from(int(key, default))
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| predictor_error(format!("invalid /{key}")))
        };
        let params = Self {
            predictor,
            colors: positive("Colors", 1)?,
            bits_per_component: positive("BitsPerComponent", 8)?,
            columns: positive("Columns", 1)?,
        };
        if !matches!(params.bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(predictor_error(format!(
                "invalid /BitsPerComponent {}",
                params.bits_per_component
            )));
        }
        params.row_bytes()?;
        Ok(Some(params))
    }

    const fn is_png(&self) -> bool {
        self.predictor >= 10
    }

    /// Bytes per row, excluding the PNG filter-type byte.
    ///
    /// Rows wider than `MAX_ROW_BYTES`, or whose size overflows, are a
    /// decode error.
    fn row_bytes(&self) -> Result<usize> {
        self.colors
            .checked_mul(self.bits_per_component)
            .and_then(|bits| bits.checked_mul(self.columns))
            .map(|bits| bits.div_ceil(8))
            .filter(|&bytes| bytes <= MAX_ROW_BYTES)
            .ok_or_else(|| {
                predictor_error(format!(
                    "row of {} columns x {} colors x {} bits is too wide",
                    self.columns, self.colors, self.bits_per_component
                ))
            })
    }

    /// Bytes per pixel as PNG counts them (at least one). Only called once
    /// `row_bytes` has bounded the product.
    fn bpp(&self) -> usize {
        (self.colors * self.bits_per_component / 8).max(1)
    }

    /// Undo prediction.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        if self.is_png() {
            Ok(png_decode(data, row_bytes, self.bpp()))
        } else {
            self.tiff(data, true)
        }
    }

    /// Apply prediction.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let row_bytes = self.row_bytes()?;
        if self.is_png() {
            // Predictor 15 lets the encoder pick per row; every row uses Up
            let filter_type = match self.predictor {
                10 => 0,
                11 => 1,
                13 => 3,
                14 => 4,
                _ => 2,
            };
            Ok(png_encode(data, row_bytes, self.bpp(), filter_type))
        } else {
            self.tiff(data, false)
        }
    }

    /// TIFF predictor 2: horizontal differencing of 8-bit components.
    fn tiff(&self, data: &[u8], decode: bool) -> Result<Vec<u8>> {
        if self.bits_per_component != 8 {
            return Err(predictor_error(format!(
                "TIFF predictor with {} bits per component",
                self.bits_per_component
            )));
        }
        let row_bytes = self.row_bytes()?;
        let mut out = data.to_vec();
        for row in out.chunks_mut(row_bytes) {
            if decode {
                for i in self.colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - self.colors]);
                }
            } else {
                for i in (self.colors..row.len()).rev() {
                    row[i] = row[i].wrapping_sub(row[i - self.colors]);
                }
            }
        }
        Ok(out)
    }
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// Reverse PNG row filters. Every row starts with a filter-type byte; a
/// short final row is decoded as far as it goes.
fn png_decode(data: &[u8], row_bytes: usize, bpp: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    // no row is longer than the input
    let mut prev_row = vec![0u8; row_bytes.min(data.len())];

    for chunk in data.chunks(row_bytes + 1) {
        let filter_type = chunk[0];
        let row_data = &chunk[1..];
        let mut current_row = vec![0u8; row_data.len()];

        for i in 0..row_data.len() {
            let left = if i >= bpp { current_row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let predicted = match filter_type {
                1 => left,
                2 => above,
                3 => ((u16::from(left) + u16::from(above)) / 2) as u8,
                4 => paeth_predictor(left, above, upper_left),
                // 0 and unknown types copy the row
                _ => 0,
            };
            current_row[i] = row_data[i].wrapping_add(predicted);
        }

        result.extend_from_slice(&current_row);
        prev_row[..current_row.len()].copy_from_slice(&current_row);
    }

    result
}

/// Apply one PNG filter type to every row.
fn png_encode(data: &[u8], row_bytes: usize, bpp: usize, filter_type: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / row_bytes.max(1) + 1);
    let mut prev_row = vec![0u8; row_bytes.min(data.len())];

    for row in data.chunks(row_bytes) {
        out.push(filter_type);
        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let predicted = match filter_type {
                1 => left,
                2 => above,
                3 => ((u16::from(left) + u16::from(above)) / 2) as u8,
                4 => paeth_predictor(left, above, upper_left),
                _ => 0,
            };
            out.push(row[i].wrapping_sub(predicted));
        }
        prev_row[..row.len()].copy_from_slice(row);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdfValue;

    fn params(predictor: i64, colors: i64, columns: i64) -> PredictorParams {
        let mut dict = Dictionary::new();
        dict.insert("Predictor".into(), PdfValue::Int(predictor));
        dict.insert("Colors".into(), PdfValue::Int(colors));
        dict.insert("Columns".into(), PdfValue::Int(columns));
        PredictorParams::from_dict(Some(&dict)).unwrap().unwrap()
    }

    #[test]
    fn predictor_one_is_none() {
        let mut dict = Dictionary::new();
        dict.insert("Predictor".into(), PdfValue::Int(1));
        assert_eq!(PredictorParams::from_dict(Some(&dict)).unwrap(), None);
        assert_eq!(PredictorParams::from_dict(None).unwrap(), None);
    }

    #[test]
    fn png_up_rows_decode() {
        // two rows of 3 bytes, second row uses Up
        let data = [0, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(params(12, 1, 3).decode(&data).unwrap(), [1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn png_mixed_filter_types_decode() {
        // Sub, then Average, then Paeth
        let data = [1, 10, 5, 5, 3, 4, 3, 2, 4, 1, 1, 1];
        let decoded = params(15, 1, 3).decode(&data).unwrap();
        assert_eq!(decoded, [10, 15, 20, 9, 15, 19, 10, 16, 20]);
    }

    #[test]
    fn every_png_predictor_reverses() {
        let data: Vec<u8> = (0..96u32).map(|i| (i * 37 % 256) as u8).collect();
        for predictor in 10..=15 {
            let p = params(predictor, 3, 8);
            let encoded = p.encode(&data).unwrap();
            assert_eq!(encoded.len(), data.len() + 4);
            assert_eq!(p.decode(&encoded).unwrap(), data, "predictor {predictor}");
        }
    }

    #[test]
    fn tiff_predictor_reverses() {
        let data: Vec<u8> = (0..60u8).collect();
        let p = params(2, 3, 10);
        let encoded = p.encode(&data).unwrap();
        assert_eq!(&encoded[..6], &[0, 1, 2, 3, 3, 3]);
        assert_eq!(p.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn oversized_rows_are_decode_errors() {
        for (columns, colors) in [(576_460_752_303_423_488, 1), (i64::MAX, 4), (1 << 23, 3)] {
            let mut dict = Dictionary::new();
            dict.insert("Predictor".into(), PdfValue::Int(12));
            dict.insert("Columns".into(), PdfValue::Int(columns));
            dict.insert("Colors".into(), PdfValue::Int(colors));
            assert!(
                matches!(PredictorParams::from_dict(Some(&dict)), Err(PdfError::Decode { .. })),
                "{columns} x {colors}"
            );
        }

        let wide = PredictorParams {
            predictor: 12,
            colors: usize::MAX,
            bits_per_component: 8,
            columns: 2,
        };
        assert!(wide.decode(&[2, 1, 1]).is_err());
        assert!(wide.encode(&[1, 1]).is_err());
    }

    #[test]
    fn row_wider_than_data_decodes_short_row() {
        let p = params(12, 1, 1 << 20);
        assert_eq!(p.decode(&[2, 5, 6]).unwrap(), [5, 6]);
        assert_eq!(p.encode(&[5, 6]).unwrap(), [2, 5, 6]);
    }

    #[test]
    fn unknown_predictor_is_decode_error() {
        let mut dict = Dictionary::new();
        dict.insert("Predictor".into(), PdfValue::Int(7));
        assert!(matches!(
            PredictorParams::from_dict(Some(&dict)),
            Err(PdfError::Decode { .. })
        ));
    }
}
