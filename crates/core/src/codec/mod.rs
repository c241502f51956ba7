//! Stream filters and the filter-chain pipeline.
//!
//! This module contains:
//! - `flate`: FlateDecode (zlib)
//! - `lzw`: LZWDecode
//! - `ascii85`: ASCII85Decode
//! - `asciihex`: ASCIIHexDecode
//! - `runlength`: RunLengthDecode
//! - `predictor`: PNG/TIFF predictors applied after Flate and LZW
//!
//! A [`FilterChain`] lists filters in `/Filter` order, which is the order
//! they are applied when decoding; encoding runs the list backwards so that
//! `decode(encode(b)) == b`.

pub mod ascii85;
pub mod asciihex;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

pub use ascii85::{ascii85_decode, ascii85_encode};
pub use asciihex::{asciihex_decode, asciihex_encode};
pub use flate::{flate_decode, flate_encode};
pub use lzw::{lzw_decode, lzw_encode};
pub use predictor::PredictorParams;
pub use runlength::{rl_decode, rl_encode};

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PdfValue};

/// A stream filter, identified by its canonical `/Filter` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    Flate,
    Lzw,
    Ascii85,
    AsciiHex,
    RunLength,
    /// DCT, JPX, CCITTFax, JBIG2, Crypt and unknown names
    Unsupported(String),
}

impl Filter {
    /// Filter for a `/Filter` name; abbreviated inline-image names are
    /// canonicalized.
    pub fn from_name(name: &str) -> Self {
        match name {
            "FlateDecode" | "Fl" => Filter::Flate,
            "LZWDecode" | "LZW" => Filter::Lzw,
            "ASCII85Decode" | "A85" => Filter::Ascii85,
            "ASCIIHexDecode" | "AHx" => Filter::AsciiHex,
            "RunLengthDecode" | "RL" => Filter::RunLength,
            "DCT" => Filter::Unsupported("DCTDecode".into()),
            "CCF" => Filter::Unsupported("CCITTFaxDecode".into()),
            other => Filter::Unsupported(other.to_string()),
        }
    }

    /// Canonical name without the leading slash.
    pub fn name(&self) -> &str {
        match self {
            Filter::Flate => "FlateDecode",
            Filter::Lzw => "LZWDecode",
            Filter::Ascii85 => "ASCII85Decode",
            Filter::AsciiHex => "ASCIIHexDecode",
            Filter::RunLength => "RunLengthDecode",
            Filter::Unsupported(name) => name,
        }
    }

    pub const fn is_supported(&self) -> bool {
        !matches!(self, Filter::Unsupported(_))
    }
}

/// One filter with its `/DecodeParms` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub filter: Filter,
    pub params: Option<Dictionary>,
}

impl FilterSpec {
    pub fn new(filter: Filter, params: Option<Dictionary>) -> Self {
        Self { filter, params }
    }

    fn early_change(&self) -> bool {
        self.params
            .as_ref()
            .and_then(|p| p.get("EarlyChange"))
            .and_then(|v| v.as_int().ok())
            .is_none_or(|v| v != 0)
    }

    fn predictor(&self) -> Result<Option<PredictorParams>> {
        PredictorParams::from_dict(self.params.as_ref())
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match &self.filter {
            Filter::Flate => {
                let out = flate_decode(data)?;
                self.unpredict(out)
            }
            Filter::Lzw => {
                let out = lzw_decode(data, self.early_change())?;
                self.unpredict(out)
            }
            Filter::Ascii85 => ascii85_decode(data),
            Filter::AsciiHex => asciihex_decode(data),
            Filter::RunLength => rl_decode(data),
            Filter::Unsupported(name) => Err(PdfError::UnsupportedFilter(name.clone())),
        }
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match &self.filter {
            Filter::Flate => match self.predictor()? {
                Some(p) => flate_encode(&p.encode(data)?),
                None => flate_encode(data),
            },
            Filter::Lzw => {
                let early = self.early_change();
                match self.predictor()? {
                    Some(p) => lzw_encode(&p.encode(data)?, early),
                    None => lzw_encode(data, early),
                }
            }
            Filter::Ascii85 => Ok(ascii85_encode(data)),
            Filter::AsciiHex => Ok(asciihex_encode(data)),
            Filter::RunLength => Ok(rl_encode(data)),
            Filter::Unsupported(name) => Err(PdfError::UnsupportedFilter(name.clone())),
        }
    }

    fn unpredict(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self.predictor()? {
            Some(p) => p.decode(&data),
            None => Ok(data),
        }
    }
}

/// Ordered filters applied to a stream payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    specs: Vec<FilterSpec>,
}

impl FilterChain {
    pub fn new(specs: Vec<FilterSpec>) -> Self {
        Self { specs }
    }

    /// Chain described by a stream dictionary's `/Filter` and `/DecodeParms`.
    ///
    /// Entries that are not names (for example unresolved references) become
    /// unsupported filters so the payload is passed through untouched.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let filters: Vec<Filter> = match dict.get("Filter") {
            None | Some(PdfValue::Null) => Vec::new(),
            Some(PdfValue::Name(name)) => vec![Filter::from_name(name)],
            Some(PdfValue::Array(arr)) => arr
                .iter()
                .map(|v| match v {
                    PdfValue::Name(name) => Filter::from_name(name),
                    other => Filter::Unsupported(format!("<{}>", other.type_name())),
                })
                .collect(),
            Some(other) => vec![Filter::Unsupported(format!("<{}>", other.type_name()))],
        };

        let params_at = |i: usize| -> Option<Dictionary> {
            match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
                Some(PdfValue::Dict(d)) if i == 0 => Some(d.clone()),
                Some(PdfValue::Array(arr)) => match arr.get(i) {
                    Some(PdfValue::Dict(d)) => Some(d.clone()),
                    _ => None,
                },
                _ => None,
            }
        };

        Self::new(
            filters
                .into_iter()
                .enumerate()
                .map(|(i, filter)| FilterSpec::new(filter, params_at(i)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterSpec> {
        self.specs.iter()
    }

    pub fn push(&mut self, spec: FilterSpec) {
        self.specs.push(spec);
    }

    /// First filter the pipeline cannot apply.
    pub fn unsupported(&self) -> Option<&Filter> {
        self.specs
            .iter()
            .map(|s| &s.filter)
            .find(|f| !f.is_supported())
    }

    /// Decode a raw payload, applying filters in `/Filter` order.
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<u8>> {
        if let Some(filter) = self.unsupported() {
            return Err(PdfError::UnsupportedFilter(filter.name().to_string()));
        }
        let mut data = raw.to_vec();
        for spec in &self.specs {
            data = spec.decode(&data)?;
        }
        Ok(data)
    }

    /// Encode decoded bytes, applying filters in reverse `/Filter` order.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if let Some(filter) = self.unsupported() {
            return Err(PdfError::UnsupportedFilter(filter.name().to_string()));
        }
        let mut out = data.to_vec();
        for spec in self.specs.iter().rev() {
            out = spec.encode(&out)?;
        }
        Ok(out)
    }

    /// Replace `/Filter` and `/DecodeParms` in `dict` with this chain.
    ///
    /// A single filter is written as a name, several as an array.
    /// `/DecodeParms` is only written when some filter has parameters.
    pub fn apply_to_dict(&self, dict: &mut Dictionary) {
        for key in ["Filter", "DecodeParms", "DP"] {
            dict.shift_remove(key);
        }
        let mut names: Vec<PdfValue> = self
            .specs
            .iter()
            .map(|s| PdfValue::name(s.filter.name()))
            .collect();
        let mut parms: Vec<PdfValue> = self
            .specs
            .iter()
            .map(|s| s.params.clone().map_or(PdfValue::Null, PdfValue::Dict))
            .collect();

        match names.len() {
            0 => {}
            1 => {
                dict.insert("Filter".into(), names.remove(0));
                if !parms[0].is_null() {
                    dict.insert("DecodeParms".into(), parms.remove(0));
                }
            }
            _ => {
                dict.insert("Filter".into(), PdfValue::Array(names));
                if parms.iter().any(|p| !p.is_null()) {
                    dict.insert("DecodeParms".into(), PdfValue::Array(parms));
                }
            }
        }
    }
}

impl FromIterator<FilterSpec> for FilterChain {
    fn from_iter<I: IntoIterator<Item = FilterSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
