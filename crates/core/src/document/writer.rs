//! Serialize a [`Document`] to PDF bytes.
//!
//! Output is fully buffered: every reference is checked before the first
//! byte is produced, so a failed write never yields a partial file.

use super::graph::Document;
use crate::codec::{Filter, FilterChain, FilterSpec, flate_encode};
use crate::config::{ConvertOptions, XrefForm};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfStream, PdfValue};
use crate::parser::is_delimiter;
use byteorder::{BigEndian, ByteOrder};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Write;

/// Trailer keys the writer always regenerates.
const STRUCTURAL_TRAILER_KEYS: [&str; 9] = [
    "Size",
    "Prev",
    "XRefStm",
    "W",
    "Index",
    "Type",
    "Filter",
    "DecodeParms",
    "Length",
];

/// Serialize `doc`.
///
/// Objects are renumbered densely when their numbers are not `1..=N`, and
/// with `prune_unreachable_objects` only objects reachable from the trailer
/// are kept. Fails with `UnresolvedReference` if a kept object or the
/// trailer references an absent object.
pub fn write_document(doc: &Document, opts: &ConvertOptions) -> Result<Vec<u8>> {
    let layout = Layout::plan(doc, opts)?;
    let mut writer = PdfWriter::new(opts);
    writer.header(doc.version())?;
    for (id, value) in &layout.objects {
        opts.check_deadline()?;
        writer.indirect_object(*id, value)?;
    }
    match opts.xref_output_form {
        XrefForm::Table => writer.finish_with_table(layout.trailer),
        XrefForm::Stream => writer.finish_with_stream(layout.trailer),
    }
}

/// Objects and trailer as they will be written.
struct Layout {
    objects: Vec<(ObjectId, PdfValue)>,
    trailer: Dictionary,
}

impl Layout {
    fn plan(doc: &Document, opts: &ConvertOptions) -> Result<Self> {
        if !doc.trailer().contains_key("Root") {
            return Err(PdfError::schema("/trailer", "missing /Root"));
        }

        let selected: Vec<(ObjectId, &PdfValue)> = if opts.prune_unreachable_objects {
            let keep = doc.reachable();
            let pruned = doc.len() - keep.len();
            if pruned > 0 {
                tracing::debug!(pruned, "dropping unreachable objects");
            }
            doc.objects().filter(|(id, _)| keep.contains(id)).collect()
        } else {
            doc.objects().collect()
        };

        let present: FxHashSet<ObjectId> = selected.iter().map(|(id, _)| *id).collect();
        let mut missing = None;
        let mut check = |id: ObjectId| {
            if missing.is_none() && !present.contains(&id) {
                missing = Some(id);
            }
        };
        doc.trailer().values().for_each(|v| v.for_each_ref(&mut check));
        selected.iter().for_each(|(_, v)| v.for_each_ref(&mut check));
        if let Some(id) = missing {
            return Err(PdfError::UnresolvedReference(id));
        }

        let dense = selected
            .iter()
            .enumerate()
            .all(|(i, (id, _))| usize::try_from(id.number).is_ok_and(|n| n == i + 1));
        let mapping: FxHashMap<ObjectId, ObjectId> = if dense {
            FxHashMap::default()
        } else {
            tracing::debug!(objects = selected.len(), "renumbering objects");
            selected
                .iter()
                .zip(1u32..)
                .map(|((id, _), number)| (*id, ObjectId::new(number, 0)))
                .collect()
        };
        let mut remap = |id: ObjectId| mapping.get(&id).copied().unwrap_or(id);

        let objects = selected
            .into_iter()
            .map(|(id, value)| {
                let mut value = value.clone();
                value.map_refs(&mut remap);
                (remap(id), value)
            })
            .collect();

        let mut trailer = doc.trailer().clone();
        for key in STRUCTURAL_TRAILER_KEYS {
            trailer.shift_remove(key);
        }
        for value in trailer.values_mut() {
            value.map_refs(&mut remap);
        }

        Ok(Self { objects, trailer })
    }
}

struct PdfWriter<'o> {
    out: Vec<u8>,
    /// `(id, offset)` of every object written, ascending
    offsets: Vec<(ObjectId, usize)>,
    opts: &'o ConvertOptions,
}

impl<'o> PdfWriter<'o> {
    fn new(opts: &'o ConvertOptions) -> Self {
        Self {
            out: Vec::new(),
            offsets: Vec::new(),
            opts,
        }
    }

    fn header(&mut self, version: &str) -> Result<()> {
        writeln!(self.out, "%PDF-{version}")?;
        // binary marker so transfer tools treat the file as binary
        self.out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Ok(())
    }

    fn indirect_object(&mut self, id: ObjectId, value: &PdfValue) -> Result<()> {
        self.offsets.push((id, self.out.len()));
        writeln!(self.out, "{} {} obj", id.number, id.generation)?;
        match value {
            PdfValue::Stream(stream) => {
                let (dict, raw) = self.prepare_stream(stream)?;
                write_dict(&mut self.out, &dict, id)?;
                self.out.extend_from_slice(b"\nstream\n");
                self.out.extend_from_slice(&raw);
                self.out.extend_from_slice(b"\nendstream");
            }
            other => write_value(&mut self.out, other, id)?,
        }
        self.out.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    /// Dictionary and payload as written: `/Length` recomputed and, with
    /// `compress_streams`, unfiltered payloads Flate-compressed.
    fn prepare_stream(&self, stream: &PdfStream) -> Result<(Dictionary, Vec<u8>)> {
        let mut dict = stream.dict.clone();
        let chain = stream.filter_chain();
        let raw = if self.opts.compress_streams && chain.is_empty() {
            let compressed = FilterChain::new(vec![FilterSpec::new(Filter::Flate, None)]);
            compressed.apply_to_dict(&mut dict);
            compressed.encode(stream.raw())?
        } else {
            stream.raw().to_vec()
        };
        dict.insert("Length".into(), PdfValue::Int(raw.len() as i64));
        Ok((dict, raw))
    }

    fn finish_with_table(mut self, mut trailer: Dictionary) -> Result<Vec<u8>> {
        let xref_pos = self.out.len();
        let size = self.offsets.len() + 1;
        write!(self.out, "xref\n0 {size}\n0000000000 65535 f \n")?;
        for (id, offset) in &self.offsets {
            write!(self.out, "{offset:010} {:05} n \n", id.generation)?;
        }
        trailer.insert("Size".into(), PdfValue::Int(size as i64));
        move_first(&mut trailer, "Size");
        self.out.extend_from_slice(b"trailer\n");
        write_dict(&mut self.out, &trailer, ObjectId::new(0, 0))?;
        write!(self.out, "\nstartxref\n{xref_pos}\n%%EOF\n")?;
        Ok(self.out)
    }

    fn finish_with_stream(mut self, trailer: Dictionary) -> Result<Vec<u8>> {
        let xref_id = ObjectId::new(self.offsets.len() as u32 + 1, 0);
        let xref_pos = self.out.len();
        let size = self.offsets.len() + 2;

        let max_offset = self
            .offsets
            .iter()
            .map(|(_, off)| *off)
            .max()
            .unwrap_or(0)
            .max(xref_pos);
        // third field must hold the 65535 generation of the free-list head
        let w = [1, byte_width(max_offset as u64), 2];

        let mut rows = Vec::with_capacity(size * w.iter().sum::<usize>());
        push_row(&mut rows, w, 0, 0, u64::from(u16::MAX));
        for (id, offset) in &self.offsets {
            push_row(&mut rows, w, 1, *offset as u64, u64::from(id.generation));
        }
        push_row(&mut rows, w, 1, xref_pos as u64, 0);

        let mut dict = Dictionary::new();
        dict.insert("Type".into(), PdfValue::name("XRef"));
        dict.insert("Size".into(), PdfValue::Int(size as i64));
        dict.insert(
            "W".into(),
            PdfValue::Array(w.iter().map(|&n| PdfValue::Int(n as i64)).collect()),
        );
        dict.insert(
            "Index".into(),
            PdfValue::Array(vec![PdfValue::Int(0), PdfValue::Int(size as i64)]),
        );
        dict.extend(trailer);
        let compressed = flate_encode(&rows)?;
        FilterChain::new(vec![FilterSpec::new(Filter::Flate, None)]).apply_to_dict(&mut dict);
        dict.insert("Length".into(), PdfValue::Int(compressed.len() as i64));

        self.offsets.push((xref_id, xref_pos));
        writeln!(self.out, "{} 0 obj", xref_id.number)?;
        write_dict(&mut self.out, &dict, xref_id)?;
        self.out.extend_from_slice(b"\nstream\n");
        self.out.extend_from_slice(&compressed);
        write!(self.out, "\nendstream\nendobj\nstartxref\n{xref_pos}\n%%EOF\n")?;
        Ok(self.out)
    }
}

fn move_first(dict: &mut Dictionary, key: &str) {
    if let Some(index) = dict.get_index_of(key) {
        dict.move_index(index, 0);
    }
}

/// Smallest number of bytes holding `value` (at least one).
fn byte_width(value: u64) -> usize {
    (((64 - value.leading_zeros()) as usize).div_ceil(8)).max(1)
}

fn push_row(rows: &mut Vec<u8>, w: [usize; 3], kind: u64, field2: u64, field3: u64) {
    for (width, value) in w.into_iter().zip([kind, field2, field3]) {
        let start = rows.len();
        rows.resize(start + width, 0);
        BigEndian::write_uint(&mut rows[start..], value, width);
    }
}

/// Write a direct value. `owner` names the enclosing object in errors.
fn write_value(out: &mut Vec<u8>, value: &PdfValue, owner: ObjectId) -> Result<()> {
    match value {
        PdfValue::Null => out.extend_from_slice(b"null"),
        PdfValue::Bool(b) => write!(out, "{b}")?,
        PdfValue::Int(n) => write!(out, "{n}")?,
        PdfValue::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        PdfValue::Name(name) => write_name(out, name),
        PdfValue::String(bytes) => write_string(out, bytes),
        PdfValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_value(out, item, owner)?;
            }
            out.push(b']');
        }
        PdfValue::Dict(dict) => write_dict(out, dict, owner)?,
        PdfValue::Stream(_) => {
            return Err(PdfError::schema(
                format!("/objects/{} {} obj", owner.number, owner.generation),
                "stream nested inside another object",
            ));
        }
        PdfValue::Ref(id) => write!(out, "{} {} R", id.number, id.generation)?,
    }
    Ok(())
}

fn write_dict(out: &mut Vec<u8>, dict: &Dictionary, owner: ObjectId) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        write_name(out, key);
        out.push(b' ');
        write_value(out, value, owner)?;
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
    Ok(())
}

/// Reals always carry a decimal point and never use exponent notation.
pub(crate) fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        text + ".0"
    }
}

/// `/Name` with irregular bytes written as `#xx`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for &b in name.as_bytes() {
        let regular = b.is_ascii_graphic() && !is_delimiter(b) && b != b'#';
        if regular {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

/// Literal string; parentheses and backslashes are escaped, bytes outside
/// printable ASCII use octal escapes.
fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x20..=0x7e => out.push(b),
            _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
        }
    }
    out.push(b')');
}
