//! Cross-reference resolution.
//!
//! Loads classic `xref` tables and `/Type /XRef` streams, follows `/Prev`
//! and hybrid `/XRefStm` chains (newest entry wins), and rebuilds the index
//! by scanning for `obj` markers when the sections are unusable.

use crate::codec::FilterChain;
use crate::config::ConvertOptions;
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfValue};
use crate::parser::{Keyword, Lexer, PdfParser, StreamOptions, Token};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// `startxref` is searched for in this many trailing bytes.
const STARTXREF_WINDOW: usize = 1024;

/// Keys of a cross-reference stream dictionary that describe the stream
/// itself rather than the document.
const XREF_STREAM_KEYS: [&str; 6] = ["Length", "Filter", "DecodeParms", "W", "Index", "Type"];

static OBJ_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)(?:^|[^0-9])(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj\b")
        .expect("static regex")
});

/// Where an object lives, or that its number was freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Uncompressed object at a byte offset
    InUse { offset: usize, generation: u16 },
    /// Object `index` inside object stream `stream`
    Compressed { stream: u32, index: usize },
    /// Freed number; hides entries for it in older sections
    Free { generation: u16 },
}

impl XrefEntry {
    pub const fn is_free(&self) -> bool {
        matches!(self, XrefEntry::Free { .. })
    }
}

/// Result of [`XrefTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Offset(usize),
    InStream { stream: u32, index: usize },
}

/// One cross-reference section (a table or a stream) with its trailer.
#[derive(Debug, Default)]
struct XrefSection {
    entries: BTreeMap<u32, XrefEntry>,
    trailer: Dictionary,
}

/// Merged cross-reference index of a document.
#[derive(Debug, Default)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
    trailer: Dictionary,
    /// Whether the index was rebuilt by scanning for `obj` markers
    is_fallback: bool,
}

impl XrefTable {
    /// Load the index from `startxref`, falling back to a linear scan when
    /// that fails and the options allow it.
    pub fn load(data: &Bytes, opts: &ConvertOptions) -> Result<Self> {
        let err = match find_startxref(data).and_then(|pos| Self::load_chain(data, pos)) {
            Ok(table) if table.entries.values().any(|e| !e.is_free()) => return Ok(table),
            Ok(_) => PdfError::NoValidXRef,
            Err(err) => err,
        };
        if opts.allow_linear_scan_fallback {
            tracing::warn!(error = %err, "xref unusable, scanning for objects");
            Self::scan(data)
        } else {
            tracing::debug!(error = %err, "xref unusable and linear scan disabled");
            Err(PdfError::NoValidXRef)
        }
    }

    /// Follow the section chain starting at `pos`.
    fn load_chain(data: &Bytes, start: usize) -> Result<Self> {
        let mut sections = Vec::new();
        let mut visited = FxHashSet::default();
        let mut next = Some(start);

        while let Some(pos) = next.take() {
            if !visited.insert(pos) {
                tracing::debug!(pos, "xref chain loops back, stopping");
                break;
            }
            let mut section = load_section_at(data, pos)?;
            let xref_stm = offset_value(section.trailer.get("XRefStm"));
            next = offset_value(section.trailer.get("Prev"));

            // Hybrid files: the stream complements the table it hangs off,
            // filling numbers the table leaves absent or marks free
            if let Some(stm_pos) = xref_stm
                && visited.insert(stm_pos)
            {
                match load_xref_stream(data, stm_pos) {
                    Ok(stm) => {
                        for (num, entry) in stm.entries {
                            if section.entries.get(&num).is_none_or(XrefEntry::is_free) {
                                section.entries.insert(num, entry);
                            }
                        }
                    }
                    Err(err) => tracing::warn!(pos = stm_pos, error = %err, "bad /XRefStm"),
                }
            }
            sections.push(section);
        }

        let mut table = Self::default();
        for section in sections {
            for (num, entry) in section.entries {
                table.entries.entry(num).or_insert(entry);
            }
            for (key, value) in section.trailer {
                table.trailer.entry(key).or_insert(value);
            }
        }
        table.trailer.shift_remove("Prev");
        table.trailer.shift_remove("XRefStm");
        Ok(table)
    }

    /// Rebuild the index from `num gen obj` markers; later definitions win.
    pub fn scan(data: &Bytes) -> Result<Self> {
        let mut table = Self {
            is_fallback: true,
            ..Self::default()
        };

        for cap in OBJ_MARKER.captures_iter(data) {
            let (Some(num), Some(generation)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            let offset = num.start();
            let (Some(num), Some(generation)) = (
                ascii_number::<u32>(num.as_bytes()),
                ascii_number::<u16>(generation.as_bytes()),
            ) else {
                continue;
            };
            table.entries.insert(num, XrefEntry::InUse { offset, generation });
        }

        if table.entries.is_empty() {
            return Err(PdfError::NoValidXRef);
        }

        table.trailer = scan_trailers(data);
        if !table.trailer.contains_key("Root") {
            table.recover_trailer_from_objects(data);
        }
        tracing::debug!(objects = table.entries.len(), "xref rebuilt by scanning");
        Ok(table)
    }

    /// Without a `trailer` keyword, borrow the dictionary of the newest
    /// xref stream, or at least point `/Root` at a catalog.
    fn recover_trailer_from_objects(&mut self, data: &Bytes) {
        let mut catalog = None;
        let mut offsets: Vec<(usize, u32)> = self
            .entries
            .iter()
            .filter_map(|(num, entry)| match entry {
                XrefEntry::InUse { offset, .. } => Some((*offset, *num)),
                XrefEntry::Compressed { .. } | XrefEntry::Free { .. } => None,
            })
            .collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));

        for (offset, _) in offsets {
            let mut parser = PdfParser::from_bytes(data);
            parser.set_pos(offset);
            let Ok((id, value)) = parser.parse_indirect_object(StreamOptions::default()) else {
                continue;
            };
            match &value {
                PdfValue::Stream(s) if s.type_name() == Some("XRef") => {
                    for (key, v) in &s.dict {
                        if !XREF_STREAM_KEYS.contains(&key.as_str()) {
                            self.trailer.entry(key.clone()).or_insert_with(|| v.clone());
                        }
                    }
                    self.trailer.shift_remove("Prev");
                    self.trailer.shift_remove("XRefStm");
                    if self.trailer.contains_key("Root") {
                        return;
                    }
                }
                PdfValue::Dict(d) if catalog.is_none() => {
                    if d.get("Type").and_then(|t| t.as_name().ok()) == Some("Catalog") {
                        catalog = Some(id);
                    }
                }
                _ => {}
            }
        }

        if let Some(root) = catalog {
            self.trailer.insert("Root".into(), PdfValue::Ref(root));
        }
    }

    /// Location of an object, or `UnresolvedReference` when the index has no
    /// in-use entry for its number.
    pub fn resolve(&self, id: ObjectId) -> Result<Location> {
        match self.entries.get(&id.number) {
            Some(XrefEntry::InUse { offset, .. }) => Ok(Location::Offset(*offset)),
            Some(XrefEntry::Compressed { stream, index }) => Ok(Location::InStream {
                stream: *stream,
                index: *index,
            }),
            Some(XrefEntry::Free { .. }) | None => Err(PdfError::UnresolvedReference(id)),
        }
    }

    pub fn entry(&self, number: u32) -> Option<&XrefEntry> {
        self.entries.get(&number)
    }

    /// Entries in ascending object-number order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &XrefEntry)> + '_ {
        self.entries.iter().map(|(num, e)| (*num, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailer merged across sections; `/Prev` and `/XRefStm` removed.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub const fn is_fallback(&self) -> bool {
        self.is_fallback
    }
}

fn offset_value(value: Option<&PdfValue>) -> Option<usize> {
    value
        .and_then(|v| v.as_int().ok())
        .and_then(|n| usize::try_from(n).ok())
}

fn ascii_number<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Offset of the last `startxref` value in the tail of the file.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &data[tail_start..];
    let at = tail
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or(PdfError::NoValidXRef)?;

    let mut lexer = Lexer::new(&tail[at + needle.len()..]);
    match lexer.next_token() {
        Some(Ok((_, Token::Int(n)))) => usize::try_from(n).map_err(|_| PdfError::NoValidXRef),
        _ => Err(PdfError::NoValidXRef),
    }
}

fn load_section_at(data: &Bytes, pos: usize) -> Result<XrefSection> {
    let rest = data.get(pos..).ok_or(PdfError::NoValidXRef)?;
    let mut lexer = Lexer::new(rest);
    lexer.skip_whitespace();
    if lexer.remaining().starts_with(b"xref") {
        load_classic_table(data, pos)
    } else {
        load_xref_stream(data, pos)
    }
}

fn expect_int(lexer: &mut Lexer<'_>) -> Result<i64> {
    match lexer.next_token() {
        Some(Ok((_, Token::Int(n)))) => Ok(n),
        Some(Ok((pos, tok))) => Err(PdfError::UnexpectedToken {
            pos,
            expected: "integer in xref table",
            found: tok.describe(),
        }),
        Some(Err(err)) => Err(err),
        None => Err(PdfError::UnexpectedEof),
    }
}

/// Parse `xref` subsections up to `trailer` and the trailer dictionary.
fn load_classic_table(data: &Bytes, pos: usize) -> Result<XrefSection> {
    let mut section = XrefSection::default();
    let mut lexer = Lexer::new(data.as_ref());
    lexer.set_pos(pos);

    match lexer.next_token() {
        Some(Ok((_, Token::Keyword(Keyword::Xref)))) => {}
        _ => return Err(PdfError::syntax(pos, "expected xref")),
    }

    loop {
        let (tok_pos, token) = lexer.next_token().ok_or(PdfError::UnexpectedEof)??;
        let start = match token {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Int(n) => n,
            other => {
                return Err(PdfError::UnexpectedToken {
                    pos: tok_pos,
                    expected: "xref subsection or trailer",
                    found: other.describe(),
                });
            }
        };
        let count = expect_int(&mut lexer)?;
        let mut base = u32::try_from(start).map_err(|_| PdfError::syntax(tok_pos, "bad subsection"))?;

        for i in 0..count {
            let offset = expect_int(&mut lexer)?;
            let generation = expect_int(&mut lexer)?;
            let marker = match lexer.next_token() {
                Some(Ok((_, Token::Keyword(kw)))) => kw.as_bytes().to_vec(),
                _ => return Err(PdfError::syntax(lexer.tell(), "bad xref entry marker")),
            };

            // Subsections that start at 1 but still carry the object 0 free
            // entry are shifted down by one.
            if i == 0 && base > 0 && marker == b"f" && offset == 0 && generation == 65535 {
                base -= 1;
            }
            let num = base.saturating_add(u32::try_from(i).unwrap_or(u32::MAX));

            if marker == b"n" {
                let (Ok(offset), Ok(generation)) =
                    (usize::try_from(offset), u16::try_from(generation))
                else {
                    return Err(PdfError::syntax(lexer.tell(), "xref entry out of range"));
                };
                section
                    .entries
                    .insert(num, XrefEntry::InUse { offset, generation });
            } else {
                let generation = u16::try_from(generation).unwrap_or(u16::MAX);
                section.entries.insert(num, XrefEntry::Free { generation });
            }
        }
    }

    let mut parser = PdfParser::from_bytes(data);
    parser.set_pos(lexer.tell());
    if let PdfValue::Dict(trailer) = parser.parse_object()? {
        section.trailer = trailer;
    } else {
        return Err(PdfError::syntax(lexer.tell(), "trailer is not a dictionary"));
    }

    Ok(section)
}

/// Read a `/Type /XRef` stream at `pos`.
///
/// The stream is decoded through the filter pipeline before any other
/// object can be located.
fn load_xref_stream(data: &Bytes, pos: usize) -> Result<XrefSection> {
    let mut parser = PdfParser::from_bytes(data);
    parser.set_pos(pos);
    let (id, value) = parser.parse_indirect_object(StreamOptions::default())?;
    let stream = value.as_stream()?;

    let widths: Vec<usize> = stream
        .get("W")
        .ok_or_else(|| PdfError::syntax(pos, format!("missing /W in xref stream {id}")))?
        .as_array()?
        .iter()
        .map(|w| w.as_int().map(|n| usize::try_from(n).unwrap_or(0)))
        .collect::<Result<_>>()?;
    let [w0, w1, w2] = widths[..] else {
        return Err(PdfError::syntax(pos, "/W must have 3 elements"));
    };
    if w1 > 8 || w2 > 8 || w0 > 8 {
        return Err(PdfError::syntax(pos, "/W field wider than 8 bytes"));
    }
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(PdfError::syntax(pos, "/W fields are all zero"));
    }

    let size = stream
        .get("Size")
        .ok_or_else(|| PdfError::syntax(pos, "missing /Size in xref stream"))?
        .as_int()?;

    let index: Vec<(i64, i64)> = match stream.get("Index") {
        Some(idx) => idx
            .as_array()?
            .iter()
            .map(PdfValue::as_int)
            .tuples()
            .map(|(start, count)| -> Result<(i64, i64)> { Ok((start?, count?)) })
            .collect::<Result<_>>()?,
        None => vec![(0, size)],
    };

    let decoded = FilterChain::from_dict(&stream.dict).decode(stream.raw())?;
    let mut section = XrefSection::default();
    let mut records = decoded.chunks_exact(entry_size);

    'subsections: for (start, count) in index {
        for i in 0..count {
            let Some(record) = records.next() else {
                tracing::debug!(object = %id, "xref stream shorter than /Index");
                break 'subsections;
            };
            let Ok(num) = u32::try_from(start + i) else {
                continue;
            };
            let entry_type = if w0 == 0 { 1 } else { read_uint(&record[..w0]) };
            let field1 = read_uint(&record[w0..w0 + w1]);
            let field2 = read_uint(&record[w0 + w1..]);

            match entry_type {
                1 => {
                    section.entries.insert(
                        num,
                        XrefEntry::InUse {
                            offset: field1 as usize,
                            generation: u16::try_from(field2).unwrap_or(u16::MAX),
                        },
                    );
                }
                2 => {
                    section.entries.insert(
                        num,
                        XrefEntry::Compressed {
                            stream: u32::try_from(field1).unwrap_or(u32::MAX),
                            index: field2 as usize,
                        },
                    );
                }
                // 0 is free; other types are reserved and read as free
                _ => {
                    section.entries.insert(
                        num,
                        XrefEntry::Free {
                            generation: u16::try_from(field2).unwrap_or(u16::MAX),
                        },
                    );
                }
            }
        }
    }

    section.trailer = stream
        .dict
        .iter()
        .filter(|(key, _)| !XREF_STREAM_KEYS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(section)
}

/// Big-endian unsigned integer of up to 8 bytes; empty fields read as 0.
pub(crate) fn read_uint(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

/// Merge every `trailer` dictionary in the file; later ones win.
fn scan_trailers(data: &Bytes) -> Dictionary {
    let needle = b"trailer";
    let mut trailer = Dictionary::new();
    let mut search = 0;
    while let Some(rel) = data[search..]
        .windows(needle.len())
        .position(|w| w == needle)
    {
        let at = search + rel;
        search = at + needle.len();
        let mut parser = PdfParser::from_bytes(data);
        parser.set_pos(search);
        if let Ok(PdfValue::Dict(dict)) = parser.parse_object() {
            trailer.extend(dict);
        }
    }
    trailer.shift_remove("Prev");
    trailer.shift_remove("XRefStm");
    trailer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startxref_takes_last_occurrence() {
        let data = b"%PDF-1.4\nstartxref\n10\n%%EOF\nstartxref\n42\n%%EOF\n";
        assert_eq!(find_startxref(data).unwrap(), 42);
    }

    #[test]
    fn startxref_missing_is_no_valid_xref() {
        assert!(matches!(
            find_startxref(b"%PDF-1.4\n%%EOF"),
            Err(PdfError::NoValidXRef)
        ));
    }

    #[test]
    fn classic_table_with_shifted_subsection() {
        let body = b"xref\n1 3\n0000000000 65535 f \n0000000015 00000 n \n0000000079 00001 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n";
        let data = Bytes::from_static(body);
        let section = load_classic_table(&data, 0).unwrap();
        assert_eq!(
            section.entries.get(&1),
            Some(&XrefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(
            section.entries.get(&2),
            Some(&XrefEntry::InUse {
                offset: 79,
                generation: 1
            })
        );
        assert_eq!(section.trailer["Size"], PdfValue::Int(3));
        assert_eq!(
            section.entries.get(&0),
            Some(&XrefEntry::Free { generation: 65535 })
        );
    }

    #[test]
    fn read_uint_widths() {
        assert_eq!(read_uint(&[]), 0);
        assert_eq!(read_uint(&[0x01, 0x02]), 0x0102);
        assert_eq!(read_uint(&[0, 0, 1, 0]), 256);
    }

    #[test]
    fn scan_finds_markers_and_trailer() {
        let data = Bytes::from_static(
            b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n12 3 obj\n(x)\nendobj\ntrailer\n<< /Root 1 0 R >>\n",
        );
        let table = XrefTable::scan(&data).unwrap();
        assert!(table.is_fallback());
        assert_eq!(table.resolve(ObjectId::new(1, 0)).unwrap(), Location::Offset(9));
        assert_eq!(
            table.entry(12),
            Some(&XrefEntry::InUse {
                offset: 45,
                generation: 3
            })
        );
        assert_eq!(table.trailer()["Root"], PdfValue::Ref(ObjectId::new(1, 0)));
    }

    #[test]
    fn scan_recovers_root_from_catalog() {
        let data = Bytes::from_static(
            b"%PDF-1.4\n1 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n2 0 obj\n<< /Type /Catalog /Pages 1 0 R >>\nendobj\n",
        );
        let table = XrefTable::scan(&data).unwrap();
        assert_eq!(table.trailer()["Root"], PdfValue::Ref(ObjectId::new(2, 0)));
    }

    #[test]
    fn unknown_object_is_unresolved() {
        let table = XrefTable::default();
        assert!(matches!(
            table.resolve(ObjectId::new(4, 0)),
            Err(PdfError::UnresolvedReference(id)) if id == ObjectId::new(4, 0)
        ));
    }
}
