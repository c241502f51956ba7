//! PDF object parser - converts tokens to PDF objects.
//!
//! Recursive descent over arrays and dictionaries, `num gen R` references
//! via token lookahead, and `num gen obj ... endobj` indirect objects whose
//! dictionaries may be followed by a stream body.

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, ObjectId, PdfStream, PdfValue};
use crate::parser::lexer::{Keyword, Lexer, Token, is_whitespace};
use bytes::Bytes;

/// Maximum array/dictionary nesting accepted before giving up.
const MAX_DEPTH: usize = 256;

/// Resolves an indirect `/Length` while a stream body is being read.
pub type LengthResolver<'r> = &'r dyn Fn(ObjectId) -> Option<i64>;

/// Options for reading stream bodies.
#[derive(Clone, Copy, Default)]
pub struct StreamOptions<'r> {
    /// Resolves an indirect `/Length`
    pub resolve_length: Option<LengthResolver<'r>>,
    /// Ignore `/Length` and scan for `endstream`
    pub force_scan: bool,
    /// A `/Length` disagreeing with `endstream` is an error rather than a warning
    pub strict: bool,
}

/// PDF Parser - parses PDF object syntax on top of [`Lexer`].
pub struct PdfParser<'a> {
    lexer: Lexer<'a>,
    /// Shared handle on the buffer, so stream payloads can be sliced
    source: Option<Bytes>,
    /// Lookahead buffer for tokens (popped from the end)
    lookahead: Vec<(usize, Token)>,
}

impl<'a> PdfParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            source: None,
            lookahead: Vec::new(),
        }
    }

    /// Parser over shared bytes; stream payloads become zero-copy slices.
    pub fn from_bytes(data: &'a Bytes) -> Self {
        Self {
            lexer: Lexer::new(data.as_ref()),
            source: Some(data.clone()),
            lookahead: Vec::new(),
        }
    }

    /// Position of the next unread token.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.set_pos(pos);
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.lexer.data()[self.tell()..]
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    fn expect_token(&mut self) -> Result<(usize, Token)> {
        self.next_token()?.ok_or(PdfError::UnexpectedEof)
    }

    /// Parse next PDF object.
    pub fn parse_object(&mut self) -> Result<PdfValue> {
        self.parse_nested(0)
    }

    fn parse_nested(&mut self, depth: usize) -> Result<PdfValue> {
        let (pos, token) = self.expect_token()?;
        self.token_to_object(pos, token, depth)
    }

    /// Every array element and dict value passes through here, so the depth
    /// limit holds for both container kinds.
    fn token_to_object(&mut self, pos: usize, token: Token, depth: usize) -> Result<PdfValue> {
        if depth > MAX_DEPTH {
            return Err(PdfError::syntax(pos, "objects nested too deeply"));
        }
        match token {
            Token::Int(n) => self.int_or_reference(pos, n),
            Token::Real(n) => Ok(PdfValue::Real(n)),
            Token::Bool(b) => Ok(PdfValue::Bool(b)),
            Token::Name(s) => Ok(PdfValue::Name(s)),
            Token::String(s) => Ok(PdfValue::String(s)),
            Token::Keyword(Keyword::Null) => Ok(PdfValue::Null),
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(depth),
            Token::Keyword(Keyword::DictStart) => self.parse_dict(depth),
            other => Err(PdfError::UnexpectedToken {
                pos,
                expected: "object",
                found: other.describe(),
            }),
        }
    }

    /// `n` alone, or the start of `n g R`.
    fn int_or_reference(&mut self, pos: usize, n: i64) -> Result<PdfValue> {
        let Some(second) = self.next_token()? else {
            return Ok(PdfValue::Int(n));
        };
        let Token::Int(g) = second.1 else {
            self.push_back(second);
            return Ok(PdfValue::Int(n));
        };
        let Some(third) = self.next_token()? else {
            self.push_back(second);
            return Ok(PdfValue::Int(n));
        };
        if third.1 == Token::Keyword(Keyword::R) {
            return reference(pos, n, g).map(PdfValue::Ref);
        }
        self.push_back(third);
        self.push_back(second);
        Ok(PdfValue::Int(n))
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, depth: usize) -> Result<PdfValue> {
        let mut arr = Vec::new();
        loop {
            let (pos, token) = self.expect_token()?;
            if token == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(pos, token, depth + 1)?);
        }
        Ok(PdfValue::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self, depth: usize) -> Result<PdfValue> {
        let mut dict = Dictionary::new();
        loop {
            let (pos, token) = self.expect_token()?;
            let key = match token {
                Token::Keyword(Keyword::DictEnd) => break,
                Token::Name(name) => name,
                other => {
                    return Err(PdfError::UnexpectedToken {
                        pos,
                        expected: "name as dict key",
                        found: other.describe(),
                    });
                }
            };
            let value = self.parse_nested(depth + 1)?;
            dict.insert(key, value);
        }
        Ok(PdfValue::Dict(dict))
    }

    /// Parse `num gen obj <object> endobj` at the current position.
    ///
    /// A dictionary followed by `stream` becomes a [`PdfStream`]. A missing
    /// `endobj` is tolerated.
    pub fn parse_indirect_object(&mut self, opts: StreamOptions<'_>) -> Result<(ObjectId, PdfValue)> {
        let (pos, num) = self.expect_token()?;
        let (_, generation) = self.expect_token()?;
        let id = match (num, generation) {
            (Token::Int(n), Token::Int(g)) => reference(pos, n, g)?,
            (other, _) => {
                return Err(PdfError::UnexpectedToken {
                    pos,
                    expected: "object header",
                    found: other.describe(),
                });
            }
        };
        let (kw_pos, kw) = self.expect_token()?;
        if kw != Token::Keyword(Keyword::Obj) {
            return Err(PdfError::UnexpectedToken {
                pos: kw_pos,
                expected: "obj",
                found: kw.describe(),
            });
        }

        let mut value = self.parse_object()?;

        match self.next_token()? {
            Some((stream_pos, Token::Keyword(Keyword::Stream))) => {
                let PdfValue::Dict(dict) = value else {
                    return Err(PdfError::syntax(stream_pos, "stream without dictionary"));
                };
                value = self.parse_stream_body(id, dict, opts)?.into();
                self.skip_endobj()?;
            }
            Some((_, Token::Keyword(Keyword::EndObj))) | None => {}
            Some(other) => {
                tracing::debug!(object = %id, found = %other.1.describe(), "missing endobj");
                self.push_back(other);
            }
        }

        Ok((id, value))
    }

    fn skip_endobj(&mut self) -> Result<()> {
        match self.next_token()? {
            Some((_, Token::Keyword(Keyword::EndObj))) | None => {}
            Some(other) => self.push_back(other),
        }
        Ok(())
    }

    /// Read the payload after the `stream` keyword.
    ///
    /// The declared `/Length` is trusted when `endstream` follows it;
    /// otherwise the payload runs to the `endstream` marker.
    fn parse_stream_body(
        &mut self,
        id: ObjectId,
        dict: Dictionary,
        opts: StreamOptions<'_>,
    ) -> Result<PdfStream> {
        debug_assert!(self.lookahead.is_empty());
        let data = self.lexer.data();
        let mut start = self.lexer.tell();
        // The keyword is followed by CRLF or LF; a bare CR is accepted
        if data.get(start) == Some(&b'\r') {
            start += 1;
        }
        if data.get(start) == Some(&b'\n') {
            start += 1;
        }

        let declared = if opts.force_scan {
            None
        } else {
            match dict.get("Length") {
                Some(PdfValue::Int(n)) => Some(*n),
                Some(PdfValue::Ref(len_id)) => opts.resolve_length.and_then(|f| f(*len_id)),
                _ => None,
            }
        }
        .and_then(|n| usize::try_from(n).ok());

        let declared_end = declared.and_then(|len| {
            let end = start.checked_add(len)?;
            endstream_follows(data, end).map(|after| (end, after))
        });

        let (end, after) = match declared_end {
            Some(found) => found,
            None => {
                let (end, after) = find_endstream(data, start)
                    .ok_or_else(|| PdfError::syntax(start, format!("missing endstream in {id}")))?;
                if let Some(len) = declared {
                    if opts.strict {
                        return Err(PdfError::syntax(
                            start,
                            format!("{id}: /Length {len} disagrees with endstream"),
                        ));
                    }
                    tracing::warn!(object = %id, declared = len, actual = end - start, "stream length mismatch");
                } else if !opts.force_scan {
                    tracing::debug!(object = %id, "stream without usable /Length");
                }
                (end, after)
            }
        };

        let raw = match &self.source {
            Some(bytes) => bytes.slice(start..end),
            None => Bytes::copy_from_slice(&data[start..end]),
        };
        self.lexer.set_pos(after);
        Ok(PdfStream::new(dict, raw))
    }
}

fn reference(pos: usize, n: i64, g: i64) -> Result<ObjectId> {
    match (u32::try_from(n), u16::try_from(g)) {
        (Ok(n), Ok(g)) => Ok(ObjectId::new(n, g)),
        _ => Err(PdfError::syntax(pos, format!("invalid object id {n} {g}"))),
    }
}

/// If `endstream` follows `end` (after optional whitespace), the offset just
/// past it.
fn endstream_follows(data: &[u8], end: usize) -> Option<usize> {
    let mut pos = end;
    while data.get(pos).is_some_and(|&b| is_whitespace(b)) {
        pos += 1;
    }
    data.get(pos..)?
        .starts_with(b"endstream")
        .then_some(pos + b"endstream".len())
}

/// Scan for `endstream` from `start`; returns (payload end, offset past the
/// keyword). One end-of-line marker before the keyword is not payload.
pub(crate) fn find_endstream(data: &[u8], start: usize) -> Option<(usize, usize)> {
    let needle = b"endstream";
    let hay = data.get(start..)?;
    let rel = hay.windows(needle.len()).position(|w| w == needle)?;
    let kw = start + rel;
    let mut end = kw;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some((end, kw + needle.len()))
}
