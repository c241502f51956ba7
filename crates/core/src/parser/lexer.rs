//! PDF tokenizer.
//!
//! Classifies the PDF whitespace and delimiter sets, skips `%` comments and
//! produces numbers, names, literal/hex strings and keywords.

use crate::error::{PdfError, Result};

/// Keywords that matter to the object grammar. Anything else is kept as
/// `Unknown` with its original bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Unknown(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Keyword::ArrayStart,
            b"]" => Keyword::ArrayEnd,
            b"<<" => Keyword::DictStart,
            b">>" => Keyword::DictEnd,
            b"null" => Keyword::Null,
            b"obj" => Keyword::Obj,
            b"endobj" => Keyword::EndObj,
            b"R" => Keyword::R,
            b"stream" => Keyword::Stream,
            b"endstream" => Keyword::EndStream,
            b"xref" => Keyword::Xref,
            b"trailer" => Keyword::Trailer,
            b"startxref" => Keyword::StartXref,
            _ => Keyword::Unknown(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Keyword::ArrayStart => b"[",
            Keyword::ArrayEnd => b"]",
            Keyword::DictStart => b"<<",
            Keyword::DictEnd => b">>",
            Keyword::Null => b"null",
            Keyword::Obj => b"obj",
            Keyword::EndObj => b"endobj",
            Keyword::R => b"R",
            Keyword::Stream => b"stream",
            Keyword::EndStream => b"endstream",
            Keyword::Xref => b"xref",
            Keyword::Trailer => b"trailer",
            Keyword::StartXref => b"startxref",
            Keyword::Unknown(bytes) => bytes.as_slice(),
        }
    }
}

/// Token types produced by [`Lexer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// Name without the leading slash, `#xx` escapes resolved
    Name(String),
    /// Literal or hex string
    String(Vec<u8>),
    Keyword(Keyword),
}

impl Token {
    /// Short human-readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(n) => n.to_string(),
            Token::Real(n) => n.to_string(),
            Token::Bool(b) => b.to_string(),
            Token::Name(n) => format!("/{n}"),
            Token::String(_) => "string".to_string(),
            Token::Keyword(kw) => String::from_utf8_lossy(kw.as_bytes()).into_owned(),
        }
    }
}

/// PDF whitespace set.
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

/// PDF delimiter set.
pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Offset of the first CR or LF in `data`.
fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\n' || b == b'\r')
}

const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Tokenizer over an in-memory buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Start offset of the last token returned
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Current position in the buffer
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        self.token_pos = self.pos;
    }

    /// Start offset of the last token returned.
    pub fn token_pos(&self) -> usize {
        self.token_pos
    }

    /// Remaining unparsed data
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'%' {
                self.pos += 1;
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Parse a name (/Name)
    fn parse_name(&mut self) -> Token {
        self.advance(); // '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let escaped = self
                    .peek()
                    .and_then(hex_value)
                    .zip(self.peek_at(1).and_then(hex_value));
                if let Some((hi, lo)) = escaped {
                    self.pos += 2;
                    name.push((hi << 4) | lo);
                    continue;
                }
            }
            name.push(b);
        }

        Token::Name(String::from_utf8_lossy(&name).into_owned())
    }

    /// Parse a number (integer or real)
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }

        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| PdfError::syntax(start, "invalid number"))?;

        if has_dot {
            // "4." and "-.5" are valid PDF reals
            let normalized = match text {
                t if t.ends_with('.') => format!("{t}0"),
                t => t.to_string(),
            };
            let val: f64 = normalized
                .parse()
                .map_err(|_| PdfError::syntax(start, format!("invalid real: {text}")))?;
            Ok(Token::Real(val))
        } else {
            match text.parse::<i64>() {
                Ok(val) => Ok(Token::Int(val)),
                // Out-of-range integers degrade to reals
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| PdfError::syntax(start, format!("invalid int: {text}"))),
            }
        }
    }

    /// Parse a literal string (...)
    fn parse_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        // line continuation
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c @ b'0'..=b'7') => {
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    self.advance();
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    // Unknown escape keeps the character; covers \( \) \\
                    Some(c) => result.push(c),
                    None => return Err(PdfError::syntax(self.pos, "backslash at end of input")),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::syntax(start, "unterminated literal string")),
            }
        }

        Ok(Token::String(result))
    }

    /// Parse a hex string <...>
    fn parse_hex_string(&mut self) -> Result<Token> {
        let start = self.pos;
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.advance() {
                Some(b'>') => break,
                Some(c) if is_whitespace(c) => {}
                Some(c) => {
                    let nibble = hex_value(c).ok_or_else(|| {
                        PdfError::syntax(self.pos - 1, format!("invalid byte {c:#04x} in hex string"))
                    })?;
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                None => return Err(PdfError::syntax(start, "unterminated hex string")),
            }
        }

        // Odd digit count: missing final digit is zero
        if let Some(high) = pending {
            result.push(high << 4);
        }

        Ok(Token::String(result))
    }

    /// Parse a bare keyword (true, obj, R, ...)
    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.advance();
        }

        match &self.data[start..self.pos] {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            bytes => Token::Keyword(Keyword::from_bytes(bytes)),
        }
    }

    /// Get next token with its start offset; `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();

        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.parse_name()),
            b'(' => self.parse_string(),
            b'<' if self.peek_at(1) == Some(b'<') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictStart))
            }
            b'<' => self.parse_hex_string(),
            b'>' if self.peek_at(1) == Some(b'>') => {
                self.pos += 2;
                Ok(Token::Keyword(Keyword::DictEnd))
            }
            b'[' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'>' | b')' | b'{' | b'}' => {
                self.advance();
                Ok(Token::Keyword(Keyword::Unknown(vec![b])))
            }
            b'+' | b'-' | b'.'
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') =>
            {
                self.parse_number()
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(data);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_token() {
            out.push(tok.unwrap().1);
        }
        out
    }

    #[test]
    fn classifies_basic_tokens() {
        let toks = tokens(b"12 -3 +4.5 .25 4. true /Type null R [ ] << >>");
        assert_eq!(
            toks,
            vec![
                Token::Int(12),
                Token::Int(-3),
                Token::Real(4.5),
                Token::Real(0.25),
                Token::Real(4.0),
                Token::Bool(true),
                Token::Name("Type".into()),
                Token::Keyword(Keyword::Null),
                Token::Keyword(Keyword::R),
                Token::Keyword(Keyword::ArrayStart),
                Token::Keyword(Keyword::ArrayEnd),
                Token::Keyword(Keyword::DictStart),
                Token::Keyword(Keyword::DictEnd),
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let toks = tokens(b"1 % a comment ( not a string\n2\r% another\r3");
        assert_eq!(toks, vec![Token::Int(1), Token::Int(2), Token::Int(3)]);
    }

    #[test]
    fn name_hex_escapes() {
        assert_eq!(
            tokens(b"/A#20B /Lime#20Green /bad#zz"),
            vec![
                Token::Name("A B".into()),
                Token::Name("Lime Green".into()),
                Token::Name("bad#zz".into()),
            ]
        );
    }

    #[test]
    fn literal_string_nesting_and_escapes() {
        let toks = tokens(b"(a (nested) \\(x\\) \\n\\101\\7 \\q)");
        assert_eq!(
            toks,
            vec![Token::String(b"a (nested) (x) \nA\x07 q".to_vec())]
        );
    }

    #[test]
    fn literal_string_line_continuation() {
        assert_eq!(
            tokens(b"(one\\\r\ntwo\\\nthree)"),
            vec![Token::String(b"onetwothree".to_vec())]
        );
    }

    #[test]
    fn hex_string_with_whitespace_and_odd_digits() {
        assert_eq!(
            tokens(b"<48 65 6C6C 6F7>"),
            vec![Token::String(b"Hello\x70".to_vec())]
        );
    }

    #[test]
    fn unterminated_string_is_malformed() {
        let mut lexer = Lexer::new(b"(never closed");
        let err = lexer.next_token().unwrap().unwrap_err();
        assert!(matches!(err, PdfError::MalformedSyntax { pos: 0, .. }));
    }

    #[test]
    fn trailing_backslash_is_malformed() {
        let mut lexer = Lexer::new(b"(abc\\");
        assert!(lexer.next_token().unwrap().is_err());
    }

    #[test]
    fn invalid_hex_digit_is_malformed() {
        let mut lexer = Lexer::new(b"<12G4>");
        let err = lexer.next_token().unwrap().unwrap_err();
        assert!(matches!(err, PdfError::MalformedSyntax { pos: 3, .. }));
    }

    #[test]
    fn token_positions_are_reported() {
        let mut lexer = Lexer::new(b"  1 0 obj");
        let positions: Vec<usize> = std::iter::from_fn(|| lexer.next_token())
            .map(|t| t.unwrap().0)
            .collect();
        assert_eq!(positions, vec![2, 4, 6]);
    }

    #[test]
    fn stray_closing_paren_does_not_stall() {
        let toks = tokens(b") 1");
        assert_eq!(
            toks,
            vec![Token::Keyword(Keyword::Unknown(b")".to_vec())), Token::Int(1)]
        );
    }
}
