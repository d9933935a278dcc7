//! Incremental, non-blocking JSON tokenizer.
//!
//! Bytes are pushed with [`JsonTokenizer::feed`] in chunks of any size. [`JsonTokenizer::next_token`]
//! returns [`Next::NeedMoreInput`] whenever the buffered bytes end inside a token; the partial
//! token stays buffered and is scanned again once more input arrives. Member names are not
//! reported as tokens of their own, they are attached to the value that follows them.
use super::Next;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    String(String),
    Integer(String),
    Float(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonToken {
    /// Member name when the token is the value of an object member.
    pub name: Option<String>,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    FirstValueOrEnd,
    FirstNameOrEnd,
    Name,
    Colon,
    CommaOrEnd,
    Done,
}

enum Scan<T> {
    Complete(T, usize),
    Incomplete,
}

const COMPACT_THRESHOLD: usize = 8 * 1024;

#[derive(Debug)]
pub struct JsonTokenizer {
    buffer: Vec<u8>,
    pos: usize,
    drained: u64,
    eof: bool,
    stack: Vec<Container>,
    expect: Expect,
    pending_name: Option<String>,
}

impl Default for JsonTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonTokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pos: 0,
            drained: 0,
            eof: false,
            stack: Vec::new(),
            expect: Expect::Value,
            pending_name: None,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        if self.pos >= COMPACT_THRESHOLD || self.pos == self.buffer.len() {
            self.buffer.drain(..self.pos);
            self.drained += self.pos as u64;
            self.pos = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// No more bytes will follow; a token cut off at the end is now an error.
    pub fn end_of_input(&mut self) {
        self.eof = true;
    }

    /// Absolute offset of the next unread byte.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.drained + self.pos as u64
    }

    /// Nesting depth of the containers opened so far.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed input or input that ends in the middle of the
    /// document after [`JsonTokenizer::end_of_input`].
    pub fn next_token(&mut self) -> Result<Next<JsonToken>> {
        loop {
            self.skip_whitespace();

            let Some(&byte) = self.buffer.get(self.pos) else {
                return match (self.eof, self.expect) {
                    (true, Expect::Done) => Ok(Next::EndOfInput),
                    (true, _) => Err(self.error("unexpected end of input")),
                    (false, _) => Ok(Next::NeedMoreInput),
                };
            };

            match self.expect {
                Expect::Done => return Err(self.error("trailing characters after document")),
                Expect::Colon => {
                    if byte != b':' {
                        return Err(self.error("expected ':'"));
                    }
                    self.pos += 1;
                    self.expect = Expect::Value;
                }
                Expect::CommaOrEnd => match (byte, self.stack.last()) {
                    (b',', Some(Container::Object)) => {
                        self.pos += 1;
                        self.expect = Expect::Name;
                    }
                    (b',', Some(Container::Array)) => {
                        self.pos += 1;
                        self.expect = Expect::Value;
                    }
                    (b'}', Some(Container::Object)) => return Ok(self.close(TokenKind::EndObject)),
                    (b']', Some(Container::Array)) => return Ok(self.close(TokenKind::EndArray)),
                    _ => return Err(self.error("expected ',' or end of container")),
                },
                Expect::FirstNameOrEnd | Expect::Name => {
                    if byte == b'}' && self.expect == Expect::FirstNameOrEnd {
                        return Ok(self.close(TokenKind::EndObject));
                    }
                    if byte != b'"' {
                        return Err(self.error("expected member name"));
                    }
                    match self.scan_string(self.pos)? {
                        Scan::Complete(name, end) => {
                            self.pending_name = Some(name);
                            self.pos = end;
                            self.expect = Expect::Colon;
                        }
                        Scan::Incomplete => return self.incomplete(),
                    }
                }
                Expect::FirstValueOrEnd if byte == b']' => {
                    return Ok(self.close(TokenKind::EndArray));
                }
                Expect::Value | Expect::FirstValueOrEnd => return self.read_value(byte),
            }
        }
    }

    fn read_value(&mut self, byte: u8) -> Result<Next<JsonToken>> {
        let scanned = match byte {
            b'{' => {
                self.stack.push(Container::Object);
                self.expect = Expect::FirstNameOrEnd;
                self.pos += 1;
                return Ok(self.token(TokenKind::StartObject));
            }
            b'[' => {
                self.stack.push(Container::Array);
                self.expect = Expect::FirstValueOrEnd;
                self.pos += 1;
                return Ok(self.token(TokenKind::StartArray));
            }
            b'"' => match self.scan_string(self.pos)? {
                Scan::Complete(value, end) => Scan::Complete(TokenKind::String(value), end),
                Scan::Incomplete => Scan::Incomplete,
            },
            b'-' | b'0'..=b'9' => self.scan_number()?,
            b't' => self.scan_literal(b"true", TokenKind::Bool(true))?,
            b'f' => self.scan_literal(b"false", TokenKind::Bool(false))?,
            b'n' => self.scan_literal(b"null", TokenKind::Null)?,
            _ => return Err(self.error(format!("unexpected character '{}'", byte as char))),
        };

        match scanned {
            Scan::Complete(kind, end) => {
                self.pos = end;
                self.expect = self.after_value();
                Ok(self.token(kind))
            }
            Scan::Incomplete => self.incomplete(),
        }
    }

    fn token(&mut self, kind: TokenKind) -> Next<JsonToken> {
        Next::Token(JsonToken {
            name: self.pending_name.take(),
            kind,
        })
    }

    fn close(&mut self, kind: TokenKind) -> Next<JsonToken> {
        self.stack.pop();
        self.pos += 1;
        self.expect = self.after_value();
        Next::Token(JsonToken { name: None, kind })
    }

    fn after_value(&self) -> Expect {
        if self.stack.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        }
    }

    fn incomplete<T>(&self) -> Result<Next<T>> {
        if self.eof {
            Err(self.error("unexpected end of input"))
        } else {
            Ok(Next::NeedMoreInput)
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, "", self.offset())
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.buffer.get(self.pos) {
            self.pos += 1;
        }
    }

    fn scan_literal(&self, literal: &[u8], kind: TokenKind) -> Result<Scan<TokenKind>> {
        let available = &self.buffer[self.pos..];
        if available.len() < literal.len() {
            return if literal.starts_with(available) {
                Ok(Scan::Incomplete)
            } else {
                Err(self.error("invalid literal"))
            };
        }
        if &available[..literal.len()] == literal {
            Ok(Scan::Complete(kind, self.pos + literal.len()))
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn scan_number(&self) -> Result<Scan<TokenKind>> {
        let start = self.pos;
        let mut end = start;
        while let Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') = self.buffer.get(end) {
            end += 1;
        }
        if end == self.buffer.len() && !self.eof {
            return Ok(Scan::Incomplete);
        }

        let raw = &self.buffer[start..end];
        if !is_json_number(raw) {
            return Err(self.error(format!(
                "invalid number '{}'",
                String::from_utf8_lossy(raw)
            )));
        }
        let text = String::from_utf8_lossy(raw).into_owned();
        let kind = if raw.iter().any(|b| matches!(b, b'.' | b'e' | b'E')) {
            TokenKind::Float(text)
        } else {
            TokenKind::Integer(text)
        };
        Ok(Scan::Complete(kind, end))
    }

    fn scan_string(&self, quote: usize) -> Result<Scan<String>> {
        let mut bytes = Vec::new();
        let mut i = quote + 1;
        loop {
            let Some(&byte) = self.buffer.get(i) else {
                return Ok(Scan::Incomplete);
            };
            match byte {
                b'"' => {
                    let text = String::from_utf8(bytes)
                        .map_err(|_| self.error("invalid UTF-8 in string"))?;
                    return Ok(Scan::Complete(text, i + 1));
                }
                b'\\' => {
                    let Some(&escape) = self.buffer.get(i + 1) else {
                        return Ok(Scan::Incomplete);
                    };
                    let simple = match escape {
                        b'"' => Some(b'"'),
                        b'\\' => Some(b'\\'),
                        b'/' => Some(b'/'),
                        b'b' => Some(0x08),
                        b'f' => Some(0x0c),
                        b'n' => Some(b'\n'),
                        b'r' => Some(b'\r'),
                        b't' => Some(b'\t'),
                        b'u' => None,
                        _ => return Err(self.error("invalid escape sequence")),
                    };
                    if let Some(unescaped) = simple {
                        bytes.push(unescaped);
                        i += 2;
                        continue;
                    }

                    let Some(first) = self.hex4(i + 2)? else {
                        return Ok(Scan::Incomplete);
                    };
                    let (code, consumed) = if (0xD800..0xDC00).contains(&first) {
                        if self.buffer.len() < i + 8 {
                            return Ok(Scan::Incomplete);
                        }
                        if &self.buffer[i + 6..i + 8] != b"\\u" {
                            return Err(self.error("unpaired surrogate in string"));
                        }
                        let Some(second) = self.hex4(i + 8)? else {
                            return Ok(Scan::Incomplete);
                        };
                        if !(0xDC00..0xE000).contains(&second) {
                            return Err(self.error("unpaired surrogate in string"));
                        }
                        (0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00), 12)
                    } else {
                        (first, 6)
                    };
                    let chr = char::from_u32(code)
                        .ok_or_else(|| self.error("invalid unicode escape"))?;
                    let mut utf8 = [0u8; 4];
                    bytes.extend_from_slice(chr.encode_utf8(&mut utf8).as_bytes());
                    i += consumed;
                }
                0x00..=0x1f => return Err(self.error("control character in string")),
                _ => {
                    bytes.push(byte);
                    i += 1;
                }
            }
        }
    }

    fn hex4(&self, start: usize) -> Result<Option<u32>> {
        let Some(digits) = self.buffer.get(start..start + 4) else {
            return Ok(None);
        };
        let text = std::str::from_utf8(digits).map_err(|_| self.error("invalid unicode escape"))?;
        u32::from_str_radix(text, 16)
            .map(Some)
            .map_err(|_| self.error("invalid unicode escape"))
    }
}

fn is_json_number(raw: &[u8]) -> bool {
    let mut i = 0;
    if raw.get(i) == Some(&b'-') {
        i += 1;
    }
    match raw.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => {
            while let Some(b'0'..=b'9') = raw.get(i) {
                i += 1;
            }
        }
        _ => return false,
    }
    if raw.get(i) == Some(&b'.') {
        i += 1;
        let digits = i;
        while let Some(b'0'..=b'9') = raw.get(i) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    if let Some(b'e' | b'E') = raw.get(i) {
        i += 1;
        if let Some(b'+' | b'-') = raw.get(i) {
            i += 1;
        }
        let digits = i;
        while let Some(b'0'..=b'9') = raw.get(i) {
            i += 1;
        }
        if i == digits {
            return false;
        }
    }
    i == raw.len()
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokenize_chunks(chunks: &[&[u8]]) -> Result<Vec<JsonToken>> {
        let mut tokenizer = JsonTokenizer::new();
        let mut tokens = Vec::new();
        for chunk in chunks {
            tokenizer.feed(chunk);
            while let Next::Token(token) = tokenizer.next_token()? {
                tokens.push(token);
            }
        }
        tokenizer.end_of_input();
        loop {
            match tokenizer.next_token()? {
                Next::Token(token) => tokens.push(token),
                Next::EndOfInput => return Ok(tokens),
                Next::NeedMoreInput => unreachable!("input already ended"),
            }
        }
    }

    #[test]
    fn test_names_are_attached_to_values() -> Result<()> {
        let tokens = tokenize_chunks(&[br#"{"a":1,"b":[true,null],"c":{"d":"x"}}"#])?;

        let kinds: Vec<(Option<&str>, &TokenKind)> = tokens
            .iter()
            .map(|token| (token.name.as_deref(), &token.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (None, &TokenKind::StartObject),
                (Some("a"), &TokenKind::Integer("1".into())),
                (Some("b"), &TokenKind::StartArray),
                (None, &TokenKind::Bool(true)),
                (None, &TokenKind::Null),
                (None, &TokenKind::EndArray),
                (Some("c"), &TokenKind::StartObject),
                (Some("d"), &TokenKind::String("x".into())),
                (None, &TokenKind::EndObject),
                (None, &TokenKind::EndObject),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_split_inside_tokens() -> Result<()> {
        let input = r#"{"name":"Gr\u00fc\u00dfe \ud83d\ude00 ü","value":-12.5e3,"flag":false}"#.as_bytes();
        let whole = tokenize_chunks(&[input])?;

        for split in 1..input.len() {
            let (left, right) = input.split_at(split);
            assert_eq!(tokenize_chunks(&[left, right])?, whole, "split at {split}");
        }

        assert_eq!(whole[1].kind, TokenKind::String("Grüße 😀 ü".into()));
        assert_eq!(whole[2].kind, TokenKind::Float("-12.5e3".into()));
        Ok(())
    }

    #[test]
    fn test_number_at_end_of_chunk_waits_for_more_input() -> Result<()> {
        let mut tokenizer = JsonTokenizer::new();
        tokenizer.feed(b"[12");
        assert!(matches!(tokenizer.next_token()?, Next::Token(_)));
        assert_eq!(tokenizer.next_token()?, Next::NeedMoreInput);

        tokenizer.feed(b"34]");
        assert_eq!(
            tokenizer.next_token()?,
            Next::Token(JsonToken {
                name: None,
                kind: TokenKind::Integer("1234".into())
            })
        );
        Ok(())
    }

    #[test]
    fn test_errors_carry_offset() {
        let mut tokenizer = JsonTokenizer::new();
        tokenizer.feed(br#"{"a" 1}"#);
        tokenizer.end_of_input();

        assert!(tokenizer.next_token().is_ok());
        match tokenizer.next_token() {
            Err(Error::Parse { offset, .. }) => assert_eq!(offset, 5),
            other => panic!("Expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_document_fails_at_end_of_input() {
        assert!(tokenize_chunks(&[br#"{"a":[1,2"#]).is_err());
        assert!(tokenize_chunks(&[br#"{"a":"unterminated"#]).is_err());
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(tokenize_chunks(&[b"[01]"]).is_err());
        assert!(tokenize_chunks(&[b"[1.]"]).is_err());
        assert!(tokenize_chunks(&[b"[tru]"]).is_err());
        assert!(tokenize_chunks(&[b"[1,]"]).is_err());
        assert!(tokenize_chunks(&[b"{} {}"]).is_err());
    }

    #[test]
    fn test_number_grammar() {
        assert!(is_json_number(b"0"));
        assert!(is_json_number(b"-0.5"));
        assert!(is_json_number(b"1E+10"));
        assert!(!is_json_number(b"--1"));
        assert!(!is_json_number(b"1e"));
        assert!(!is_json_number(b"+1"));
    }
}
