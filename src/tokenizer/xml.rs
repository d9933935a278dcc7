//! Incremental, non-blocking XML tokenizer.
//!
//! Reports start tags (with attributes), end tags and character data. Empty elements are reported
//! as a start tag immediately followed by an end tag. The XML declaration, processing
//! instructions, comments and the document type declaration are skipped. Namespaces are not
//! resolved here, names are reported as written (`gml:Point`).
use super::Next;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlToken {
    StartElement {
        name: String,
        attributes: Vec<Attribute>,
    },
    EndElement {
        name: String,
    },
    /// Character data with entities resolved. A run of text interrupted by a comment or a CDATA
    /// section is reported as several tokens.
    Text(String),
}

enum Markup {
    Incomplete,
    Skip(usize),
    Token(XmlToken, usize),
}

const COMPACT_THRESHOLD: usize = 8 * 1024;

#[derive(Debug, Default)]
pub struct XmlTokenizer {
    buffer: Vec<u8>,
    pos: usize,
    drained: u64,
    eof: bool,
    open: Vec<String>,
    root_closed: bool,
    pending_end: Option<String>,
}

impl XmlTokenizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        if self.pos >= COMPACT_THRESHOLD || self.pos == self.buffer.len() {
            self.buffer.drain(..self.pos);
            self.drained += self.pos as u64;
            self.pos = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    pub fn end_of_input(&mut self) {
        self.eof = true;
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.drained + self.pos as u64
    }

    /// Number of currently open elements.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Reads the next token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for malformed markup, mismatched end tags, unknown entities and
    /// for input that ends before the root element was closed.
    pub fn next_token(&mut self) -> Result<Next<XmlToken>> {
        loop {
            if let Some(name) = self.pending_end.take() {
                self.close_element();
                return Ok(Next::Token(XmlToken::EndElement { name }));
            }

            let available = &self.buffer[self.pos..];
            if available.is_empty() {
                return match (self.eof, self.root_closed) {
                    (true, true) => Ok(Next::EndOfInput),
                    (true, false) => Err(self.error("unexpected end of input")),
                    (false, _) => Ok(Next::NeedMoreInput),
                };
            }

            if available[0] != b'<' {
                let Some(length) = available.iter().position(|byte| *byte == b'<') else {
                    if !self.eof {
                        return Ok(Next::NeedMoreInput);
                    }
                    if self.open.is_empty() && available.iter().all(u8::is_ascii_whitespace) {
                        self.pos = self.buffer.len();
                        continue;
                    }
                    return Err(self.error("unexpected end of input"));
                };

                let raw = &available[..length];
                if self.open.is_empty() {
                    if !raw.iter().all(u8::is_ascii_whitespace) {
                        return Err(self.error("text outside of the root element"));
                    }
                    self.pos += length;
                    continue;
                }
                let text = unescape(raw).map_err(|message| self.error(message))?;
                self.pos += length;
                return Ok(Next::Token(XmlToken::Text(text)));
            }

            match self.scan_markup()? {
                Markup::Incomplete => {
                    return if self.eof {
                        Err(self.error("unexpected end of input"))
                    } else {
                        Ok(Next::NeedMoreInput)
                    };
                }
                Markup::Skip(end) => self.pos = end,
                Markup::Token(token, end) => {
                    self.pos = end;
                    match &token {
                        XmlToken::StartElement { name, .. } => self.open.push(name.clone()),
                        XmlToken::EndElement { .. } => self.close_element(),
                        XmlToken::Text(_) => {}
                    }
                    return Ok(Next::Token(token));
                }
            }
        }
    }

    fn close_element(&mut self) {
        self.open.pop();
        if self.open.is_empty() {
            self.root_closed = true;
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.open.join("/"), self.offset())
    }

    fn find(&self, from: usize, pattern: &[u8]) -> Option<usize> {
        self.buffer
            .get(from..)?
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|index| from + index)
    }

    fn scan_markup(&mut self) -> Result<Markup> {
        let start = self.pos;
        let available = &self.buffer[start..];

        match starts_with(available, b"<!--") {
            None => return Ok(Markup::Incomplete),
            Some(true) => {
                return Ok(self
                    .find(start + 4, b"-->")
                    .map_or(Markup::Incomplete, |end| Markup::Skip(end + 3)));
            }
            Some(false) => {}
        }

        match starts_with(available, b"<![CDATA[") {
            None => return Ok(Markup::Incomplete),
            Some(true) => {
                let Some(end) = self.find(start + 9, b"]]>") else {
                    return Ok(Markup::Incomplete);
                };
                if self.open.is_empty() {
                    return Err(self.error("CDATA outside of the root element"));
                }
                let text = String::from_utf8(self.buffer[start + 9..end].to_vec())
                    .map_err(|_| self.error("invalid UTF-8 in CDATA section"))?;
                return Ok(Markup::Token(XmlToken::Text(text), end + 3));
            }
            Some(false) => {}
        }

        if available.starts_with(b"<!") {
            return Ok(self.scan_doctype(start));
        }

        if available.starts_with(b"<?") {
            return Ok(self
                .find(start + 2, b"?>")
                .map_or(Markup::Incomplete, |end| Markup::Skip(end + 2)));
        }

        let Some(end) = self.find_tag_end(start + 1) else {
            return Ok(Markup::Incomplete);
        };
        let inner = std::str::from_utf8(&self.buffer[start + 1..end])
            .map_err(|_| self.error("invalid UTF-8 in tag"))?;

        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim();
            if self.open.last().map(String::as_str) != Some(name) {
                return Err(self.error(format!("unexpected end tag </{name}>")));
            }
            return Ok(Markup::Token(
                XmlToken::EndElement {
                    name: name.to_string(),
                },
                end + 1,
            ));
        }

        if self.root_closed {
            return Err(self.error("content after the root element"));
        }

        let (inner, empty) = match inner.strip_suffix('/') {
            Some(inner) => (inner, true),
            None => (inner, false),
        };
        let inner = inner.trim_end();
        let name_end = inner
            .find(|chr: char| chr.is_ascii_whitespace())
            .unwrap_or(inner.len());
        let name = &inner[..name_end];
        if name.is_empty() {
            return Err(self.error("element without a name"));
        }
        let attributes = parse_attributes(&inner[name_end..]).map_err(|message| self.error(message))?;

        if empty {
            self.pending_end = Some(name.to_string());
        }
        Ok(Markup::Token(
            XmlToken::StartElement {
                name: name.to_string(),
                attributes,
            },
            end + 1,
        ))
    }

    fn scan_doctype(&self, start: usize) -> Markup {
        let mut brackets = 0usize;
        for (index, byte) in self.buffer[start..].iter().enumerate() {
            match byte {
                b'[' => brackets += 1,
                b']' => brackets = brackets.saturating_sub(1),
                b'>' if brackets == 0 => return Markup::Skip(start + index + 1),
                _ => {}
            }
        }
        Markup::Incomplete
    }

    fn find_tag_end(&self, from: usize) -> Option<usize> {
        let mut quote = None;
        for (index, byte) in self.buffer[from..].iter().enumerate() {
            match (quote, byte) {
                (None, b'"' | b'\'') => quote = Some(*byte),
                (Some(open), _) if open == *byte => quote = None,
                (None, b'>') => return Some(from + index),
                _ => {}
            }
        }
        None
    }
}

/// `None` when `available` is too short to decide.
fn starts_with(available: &[u8], pattern: &[u8]) -> Option<bool> {
    if available.len() >= pattern.len() {
        Some(available.starts_with(pattern))
    } else if pattern.starts_with(available) {
        None
    } else {
        Some(false)
    }
}

fn parse_attributes(mut rest: &str) -> std::result::Result<Vec<Attribute>, String> {
    let mut attributes = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(attributes);
        }

        let Some(equals) = rest.find('=') else {
            return Err(format!("attribute without value: '{rest}'"));
        };
        let name = rest[..equals].trim();
        if name.is_empty() || name.contains(|chr: char| chr.is_ascii_whitespace()) {
            return Err(format!("invalid attribute name '{name}'"));
        }

        let value_part = rest[equals + 1..].trim_start();
        let Some(quote) = value_part.chars().next().filter(|chr| *chr == '"' || *chr == '\'')
        else {
            return Err(format!("unquoted value for attribute '{name}'"));
        };
        let Some(close) = value_part[1..].find(quote) else {
            return Err(format!("unterminated value for attribute '{name}'"));
        };

        attributes.push(Attribute {
            name: name.to_string(),
            value: unescape(value_part[1..=close].as_bytes())?,
        });
        rest = &value_part[close + 2..];
    }
}

fn unescape(raw: &[u8]) -> std::result::Result<String, String> {
    let text = std::str::from_utf8(raw).map_err(|_| "invalid UTF-8 in text".to_string())?;
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let mut unescaped = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        unescaped.push_str(&rest[..amp]);
        let Some(semicolon) = rest[amp..].find(';') else {
            return Err("unterminated entity reference".to_string());
        };
        let entity = &rest[amp + 1..amp + semicolon];
        let resolved = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => entity
                .strip_prefix("#x")
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                .and_then(std::result::Result::ok)
                .and_then(char::from_u32)
                .ok_or_else(|| format!("unknown entity '&{entity};'"))?,
        };
        unescaped.push(resolved);
        rest = &rest[amp + semicolon + 1..];
    }
    unescaped.push_str(rest);
    Ok(unescaped)
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokenize(chunks: &[&[u8]]) -> Result<Vec<XmlToken>> {
        let mut tokenizer = XmlTokenizer::new();
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

    fn start(name: &str, attributes: &[(&str, &str)]) -> XmlToken {
        XmlToken::StartElement {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(name, value)| Attribute {
                    name: (*name).to_string(),
                    value: (*value).to_string(),
                })
                .collect(),
        }
    }

    fn end(name: &str) -> XmlToken {
        XmlToken::EndElement {
            name: name.to_string(),
        }
    }

    #[test]
    fn test_elements_attributes_and_text() -> Result<()> {
        let xml = br#"<?xml version="1.0"?>
<!-- comment -->
<wfs:FeatureCollection numberReturned="1" xmlns:wfs='http://www.opengis.net/wfs/2.0'>
  <app:name a="x &gt; y">Stra&#223;e &amp; <![CDATA[<raw>]]></app:name>
  <app:empty/>
</wfs:FeatureCollection>
"#;
        let tokens: Vec<XmlToken> = tokenize(&[xml])?
            .into_iter()
            .filter(|token| !matches!(token, XmlToken::Text(text) if text.trim().is_empty()))
            .collect();

        assert_eq!(
            tokens,
            vec![
                start(
                    "wfs:FeatureCollection",
                    &[
                        ("numberReturned", "1"),
                        ("xmlns:wfs", "http://www.opengis.net/wfs/2.0")
                    ]
                ),
                start("app:name", &[("a", "x > y")]),
                XmlToken::Text("Straße & ".to_string()),
                XmlToken::Text("<raw>".to_string()),
                end("app:name"),
                start("app:empty", &[]),
                end("app:empty"),
                end("wfs:FeatureCollection"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_every_split_yields_same_tokens() -> Result<()> {
        let xml = r#"<!DOCTYPE a [<!ENTITY x "y">]><a b="1>2"><c>Grüße</c><!-- x --><d/></a>"#
            .as_bytes();
        let whole = tokenize(&[xml])?;

        for split in 1..xml.len() {
            let (left, right) = xml.split_at(split);
            assert_eq!(tokenize(&[left, right])?, whole, "split at {split}");
        }
        assert_eq!(whole[0], start("a", &[("b", "1>2")]));
        Ok(())
    }

    #[test]
    fn test_mismatched_end_tag() {
        assert!(matches!(
            tokenize(&[b"<a><b></a>"]),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_unclosed_root() {
        assert!(tokenize(&[b"<a><b/>"]).is_err());
    }

    #[test]
    fn test_unknown_entity() {
        assert!(tokenize(&[b"<a>&nbsp;</a>"]).is_err());
    }

    #[test]
    fn test_content_after_root() {
        assert!(tokenize(&[b"<a/><b/>"]).is_err());
        assert!(tokenize(&[b"<a/>\n<!-- trailing -->\n"]).is_ok());
    }
}
