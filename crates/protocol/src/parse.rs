//! Minimal XML parser for the wire subset the protocol uses.
//!
//! Handles the document declaration, elements, attributes, default and
//! prefixed namespace declarations, character data, comments, the five
//! predefined entities, and numeric character references. DOCTYPE,
//! processing instructions, and CDATA are rejected; nothing on this
//! wire produces them.

use std::collections::HashMap;

use yts_domain::{Error, Result};

use crate::element::Element;

/// Parse a complete document into its root element.
pub fn parse_document(input: &str) -> Result<Element> {
    let mut p = Parser {
        bytes: input.as_bytes(),
        pos: 0,
    };
    p.skip_bom();
    p.skip_ws();
    p.skip_decl()?;
    p.skip_misc()?;
    let root = p.parse_element(&NsScope::root())?;
    p.skip_misc()?;
    if p.pos != p.bytes.len() {
        return Err(Error::xml(p.pos, "trailing content after document element"));
    }
    Ok(root)
}

#[derive(Clone)]
struct NsScope {
    default_ns: String,
    prefixes: HashMap<String, String>,
}

impl NsScope {
    fn root() -> Self {
        Self {
            default_ns: String::new(),
            prefixes: HashMap::new(),
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if self.starts_with(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(Error::xml(self.pos, format!("expected {s:?}")))
        }
    }

    fn skip_bom(&mut self) {
        if self.bytes[self.pos..].starts_with(b"\xef\xbb\xbf") {
            self.pos += 3;
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn skip_decl(&mut self) -> Result<()> {
        if !self.starts_with("<?xml") {
            return Ok(());
        }
        match find(self.bytes, self.pos, b"?>") {
            Some(end) => {
                self.pos = end + 2;
                Ok(())
            }
            None => Err(Error::xml(self.pos, "unterminated XML declaration")),
        }
    }

    /// Whitespace and comments between markup.
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        match find(self.bytes, self.pos + 4, b"-->") {
            Some(end) => {
                self.pos = end + 3;
                Ok(())
            }
            None => Err(Error::xml(self.pos, "unterminated comment")),
        }
    }

    fn read_name(&mut self) -> Result<&'a str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let ok = c.is_ascii_alphanumeric()
                || matches!(c, b'_' | b'-' | b'.' | b':')
                || c >= 0x80;
            if !ok {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::xml(start, "expected a name"));
        }
        // names start with a letter, '_', or ':'
        let first = self.bytes[start];
        if first.is_ascii_digit() || matches!(first, b'-' | b'.') {
            return Err(Error::xml(start, "name starts with an invalid character"));
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| Error::xml(start, "name is not valid UTF-8"))
    }

    fn read_quoted(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(Error::xml(self.pos, "expected a quoted value")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let raw = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| Error::xml(start, "attribute value is not valid UTF-8"))?;
                self.pos += 1;
                return decode_entities(raw, start);
            }
            if c == b'<' {
                return Err(Error::xml(self.pos, "'<' in attribute value"));
            }
            self.pos += 1;
        }
        Err(Error::xml(start, "unterminated attribute value"))
    }

    fn parse_element(&mut self, parent: &NsScope) -> Result<Element> {
        self.expect("<")?;
        let raw_name = self.read_name()?;

        // Collect raw attributes; namespace declarations feed the scope,
        // everything else lands on the element verbatim.
        let mut raw_attrs: Vec<(&'a str, String)> = Vec::new();
        let mut scope = parent.clone();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') | Some(b'>') => break,
                Some(_) => {}
                None => return Err(Error::xml(self.pos, "unterminated start tag")),
            }
            let key = self.read_name()?;
            self.skip_ws();
            self.expect("=")?;
            self.skip_ws();
            let value = self.read_quoted()?;
            if key == "xmlns" {
                scope.default_ns = value;
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.prefixes.insert(prefix.to_owned(), value);
            } else {
                raw_attrs.push((key, value));
            }
        }

        let (name, ns) = resolve_name(raw_name, &scope, self.pos)?;
        let mut el = Element::new(name, ns);
        for (key, value) in raw_attrs {
            el.set_attr(key, value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return Ok(el);
        }
        self.expect(">")?;

        // Content until the matching close tag.
        loop {
            match self.peek() {
                None => return Err(Error::xml(self.pos, format!("unclosed <{raw_name}>"))),
                Some(b'<') => {
                    if self.starts_with("</") {
                        self.pos += 2;
                        let close = self.read_name()?;
                        if close != raw_name {
                            return Err(Error::xml(
                                self.pos,
                                format!("mismatched close tag </{close}> for <{raw_name}>"),
                            ));
                        }
                        self.skip_ws();
                        self.expect(">")?;
                        return Ok(el);
                    }
                    if self.starts_with("<!--") {
                        self.skip_comment()?;
                        continue;
                    }
                    if self.starts_with("<!") || self.starts_with("<?") {
                        return Err(Error::xml(self.pos, "unsupported markup in content"));
                    }
                    let child = self.parse_element(&scope)?;
                    el.push_child(child);
                }
                Some(_) => {
                    let start = self.pos;
                    while !matches!(self.peek(), None | Some(b'<')) {
                        self.pos += 1;
                    }
                    let raw = std::str::from_utf8(&self.bytes[start..self.pos])
                        .map_err(|_| Error::xml(start, "text is not valid UTF-8"))?;
                    let text = decode_entities(raw, start)?;
                    if !text.is_empty() {
                        el.push_text(text);
                    }
                }
            }
        }
    }
}

fn resolve_name(raw: &str, scope: &NsScope, at: usize) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((prefix, local)) => match scope.prefixes.get(prefix) {
            Some(uri) => Ok((local.to_owned(), uri.clone())),
            None => Err(Error::xml(at, format!("unbound namespace prefix {prefix:?}"))),
        },
        None => Ok((raw.to_owned(), scope.default_ns.clone())),
    }
}

fn decode_entities(raw: &str, at: usize) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_owned());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let semi = tail
            .find(';')
            .ok_or_else(|| Error::xml(at, "unterminated entity reference"))?;
        let entity = &tail[..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|h| u32::from_str_radix(h, 16))
                    .or_else(|| entity.strip_prefix('#').map(|d| d.parse::<u32>()))
                    .ok_or_else(|| Error::xml(at, format!("unknown entity &{entity};")))?
                    .map_err(|_| Error::xml(at, format!("bad character reference &{entity};")))?;
                let c = char::from_u32(code)
                    .ok_or_else(|| Error::xml(at, format!("invalid character reference &{entity};")))?;
                out.push(c);
            }
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}
