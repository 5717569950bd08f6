//! Named bind parameters.
//!
//! Compiled statements carry named placeholders of the form `:ph<n>_b`, where `n`
//! comes from a counter that only ever increases for the lifetime of an engine.
//! [`BindMap`] keeps placeholder → [`Bound`] pairs in insertion order.

use crate::value::{Bound, Value};

/// Prefix of generated placeholder names.
pub const PLACEHOLDER_PREFIX: &str = ":ph";
/// Suffix of generated placeholder names.
pub const PLACEHOLDER_SUFFIX: &str = "_b";

/// Render the placeholder name for counter value `n`.
pub fn placeholder_name(n: u64) -> String {
    format!("{PLACEHOLDER_PREFIX}{n}{PLACEHOLDER_SUFFIX}")
}

/// Normalize a user-supplied parameter name to its `:name` form.
pub fn normalize_name(name: &str) -> String {
    if name.starts_with(':') {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

/// Ordered map from placeholder name to bound value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindMap {
    entries: Vec<(String, Bound)>,
}

impl BindMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bound value. An existing entry with the same name is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, bound: Bound) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = bound,
            None => self.entries.push((name, bound)),
        }
    }

    /// Type-map `value` and insert it under `name`.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert(name, value.into().bind());
    }

    pub fn get(&self, name: &str) -> Option<&Bound> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bound)> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl<'a> IntoIterator for &'a BindMap {
    type Item = &'a (String, Bound);
    type IntoIter = std::slice::Iter<'a, (String, Bound)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A lexical piece of SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    /// Plain text, including string literals and comments.
    Text(&'a str),
    /// A named placeholder, including its leading `:`.
    Placeholder(&'a str),
    /// The content of a `"quoted"` identifier (escapes left doubled).
    QuotedIdent(&'a str),
}

/// Split SQL into text, placeholders and quoted identifiers.
///
/// String literals (including `E'...'` and `$tag$...$tag$` bodies), comments
/// and `::` casts never produce placeholders.
pub(crate) fn segments<'a>(sql: &'a str) -> Vec<Segment<'a>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    let flush = |out: &mut Vec<Segment<'a>>, from: usize, to: usize| {
        if to > from {
            out.push(Segment::Text(&sql[from..to]));
        }
    };

    while i < bytes.len() {
        let word_before = i > 0 && is_word_byte(bytes[i - 1]);
        match bytes[i] {
            b'\'' => i = skip_quoted(bytes, i, b'\''),
            b'E' | b'e' if !word_before && bytes.get(i + 1) == Some(&b'\'') => {
                i = skip_escaped(bytes, i + 1);
            }
            b'$' if !word_before => i = skip_dollar_quoted(sql, i).unwrap_or(i + 1),
            b'"' => {
                let end = skip_quoted(bytes, i, b'"');
                if bytes.get(end - 1) == Some(&b'"') && end - i >= 2 {
                    flush(&mut out, text_start, i);
                    out.push(Segment::QuotedIdent(&sql[i + 1..end - 1]));
                    text_start = end;
                }
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = sql[i..].find('\n').map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
            b':' if bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') =>
            {
                let end = bytes[i + 1..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |p| i + 1 + p);
                flush(&mut out, text_start, i);
                out.push(Segment::Placeholder(&sql[i..end]));
                text_start = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    flush(&mut out, text_start, bytes.len());
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || !b.is_ascii()
}

/// Index just past an `E'...'` literal whose quote is at `start`; backslash
/// and doubled quotes are escapes.
fn skip_escaped(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
            b'\'' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Index just past a `$tag$ ... $tag$` body opening at `start`, or `None`
/// when the `$` does not open one (e.g. a `$1` parameter).
fn skip_dollar_quoted(sql: &str, start: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut j = start + 1;
    if bytes.get(j).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    while bytes.get(j).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
        j += 1;
    }
    if bytes.get(j) != Some(&b'$') {
        return None;
    }
    let tag = &sql[start..=j];
    let body = j + 1;
    Some(sql[body..].find(tag).map_or(sql.len(), |p| body + p + tag.len()))
}

/// Index just past the quoted run starting at `start`; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}
