//! Raw SQL fragments with identifier markers.
//!
//! A [`Raw`] fragment is hand-written SQL that may reference identifiers as
//! `<name>` or `<table.column>` markers and carries its own named parameters.
//!
//! ```ignore
//! use pgshape::raw;
//!
//! let r = raw("SELECT <id> FROM <users> WHERE <age> > :min").bind("min", 18);
//! // with prefix "app_": SELECT "id" FROM "app_users" WHERE "age" > :min
//! ```
//!
//! Expansion rules:
//! - `KEYWORD <name>` (FROM, TABLE, INTO, UPDATE, JOIN, TABLE IF EXISTS,
//!   TABLES LIKE) renders `KEYWORD "<prefix>name"`.
//! - Any other marker renders as a quoted column.
//! - A marker opened by `'` or `` ` `` and closed by the same quote before the
//!   next comma is inside a literal and is left untouched.

use crate::bind::{BindMap, normalize_name};
use crate::error::OrmResult;
use crate::ident::{Quoter, scan_name};
use crate::value::Value;

/// Keywords that turn a marker into a table reference, longest first.
const TABLE_KEYWORDS: &[&str] = &[
    "TABLE IF EXISTS",
    "TABLES LIKE",
    "UPDATE",
    "TABLE",
    "FROM",
    "INTO",
    "JOIN",
];

/// A SQL template with its own parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    template: String,
    params: Vec<(String, Value)>,
}

/// Start a raw fragment.
pub fn raw(template: impl Into<String>) -> Raw {
    Raw::new(template)
}

impl Raw {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    /// Bind a parameter referenced in the template as `:name`.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = normalize_name(name);
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    /// Expand markers and merge this fragment's parameters into `binds`.
    pub fn expand(&self, quoter: &Quoter, binds: &mut BindMap) -> OrmResult<String> {
        let sql = render(&tokenize(&self.template), quoter)?;
        for (name, value) in &self.params {
            binds.insert(name.clone(), value.clone().bind());
        }
        Ok(sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// Text copied through unchanged.
    Text(&'a str),
    /// A marker to be replaced by a quoted identifier.
    Marker {
        /// Opening quote (and any `<` after it) preceding the marker.
        lead: &'a str,
        keyword: Option<&'static str>,
        name: &'a str,
    },
    /// A marker inside a quoted literal, copied through unchanged.
    Verbatim(&'a str),
}

/// Byte offset just past `<name>` / `<table.column>` starting at `lt`.
fn marker_end(template: &str, lt: usize) -> Option<usize> {
    let mut pos = lt + 1;
    pos += scan_name(&template[pos..])?;
    if template[pos..].starts_with('.') {
        pos += 1;
        pos += scan_name(&template[pos..])?;
    }
    template[pos..].starts_with('>').then_some(pos + 1)
}

pub(crate) fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut consumed = 0;
    let mut search = 0;

    while let Some(rel) = template[search..].find('<') {
        let lt = search + rel;
        let Some(end) = marker_end(template, lt) else {
            search = lt + 1;
            continue;
        };
        let name = &template[lt + 1..end - 1];

        let mut start = lt;
        let before = template[consumed..lt].trim_end();
        let keyword = TABLE_KEYWORDS
            .iter()
            .copied()
            .find(|kw| before.ends_with(kw));
        if let Some(kw) = keyword {
            start = consumed + before.len() - kw.len();
        }

        let mut q = start;
        while q > consumed && bytes[q - 1] == b'<' {
            q -= 1;
        }
        let quote = (q > consumed && matches!(bytes[q - 1], b'\'' | b'`')).then(|| bytes[q - 1]);
        let lead_start = if quote.is_some() { q - 1 } else { start };

        if lead_start > consumed {
            tokens.push(Token::Text(&template[consumed..lead_start]));
        }

        let closing = quote.and_then(|quote| {
            let rest = &bytes[end..];
            let pos = rest.iter().position(|b| *b == quote || *b == b',')?;
            (rest[pos] == quote).then_some(end + pos + 1)
        });

        match closing {
            Some(verbatim_end) => {
                tokens.push(Token::Verbatim(&template[lead_start..verbatim_end]));
                consumed = verbatim_end;
            }
            None => {
                tokens.push(Token::Marker {
                    lead: &template[lead_start..start],
                    keyword,
                    name,
                });
                consumed = end;
            }
        }
        search = consumed;
    }

    if consumed < template.len() {
        tokens.push(Token::Text(&template[consumed..]));
    }
    tokens
}

pub(crate) fn render(tokens: &[Token<'_>], quoter: &Quoter) -> OrmResult<String> {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Text(s) | Token::Verbatim(s) => out.push_str(s),
            Token::Marker {
                lead,
                keyword: Some(kw),
                name,
            } => {
                out.push_str(lead);
                out.push_str(kw);
                out.push(' ');
                out.push_str(&quoter.quote_table(name)?);
            }
            Token::Marker {
                lead,
                keyword: None,
                name,
            } => {
                out.push_str(lead);
                out.push_str(&quoter.quote_column(name)?);
            }
        }
    }
    Ok(out)
}
