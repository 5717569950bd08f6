//! Safe SQL identifier handling.
//!
//! [`Quoter`] validates table and column names and wraps them in double quotes,
//! applying the configured table prefix.
//!
//! - A name segment must match `[letter_][letter|digit|@$#-_]*` (Unicode letters
//!   and digits included).
//! - Column names may carry one `.` to qualify them with a table; the table part
//!   receives the prefix, the column part does not.
//!
//! # Example
//! ```ignore
//! use pgshape::Quoter;
//!
//! let q = Quoter::new("app_");
//! assert_eq!(q.quote_table("users")?, r#""app_users""#);
//! assert_eq!(q.quote_column("users.id")?, r#""app_users"."id""#);
//! # Ok::<(), pgshape::OrmError>(())
//! ```

use crate::error::{OrmError, OrmResult};

/// Check whether `c` may start an identifier segment.
pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// Check whether `c` may continue an identifier segment.
pub(crate) fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_numeric() || matches!(c, '@' | '$' | '#' | '-')
}

/// Returns `true` if `s` is a single valid identifier segment.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_char),
        _ => false,
    }
}

/// Length in bytes of the identifier segment at the start of `s`, if any.
pub(crate) fn scan_name(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return None,
    }
    let end = chars
        .find(|&(_, c)| !is_ident_char(c))
        .map_or(s.len(), |(i, _)| i);
    Some(end)
}

/// Splits `table(alias)` into its parts. A bare name has no alias.
///
/// Whitespace is allowed between the name and the parenthesis.
pub(crate) fn split_alias(s: &str) -> Option<(&str, Option<&str>)> {
    let end = scan_name(s)?;
    let (name, rest) = s.split_at(end);
    let rest = rest.trim_start();
    if rest.is_empty() {
        return Some((name, None));
    }
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    is_name(inner).then_some((name, Some(inner)))
}

/// Validates and quotes identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quoter {
    prefix: String,
}

impl Quoter {
    /// Create a quoter that prepends `prefix` to every table name.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Quote a table name: `users` → `"<prefix>users"`.
    pub fn quote_table(&self, table: &str) -> OrmResult<String> {
        if !is_name(table) {
            return Err(OrmError::invalid_identifier(format!(
                "Incorrect table name: {table}"
            )));
        }
        Ok(format!("\"{}{}\"", self.prefix, table))
    }

    /// Quote a column name, optionally qualified with a table.
    ///
    /// - `id` → `"id"`
    /// - `users.id` → `"<prefix>users"."id"`
    pub fn quote_column(&self, column: &str) -> OrmResult<String> {
        let invalid = || OrmError::invalid_identifier(format!("Incorrect column name: {column}"));

        match column.split_once('.') {
            Some((table, name)) => {
                if !is_name(table) || !is_name(name) {
                    return Err(invalid());
                }
                Ok(format!("\"{}{}\".\"{}\"", self.prefix, table, name))
            }
            None if is_name(column) => Ok(format!("\"{column}\"")),
            None => Err(invalid()),
        }
    }

    /// Quote an unqualified column name (used by `USING` lists).
    pub fn quote_name(&self, name: &str) -> OrmResult<String> {
        if !is_name(name) {
            return Err(OrmError::invalid_identifier(format!(
                "Incorrect column name: {name}"
            )));
        }
        Ok(format!("\"{name}\""))
    }

    /// Quote a string literal, doubling embedded single quotes.
    pub fn quote(&self, value: &str) -> String {
        quote_literal(value)
    }
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_simple() {
        let q = Quoter::default();
        assert_eq!(q.quote_table("users").unwrap(), r#""users""#);
    }

    #[test]
    fn table_with_prefix() {
        let q = Quoter::new("app_");
        assert_eq!(q.quote_table("users").unwrap(), r#""app_users""#);
    }

    #[test]
    fn table_accepts_symbols_and_unicode() {
        let q = Quoter::default();
        assert_eq!(q.quote_table("t@$#-_1").unwrap(), r#""t@$#-_1""#);
        assert_eq!(q.quote_table("用户").unwrap(), r#""用户""#);
        assert_eq!(q.quote_table("_x").unwrap(), r#""_x""#);
    }

    #[test]
    fn table_rejects_dotted_and_bad_start() {
        let q = Quoter::default();
        assert!(q.quote_table("public.users").is_err());
        assert!(q.quote_table("1table").is_err());
        assert!(q.quote_table("-x").is_err());
        assert!(q.quote_table("").is_err());
    }

    #[test]
    fn table_rejects_injection() {
        let q = Quoter::default();
        let err = q.quote_table(r#"users"; DROP TABLE x; --"#).unwrap_err();
        assert!(matches!(err, OrmError::InvalidIdentifier(_)));
    }

    #[test]
    fn column_plain_skips_prefix() {
        let q = Quoter::new("app_");
        assert_eq!(q.quote_column("email").unwrap(), r#""email""#);
    }

    #[test]
    fn column_qualified_prefixes_table_only() {
        let q = Quoter::new("app_");
        assert_eq!(q.quote_column("users.email").unwrap(), r#""app_users"."email""#);
    }

    #[test]
    fn column_rejects_two_dots_and_spaces() {
        let q = Quoter::default();
        assert!(q.quote_column("a.b.c").is_err());
        assert!(q.quote_column("a..b").is_err());
        assert!(q.quote_column("a.").is_err());
        assert!(q.quote_column("my col").is_err());
        assert!(q.quote_column("users.*").is_err());
    }

    #[test]
    fn quoting_preserves_content() {
        let q = Quoter::default();
        for name in ["a", "Abc_9", "x-y", "ñandú", "a#b$c@d"] {
            let quoted = q.quote_table(name).unwrap();
            assert_eq!(&quoted[1..quoted.len() - 1], name);
            let quoted = q.quote_column(name).unwrap();
            assert_eq!(&quoted[1..quoted.len() - 1], name);
        }
    }

    #[test]
    fn split_alias_forms() {
        assert_eq!(split_alias("users"), Some(("users", None)));
        assert_eq!(split_alias("users(u)"), Some(("users", Some("u"))));
        assert_eq!(split_alias("users (u)"), Some(("users", Some("u"))));
        assert_eq!(split_alias("users(1u)"), None);
        assert_eq!(split_alias("users x"), None);
    }

    #[test]
    fn literal_quote_doubles_quotes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(Quoter::default().quote(""), "''");
    }
}
