//! Literal SQL reconstruction for diagnostics.
//!
//! Substitutes bound values back into a compiled statement. The output is
//! meant for humans (logs, test mode); it is never sent to the database.

use serde::Deserialize;

use crate::bind::{BindMap, Segment, segments};
use crate::ident::{is_name, quote_literal};
use crate::value::{Bound, ParamKind};

/// Identifier quoting used in reconstructed SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentStyle {
    /// `"name"`
    #[default]
    Ansi,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

impl IdentStyle {
    fn wrap(self, name: &str) -> String {
        match self {
            IdentStyle::Ansi => format!("\"{name}\""),
            IdentStyle::Backtick => format!("`{name}`"),
            IdentStyle::Bracket => format!("[{name}]"),
        }
    }
}

/// Literal form of a single bound value.
pub fn literal_value(bound: &Bound) -> String {
    match bound.kind {
        ParamKind::Null => "NULL".to_string(),
        ParamKind::Lob => "[LOB]".to_string(),
        ParamKind::Str => quote_literal(&bound.value.as_text().unwrap_or_default()),
        ParamKind::Int | ParamKind::Bool => bound.value.as_text().unwrap_or_default(),
    }
}

/// Replace each placeholder in `sql` with the literal form of its bound value.
///
/// Placeholders without a binding are left as they are. Placeholders inside
/// string literals and comments are never touched.
pub fn literal_sql(sql: &str, binds: &BindMap, style: IdentStyle) -> String {
    let mut out = String::with_capacity(sql.len());
    for segment in segments(sql) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => match binds.get(name) {
                Some(bound) => out.push_str(&literal_value(bound)),
                None => out.push_str(name),
            },
            Segment::QuotedIdent(name) if is_name(name) => out.push_str(&style.wrap(name)),
            Segment::QuotedIdent(name) => out.push_str(&IdentStyle::Ansi.wrap(name)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Compiler, Data, QuerySpec};
    use crate::condition::Where;
    use crate::value::Value;

    #[test]
    fn values_by_kind() {
        assert_eq!(literal_value(&Value::Null.bind()), "NULL");
        assert_eq!(literal_value(&Value::Int(-4).bind()), "-4");
        assert_eq!(literal_value(&Value::Bool(true).bind()), "1");
        assert_eq!(literal_value(&Value::Float(1.5).bind()), "'1.5'");
        assert_eq!(literal_value(&Value::from("it's").bind()), "'it''s'");
        assert_eq!(literal_value(&Value::Blob(vec![0, 1]).bind()), "[LOB]");
    }

    #[test]
    fn reconstructs_compiled_select() {
        let mut compiler = Compiler::default();
        let compiled = compiler
            .select(
                &QuerySpec::new("users")
                    .columns(vec!["id"])
                    .filter(Where::new().eq("name", "O'Brien").gt("age", 18).eq("admin", false)),
            )
            .unwrap();
        assert_eq!(
            literal_sql(&compiled.sql, &compiled.binds, IdentStyle::Ansi),
            r#"SELECT "id" FROM "users" WHERE "name" = 'O''Brien' AND "age" > 18 AND "admin" = 0"#
        );
    }

    #[test]
    fn converts_identifier_style() {
        let mut compiler = Compiler::default();
        let compiled = compiler
            .insert("t", &[Data::new().set("a", Value::Blob(vec![1])).set("b", "x")])
            .unwrap();
        assert_eq!(
            literal_sql(&compiled.sql, &compiled.binds, IdentStyle::Backtick),
            "INSERT INTO `t` (`a`, `b`) VALUES ([LOB], 'x')"
        );
        assert_eq!(
            literal_sql(&compiled.sql, &compiled.binds, IdentStyle::Bracket),
            "INSERT INTO [t] ([a], [b]) VALUES ([LOB], 'x')"
        );
    }

    #[test]
    fn literals_and_unknown_placeholders_untouched() {
        let mut binds = BindMap::new();
        binds.bind(":a", 1);
        let sql = "SELECT ':a', \"weird name\" FROM t WHERE x = :a AND y = :missing";
        assert_eq!(
            literal_sql(sql, &binds, IdentStyle::Backtick),
            "SELECT ':a', \"weird name\" FROM t WHERE x = 1 AND y = :missing"
        );
    }

    #[test]
    fn reconstruction_matches_inline_values() {
        // Compiling with values then substituting them gives the same text as
        // writing the literals by hand.
        let mut compiler = Compiler::default();
        let compiled = compiler
            .update("t", &Data::new().set("n", 5).set("s", "a'b"), Some(&Where::new().is_null("d")))
            .unwrap();
        assert_eq!(
            literal_sql(&compiled.sql, &compiled.binds, IdentStyle::Ansi),
            r#"UPDATE "t" SET "n" = 5, "s" = 'a''b' WHERE "d" IS NULL"#
        );
    }
}
