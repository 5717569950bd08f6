//! Mapping-shaped input.
//!
//! Builds the typed specifications from `serde_json` values, so that a
//! request body or config file can describe a query directly:
//!
//! ```ignore
//! use serde_json::json;
//! use pgshape::QuerySpec;
//!
//! let spec = QuerySpec::from_args("users", &[
//!     json!({"[><]roles(r)": {"uid": "id"}}),
//!     json!(["users.id", "r.name(role)"]),
//!     json!({"age": [">", 18], "OR #flags": {"vip": true, "banned_at": null}, "LIMIT": [0, 10]}),
//! ])?;
//! ```
//!
//! Filter keys:
//! - a column with a scalar (`=`, or `IS NULL` for null), a list (`IN`), or an
//!   `[op, value]` pair;
//! - `AND` / `OR`, optionally followed by a `#comment`, with a nested mapping;
//! - a numeric key with a `[left, op, right]` (or five-element) tuple comparing
//!   two columns;
//! - the reserved keys `GROUP`, `HAVING`, `ORDER` and `LIMIT`.
//!
//! A raw fragment is written as `{"raw": "<template>", "params": {...}}`.

use serde_json::{Map, Value as Json};

use crate::columns::{Column, Columns};
use crate::compile::{Assign, Data, QuerySpec};
use crate::condition::{CmpOp, Cond, Connective, Direction, Limit, OrderItem, Where};
use crate::error::{OrmError, OrmResult};
use crate::join::{JoinCond, JoinSpec, Relation, is_join_key};
use crate::raw::Raw;
use crate::value::Value;

/// Reserved keys that never name a column.
const IGNORED_KEYS: &[&str] = &["LIKE", "MATCH"];

const RESERVED_KEYS: &[&str] = &["GROUP", "HAVING", "ORDER", "LIMIT", "LIKE", "MATCH"];

/// Returns `true` if `value` is a mapping whose first key is a join directive.
pub fn is_join(value: &Json) -> bool {
    value
        .as_object()
        .and_then(|map| map.keys().next())
        .is_some_and(|key| is_join_key(key))
}

fn expect_object<'a>(value: &'a Json, what: &str) -> OrmResult<&'a Map<String, Json>> {
    value
        .as_object()
        .ok_or_else(|| OrmError::invalid_argument(format!("{what} must be a mapping, got {value}")))
}

fn expect_str<'a>(value: &'a Json, what: &str) -> OrmResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| OrmError::invalid_argument(format!("{what} must be a string, got {value}")))
}

impl Raw {
    /// Parse `{"raw": "...", "params": {...}}`. Returns `None` for any other shape.
    pub fn from_json(value: &Json) -> Option<OrmResult<Raw>> {
        let map = value.as_object()?;
        let template = map.get("raw")?.as_str()?;
        if map.keys().any(|k| k != "raw" && k != "params") {
            return None;
        }

        let mut raw = Raw::new(template);
        if let Some(params) = map.get("params") {
            let params = match expect_object(params, "raw params") {
                Ok(params) => params,
                Err(e) => return Some(Err(e)),
            };
            for (name, value) in params {
                raw = raw.bind(name, value);
            }
        }
        Some(Ok(raw))
    }
}

impl QuerySpec {
    /// Build a SELECT from positional arguments.
    ///
    /// With a join mapping first: `[join, columns, filter]`. Otherwise
    /// `[columns, filter]`. Missing columns default to `*`.
    ///
    /// When the columns slot is the last argument and holds a mapping that is
    /// not a column-group shape (`{"id": 5}`), it is read as the filter.
    pub fn from_args(table: impl Into<String>, args: &[Json]) -> OrmResult<QuerySpec> {
        let mut spec = QuerySpec::new(table);
        let mut args = args.iter();

        let mut next = args.next();
        if let Some(join) = next.filter(|v| is_join(v)) {
            spec.join = Some(JoinSpec::from_json(join)?);
            next = args.next();
        }
        let filter = args.next();
        if let Some(columns) = next.filter(|v| !v.is_null()) {
            if filter.is_none() && columns.is_object() && !is_column_map(columns) {
                spec.filter = Some(Where::from_json(columns)?);
                return Ok(spec);
            }
            spec.columns = Columns::from_json(columns)?;
        }
        if let Some(filter) = filter.filter(|v| !v.is_null()) {
            spec.filter = Some(Where::from_json(filter)?);
        }
        Ok(spec)
    }
}

impl Columns {
    pub fn from_json(value: &Json) -> OrmResult<Columns> {
        match value {
            Json::String(s) => Ok(Columns::from(s.as_str())),
            Json::Array(_) | Json::Object(_) => Ok(Columns::List(column_list(value)?)),
            other => Err(OrmError::invalid_argument(format!(
                "columns must be a string, list or mapping, got {other}"
            ))),
        }
    }
}

/// A mapping whose keys are plain names and whose values are all column
/// groups or raw fragments.
fn is_column_map(value: &Json) -> bool {
    value.as_object().is_some_and(|map| {
        map.iter().all(|(key, value)| {
            !RESERVED_KEYS.contains(&key.as_str())
                && Connective::parse_tag(key).is_none()
                && !key.bytes().all(|b| b.is_ascii_digit())
                && (value.is_array() || value.is_object())
        })
    })
}

fn column_list(value: &Json) -> OrmResult<Vec<Column>> {
    match value {
        Json::Array(items) => items.iter().map(column_item).collect(),
        Json::Object(map) => {
            let mut columns = Vec::with_capacity(map.len());
            for (key, value) in map {
                columns.push(keyed_column(key, value)?);
            }
            Ok(columns)
        }
        other => Err(OrmError::invalid_argument(format!("invalid column group: {other}"))),
    }
}

fn column_item(value: &Json) -> OrmResult<Column> {
    match value {
        Json::String(s) => Ok(Column::Name(s.clone())),
        Json::Array(_) | Json::Object(_) => Ok(Column::Group {
            key: None,
            columns: column_list(value)?,
        }),
        other => Err(OrmError::invalid_argument(format!("invalid column: {other}"))),
    }
}

fn keyed_column(key: &str, value: &Json) -> OrmResult<Column> {
    if let Some(raw) = Raw::from_json(value) {
        return Ok(Column::Raw {
            alias: key.to_string(),
            raw: raw?,
        });
    }
    match value {
        Json::Array(_) | Json::Object(_) => Ok(Column::Group {
            key: Some(key.to_string()),
            columns: column_list(value)?,
        }),
        other => Err(OrmError::invalid_argument(format!(
            "column group '{key}' must be a list or mapping, got {other}"
        ))),
    }
}

impl JoinSpec {
    pub fn from_json(value: &Json) -> OrmResult<JoinSpec> {
        let map = expect_object(value, "join")?;
        let mut spec = JoinSpec::new();
        for (key, relation) in map {
            spec = spec.join(key.clone(), relation_from_json(relation)?);
        }
        Ok(spec)
    }
}

fn relation_from_json(value: &Json) -> OrmResult<Relation> {
    match value {
        Json::String(column) => Ok(Relation::using(column.clone())),
        Json::Array(items) => {
            let columns = items
                .iter()
                .map(|c| expect_str(c, "USING column").map(str::to_string))
                .collect::<OrmResult<Vec<_>>>()?;
            Ok(Relation::Using(columns))
        }
        Json::Object(map) => Ok(Relation::On(join_conds(map)?)),
        other => Err(OrmError::invalid_argument(format!("invalid join relation: {other}"))),
    }
}

fn join_conds(map: &Map<String, Json>) -> OrmResult<Vec<JoinCond>> {
    let mut conds = Vec::with_capacity(map.len());
    for (key, value) in map {
        if let Some((connective, _)) = Connective::parse_tag(key) {
            let nested = expect_object(value, key)?;
            conds.push(JoinCond::Group {
                connective,
                conds: join_conds(nested)?,
            });
        } else if let Some(tuple) = column_tuple(key, value)? {
            conds.push(JoinCond::Columns {
                left: tuple.0,
                op: tuple.1,
                right: tuple.2,
            });
        } else {
            let foreign = expect_str(value, "join column")?;
            conds.push(JoinCond::pair(key.clone(), foreign));
        }
    }
    Ok(conds)
}

/// A positional `[left, op, right]` or `[left, op, _, _, right]` tuple.
fn column_tuple(key: &str, value: &Json) -> OrmResult<Option<(String, CmpOp, String)>> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }
    let invalid = || OrmError::invalid_argument(format!("invalid column comparison: {value}"));
    let items = value.as_array().ok_or_else(invalid)?;
    if items.len() != 3 && items.len() != 5 {
        return Err(invalid());
    }
    let left = items[0].as_str().ok_or_else(invalid)?;
    let op = items[1].as_str().and_then(CmpOp::parse).ok_or_else(invalid)?;
    let right = items[items.len() - 1].as_str().ok_or_else(invalid)?;
    Ok(Some((left.to_string(), op, right.to_string())))
}

impl Where {
    pub fn from_json(value: &Json) -> OrmResult<Where> {
        let map = expect_object(value, "filter")?;
        let mut filter = Where::new();

        for (key, value) in map {
            match key.as_str() {
                "GROUP" => filter.group = string_list(value, "GROUP")?,
                "HAVING" => filter.having = conds(expect_object(value, "HAVING")?)?,
                "ORDER" => filter.order = order_items(value)?,
                "LIMIT" => filter.limit = Some(limit(value)),
                k if IGNORED_KEYS.contains(&k) => {
                    tracing::debug!(target: "pgshape.sql", key = k, "ignoring unsupported clause");
                }
                _ => filter.conds.push(cond(key, value)?),
            }
        }
        Ok(filter)
    }
}

fn conds(map: &Map<String, Json>) -> OrmResult<Vec<Cond>> {
    map.iter().map(|(key, value)| cond(key, value)).collect()
}

fn cond(key: &str, value: &Json) -> OrmResult<Cond> {
    if let Some((connective, label)) = Connective::parse_tag(key)
        && let Some(nested) = value.as_object()
    {
        return Ok(Cond::Group {
            connective,
            label: label.map(str::to_string),
            conds: conds(nested)?,
        });
    }

    if let Some((left, op, right)) = column_tuple(key, value)? {
        return Ok(Cond::Columns { left, op, right });
    }

    match value {
        Json::Null => Ok(Cond::is_null(key)),
        Json::Array(items) => {
            if let [Json::String(op), operand] = items.as_slice()
                && let Some(op) = CmpOp::parse(op)
            {
                return Ok(Cond::cmp(key, op, Value::from(operand)));
            }
            Ok(Cond::In {
                column: key.to_string(),
                values: items.iter().map(Value::from).collect(),
            })
        }
        other => Ok(Cond::eq(key, Value::from(other))),
    }
}

fn string_list(value: &Json, what: &str) -> OrmResult<Vec<String>> {
    match value {
        Json::String(s) => Ok(vec![s.clone()]),
        Json::Array(items) => items
            .iter()
            .map(|v| expect_str(v, what).map(str::to_string))
            .collect(),
        other => Err(OrmError::invalid_argument(format!(
            "{what} must be a string or list, got {other}"
        ))),
    }
}

fn order_items(value: &Json) -> OrmResult<Vec<OrderItem>> {
    let plain = |column: String| OrderItem {
        column,
        direction: None,
    };
    match value {
        Json::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let value = expect_str(value, "ORDER direction")?;
                if let Some(direction) = Direction::parse(value) {
                    return Ok(OrderItem {
                        column: key.clone(),
                        direction: Some(direction),
                    });
                }
                // A positional entry names a column to sort by.
                if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
                    return Ok(plain(value.to_string()));
                }
                Err(OrmError::invalid_argument(format!(
                    "unknown ORDER direction: {value}"
                )))
            })
            .collect(),
        other => Ok(string_list(other, "ORDER")?.into_iter().map(plain).collect()),
    }
}

fn limit(value: &Json) -> Limit {
    match value.as_array().map(Vec::as_slice) {
        Some([offset, count]) => Limit::Range {
            offset: Value::from(offset),
            count: Value::from(count),
        },
        _ => Limit::Count(Value::from(value)),
    }
}

impl Data {
    /// Build column assignments from a mapping. Raw-shaped values become raw
    /// assignments; other mappings and lists are stored as JSON text.
    pub fn from_json(value: &Json) -> OrmResult<Data> {
        let map = expect_object(value, "data")?;
        let mut data = Data::new();
        for (column, value) in map {
            data.entries.push((
                column.clone(),
                match Raw::from_json(value) {
                    Some(raw) => Assign::Raw(raw?),
                    None => Assign::Value(Value::from(value)),
                },
            ));
        }
        Ok(data)
    }

    /// Build rows for a multi-row INSERT from a mapping or a list of mappings.
    pub fn rows_from_json(value: &Json) -> OrmResult<Vec<Data>> {
        match value {
            Json::Array(rows) => rows.iter().map(Data::from_json).collect(),
            other => Ok(vec![Data::from_json(other)?]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;
    use crate::ident::Quoter;
    use serde_json::json;

    fn select(table: &str, args: &[Json]) -> String {
        let spec = QuerySpec::from_args(table, args).unwrap();
        Compiler::default().select(&spec).unwrap().sql
    }

    #[test]
    fn filter_mapping() {
        let sql = select("users", &[json!("*"), json!({"age": [">", 18], "status": "active"})]);
        assert_eq!(
            sql,
            r#"SELECT * FROM "users" WHERE "age" > :ph0_b AND "status" = :ph1_b"#
        );
    }

    #[test]
    fn join_mapping_is_detected() {
        let sql = select(
            "users",
            &[
                json!({"[><]roles(r)": {"uid": "id"}}),
                json!(["users.id", "r.name"]),
                json!({"r.name": "admin"}),
            ],
        );
        assert_eq!(
            sql,
            r#"SELECT "users"."id","r"."name" FROM "users" INNER JOIN "roles" AS "r" ON "users"."uid" = "r"."id" WHERE "r"."name" = :ph0_b"#
        );
    }

    #[test]
    fn join_without_columns_selects_all() {
        let sql = select("users", &[json!({"[>]posts": "uid"})]);
        assert_eq!(sql, r#"SELECT * FROM "users" LEFT JOIN "posts" USING ("uid")"#);
    }

    #[test]
    fn connective_groups_with_comments() {
        let sql = select(
            "t",
            &[
                json!(["id"]),
                json!({
                    "OR #first": {"a": 1, "b": null},
                    "OR #second": {"c": [1, 2], "AND": {"d": ["!=", "x"], "0": ["e", "<", "f"]}}
                }),
            ],
        );
        assert_eq!(
            sql,
            r#"SELECT "id" FROM "t" WHERE ("a" = :ph0_b OR "b" IS NULL) AND ("c" IN (:ph1_b, :ph2_b) OR ("d" != :ph3_b AND "e" < "f"))"#
        );
    }

    #[test]
    fn reserved_clauses() {
        let sql = select(
            "t",
            &[
                json!("*"),
                json!({
                    "LIMIT": [10, 20],
                    "ORDER": {"created_at": "DESC"},
                    "GROUP": "kind",
                    "HAVING": {"kind": ["!=", "x"]},
                    "LIKE": {"ignored": true}
                }),
            ],
        );
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" GROUP BY "kind" HAVING "kind" != :ph0_b ORDER BY "created_at" DESC LIMIT 20 OFFSET 10"#
        );
    }

    #[test]
    fn non_numeric_limit_is_dropped() {
        let sql = select("t", &[json!("*"), json!({"LIMIT": "abc", "ORDER": ["a", "b"]})]);
        assert_eq!(sql, r#"SELECT * FROM "t" ORDER BY "a","b""#);
    }

    #[test]
    fn raw_column_and_groups() {
        let columns = Columns::from_json(&json!({
            "total": {"raw": "COUNT(<id>) * :k", "params": {"k": 2}},
            "profile": ["bio", "avatar"]
        }))
        .unwrap();
        let mut compiler = Compiler::new(Quoter::default());
        let compiled = compiler.select(&QuerySpec::new("t").columns(columns)).unwrap();
        assert_eq!(
            compiled.sql,
            r#"SELECT COUNT("id") * :k AS "total","bio","avatar" FROM "t""#
        );
        assert_eq!(compiled.binds.get(":k").unwrap().value, Value::Int(2));
    }

    #[test]
    fn lone_keyed_group() {
        let sql = select("t", &[json!({"user_id": ["name", "email"]})]);
        assert_eq!(sql, r#"SELECT "user_id","name","email" FROM "t""#);
    }

    #[test]
    fn data_with_raw_and_json_values() {
        let rows = Data::rows_from_json(&json!([
            {"name": "a", "meta": {"x": 1}, "at": {"raw": "NOW()"}},
            {"name": "b"}
        ]))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("at"), Some(&Assign::Raw(Raw::new("NOW()"))));
        assert_eq!(
            rows[0].get("meta"),
            Some(&Assign::Value(Value::Str(r#"{"x":1}"#.into())))
        );

        let compiled = Compiler::default().insert("t", &rows).unwrap();
        assert_eq!(
            compiled.sql,
            r#"INSERT INTO "t" ("name", "meta", "at") VALUES (:ph0_b, :ph1_b, NOW()), (:ph2_b, NULL, NULL)"#
        );
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        assert!(Where::from_json(&json!([1, 2])).is_err());
        assert!(Where::from_json(&json!({"0": ["a", "~", "b"]})).is_err());
        assert!(Where::from_json(&json!({"ORDER": {"a": "SIDEWAYS"}})).is_err());
        assert!(JoinSpec::from_json(&json!({"[>]t": 5})).is_err());
        assert!(Columns::from_json(&json!(5)).is_err());
    }

    #[test]
    fn lone_filter_mapping_is_a_filter() {
        let spec = QuerySpec::from_args("t", &[json!({"id": 5})]).unwrap();
        assert_eq!(spec.columns, Columns::All);
        let compiled = Compiler::default().select(&spec).unwrap();
        assert_eq!(compiled.sql, r#"SELECT * FROM "t" WHERE "id" = :ph0_b"#);

        let sql = select("t", &[json!({"[>]u": "uid"}), json!({"OR": {"a": 1, "b": 2}, "LIMIT": 3})]);
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" LEFT JOIN "u" USING ("uid") WHERE ("a" = :ph0_b OR "b" = :ph1_b) LIMIT 3"#
        );

        // Column groups with a following filter keep their meaning.
        let sql = select("t", &[json!({"user": ["name"]}), json!({"id": 1})]);
        assert_eq!(sql, r#"SELECT "user","name" FROM "t" WHERE "id" = :ph0_b"#);
    }

    #[test]
    fn mixed_order_mapping() {
        let filter = Where::from_json(&json!({"ORDER": {"a": "DESC", "0": "b"}})).unwrap();
        let quoter = Quoter::default();
        let mut ctx = crate::compile::CompileContext::new(&quoter, 0);
        assert_eq!(filter.compile(&mut ctx).unwrap(), r#" ORDER BY "a" DESC,"b""#);
    }

    #[test]
    fn join_detection() {
        assert!(is_join(&json!({"[>]t": "id"})));
        assert!(!is_join(&json!({"t": "id"})));
        assert!(!is_join(&json!(["[>]t"])));
    }
}
