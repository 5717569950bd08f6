//! Filter conditions and trailing clauses.
//!
//! A [`Where`] holds a list of [`Cond`]s joined by `AND`, plus the reserved
//! `GROUP BY`, `HAVING`, `ORDER BY` and `LIMIT` clauses.
//!
//! # Example
//! ```ignore
//! use pgshape::{Cond, Where};
//!
//! let filter = Where::new()
//!     .gt("age", 18)
//!     .eq("status", "active")
//!     .push(Cond::or(vec![Cond::eq("role", "admin"), Cond::is_null("banned_at")]))
//!     .order_desc("created_at")
//!     .limit_offset(20, 10);
//! // WHERE "age" > :ph0_b AND "status" = :ph1_b AND ("role" = :ph2_b OR "banned_at" IS NULL)
//! //   ORDER BY "created_at" DESC LIMIT 10 OFFSET 20
//! ```

use crate::compile::CompileContext;
use crate::error::OrmResult;
use crate::value::Value;

/// Logical connective between sibling conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn as_str(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }

    /// Parse a connective tag such as `AND`, `OR` or `OR #second group`.
    ///
    /// A trailing `#comment` (after whitespace) only keeps keys unique and is
    /// returned as the label.
    pub fn parse_tag(tag: &str) -> Option<(Connective, Option<&str>)> {
        let (head, rest) = match tag.find(char::is_whitespace) {
            Some(pos) => (&tag[..pos], Some(tag[pos..].trim_start())),
            None => (tag, None),
        };
        let connective = match head {
            "AND" => Connective::And,
            "OR" => Connective::Or,
            _ => return None,
        };
        match rest {
            None => Some((connective, None)),
            Some(label) if label.starts_with('#') => Some((connective, Some(label))),
            Some(_) => None,
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn parse(op: &str) -> Option<CmpOp> {
        Some(match op {
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Gte,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Lte,
            "=" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
        }
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// `column = value`, or `column IS NULL` when the value is NULL.
    Eq { column: String, value: Value },
    /// `column IN (...)`.
    In { column: String, values: Vec<Value> },
    /// `column <op> value`.
    Cmp {
        column: String,
        op: CmpOp,
        value: Value,
    },
    /// `left <op> right`, comparing two columns without binding anything.
    Columns {
        left: String,
        op: CmpOp,
        right: String,
    },
    /// A parenthesized group joined by its own connective.
    Group {
        connective: Connective,
        label: Option<String>,
        conds: Vec<Cond>,
    },
}

impl Cond {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Cond::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Cond::Eq {
            column: column.into(),
            value: Value::Null,
        }
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Cond::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cmp(column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Cond::Cmp {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn columns(left: impl Into<String>, op: CmpOp, right: impl Into<String>) -> Self {
        Cond::Columns {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    pub fn and(conds: Vec<Cond>) -> Self {
        Cond::Group {
            connective: Connective::And,
            label: None,
            conds,
        }
    }

    pub fn or(conds: Vec<Cond>) -> Self {
        Cond::Group {
            connective: Connective::Or,
            label: None,
            conds,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "ASC" => Some(Direction::Asc),
            "DESC" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: String,
    pub direction: Option<Direction>,
}

/// `LIMIT` payload. Non-numeric payloads are dropped when compiling.
#[derive(Debug, Clone, PartialEq)]
pub enum Limit {
    Count(Value),
    Range { offset: Value, count: Value },
}

/// Filter conditions plus trailing clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    pub conds: Vec<Cond>,
    pub group: Vec<String>,
    pub having: Vec<Cond>,
    pub order: Vec<OrderItem>,
    pub limit: Option<Limit>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, cond: Cond) -> Self {
        self.conds.push(cond);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Cond::eq(column, value))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.push(Cond::is_null(column))
    }

    pub fn in_list<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(Cond::in_list(column, values))
    }

    pub fn cmp(self, column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        self.push(Cond::cmp(column, op, value))
    }

    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cmp(column, CmpOp::Ne, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cmp(column, CmpOp::Gt, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cmp(column, CmpOp::Gte, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cmp(column, CmpOp::Lt, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cmp(column, CmpOp::Lte, value)
    }

    pub fn columns(self, left: impl Into<String>, op: CmpOp, right: impl Into<String>) -> Self {
        self.push(Cond::columns(left, op, right))
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group.push(column.into());
        self
    }

    pub fn having(mut self, cond: Cond) -> Self {
        self.having.push(cond);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order.push(OrderItem {
            column: column.into(),
            direction: None,
        });
        self
    }

    pub fn order_asc(self, column: impl Into<String>) -> Self {
        self.order_dir(column, Direction::Asc)
    }

    pub fn order_desc(self, column: impl Into<String>) -> Self {
        self.order_dir(column, Direction::Desc)
    }

    pub fn order_dir(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderItem {
            column: column.into(),
            direction: Some(direction),
        });
        self
    }

    pub fn limit(mut self, count: impl Into<Value>) -> Self {
        self.limit = Some(Limit::Count(count.into()));
        self
    }

    pub fn limit_offset(mut self, offset: impl Into<Value>, count: impl Into<Value>) -> Self {
        self.limit = Some(Limit::Range {
            offset: offset.into(),
            count: count.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
            && self.group.is_empty()
            && self.having.is_empty()
            && self.order.is_empty()
            && self.limit.is_none()
    }

    /// Compile into a clause starting with a space (` WHERE ...`), or an empty string.
    pub fn compile(&self, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
        let mut clause = String::new();

        if !self.conds.is_empty() {
            clause.push_str(" WHERE ");
            clause.push_str(&compile_conds(&self.conds, Connective::And, ctx)?);
        }

        if !self.group.is_empty() {
            let columns = self
                .group
                .iter()
                .map(|c| ctx.quote_column(c))
                .collect::<OrmResult<Vec<_>>>()?;
            clause.push_str(" GROUP BY ");
            clause.push_str(&columns.join(","));
        }

        if !self.having.is_empty() {
            clause.push_str(" HAVING ");
            clause.push_str(&compile_conds(&self.having, Connective::And, ctx)?);
        }

        if !self.order.is_empty() {
            let mut items = Vec::with_capacity(self.order.len());
            for item in &self.order {
                let column = ctx.quote_column(&item.column)?;
                items.push(match item.direction {
                    Some(dir) => format!("{column} {}", dir.as_str()),
                    None => column,
                });
            }
            clause.push_str(" ORDER BY ");
            clause.push_str(&items.join(","));
        }

        if let Some(limit) = &self.limit {
            match limit_clause(limit) {
                Some(sql) => clause.push_str(&sql),
                None => tracing::debug!(
                    target: "pgshape.sql",
                    limit = ?limit,
                    "ignoring non-numeric LIMIT payload"
                ),
            }
        }

        Ok(clause)
    }
}

fn numeric_text(value: &Value) -> Option<String> {
    if !value.is_numeric() {
        return None;
    }
    value.as_text().map(|s| s.trim().to_string())
}

fn limit_clause(limit: &Limit) -> Option<String> {
    match limit {
        Limit::Count(count) => Some(format!(" LIMIT {}", numeric_text(count)?)),
        Limit::Range { offset, count } => Some(format!(
            " LIMIT {} OFFSET {}",
            numeric_text(count)?,
            numeric_text(offset)?
        )),
    }
}

/// Compile sibling conditions joined by `connective`.
pub(crate) fn compile_conds(
    conds: &[Cond],
    connective: Connective,
    ctx: &mut CompileContext<'_>,
) -> OrmResult<String> {
    let mut parts = Vec::with_capacity(conds.len());
    for cond in conds {
        parts.push(compile_cond(cond, ctx)?);
    }
    Ok(parts.join(&format!(" {} ", connective.as_str())))
}

fn compile_cond(cond: &Cond, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    match cond {
        Cond::Group {
            connective, conds, ..
        } => Ok(format!("({})", compile_conds(conds, *connective, ctx)?)),
        Cond::Columns { left, op, right } => Ok(format!(
            "{} {} {}",
            ctx.quote_column(left)?,
            op.as_str(),
            ctx.quote_column(right)?
        )),
        Cond::Eq {
            column,
            value: Value::Null,
        } => Ok(format!("{} IS NULL", ctx.quote_column(column)?)),
        Cond::Eq { column, value } => {
            let column = ctx.quote_column(column)?;
            Ok(format!("{column} = {}", ctx.push_value(value.clone())))
        }
        Cond::Cmp { column, op, value } => {
            let column = ctx.quote_column(column)?;
            Ok(format!(
                "{column} {} {}",
                op.as_str(),
                ctx.push_value(value.clone())
            ))
        }
        Cond::In { column, values } => {
            let column = ctx.quote_column(column)?;
            if values.is_empty() {
                // Empty IN list - always false
                return Ok("1=0".to_string());
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| ctx.push_value(v.clone()))
                .collect();
            Ok(format!("{column} IN ({})", placeholders.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrmError;
    use crate::ident::Quoter;
    use crate::value::ParamKind;

    fn compile(filter: &Where) -> (String, crate::bind::BindMap) {
        let quoter = Quoter::default();
        let mut ctx = CompileContext::new(&quoter, 0);
        let sql = filter.compile(&mut ctx).unwrap();
        (sql, ctx.finish().0)
    }

    #[test]
    fn comparison_and_equality() {
        let (sql, binds) = compile(&Where::new().gt("age", 18).eq("status", "active"));
        assert_eq!(sql, r#" WHERE "age" > :ph0_b AND "status" = :ph1_b"#);
        assert_eq!(binds.get(":ph0_b").unwrap().value, Value::Int(18));
        assert_eq!(binds.get(":ph0_b").unwrap().kind, ParamKind::Int);
        assert_eq!(binds.get(":ph1_b").unwrap().value, Value::Str("active".into()));
        assert_eq!(binds.get(":ph1_b").unwrap().kind, ParamKind::Str);
    }

    #[test]
    fn null_and_in_list() {
        let (sql, binds) = compile(&Where::new().is_null("deleted_at").in_list("id", [1, 2, 3]));
        assert_eq!(
            sql,
            r#" WHERE "deleted_at" IS NULL AND "id" IN (:ph0_b, :ph1_b, :ph2_b)"#
        );
        assert_eq!(binds.len(), 3);
    }

    #[test]
    fn placeholder_count_matches_values() {
        let filter = Where::new()
            .eq("a", 1)
            .is_null("b")
            .in_list("c", ["x", "y"])
            .lt("d", 2.5)
            .columns("e", CmpOp::Gte, "f");
        let (_, binds) = compile(&filter);
        assert_eq!(binds.len(), 1 + 2 + 1);
    }

    #[test]
    fn empty_in_list_is_false() {
        let (sql, binds) = compile(&Where::new().in_list("id", Vec::<i64>::new()));
        assert_eq!(sql, " WHERE 1=0");
        assert!(binds.is_empty());
    }

    #[test]
    fn nested_groups() {
        let filter = Where::new().eq("status", "active").push(Cond::or(vec![
            Cond::eq("role", "admin"),
            Cond::and(vec![Cond::eq("role", "user"), Cond::cmp("rep", CmpOp::Gt, 100)]),
        ]));
        let (sql, binds) = compile(&filter);
        assert_eq!(
            sql,
            r#" WHERE "status" = :ph0_b AND ("role" = :ph1_b OR ("role" = :ph2_b AND "rep" > :ph3_b))"#
        );
        assert_eq!(binds.len(), 4);
    }

    #[test]
    fn column_comparison_binds_nothing() {
        let (sql, binds) = compile(&Where::new().columns("users.a", CmpOp::Ne, "b"));
        assert_eq!(sql, r#" WHERE "users"."a" != "b""#);
        assert!(binds.is_empty());
    }

    #[test]
    fn trailing_clauses_in_fixed_order() {
        let filter = Where::new()
            .limit(5)
            .order_desc("created_at")
            .order_by("id")
            .group_by("type")
            .having(Cond::cmp("type", CmpOp::Ne, "x"))
            .eq("a", 1);
        let (sql, _) = compile(&filter);
        assert_eq!(
            sql,
            r#" WHERE "a" = :ph0_b GROUP BY "type" HAVING "type" != :ph1_b ORDER BY "created_at" DESC,"id" LIMIT 5"#
        );
    }

    #[test]
    fn limit_forms() {
        assert_eq!(compile(&Where::new().limit_offset(10, 20)).0, " LIMIT 20 OFFSET 10");
        assert_eq!(compile(&Where::new().limit("15")).0, " LIMIT 15");
        assert_eq!(compile(&Where::new().limit("abc")).0, "");
        assert_eq!(compile(&Where::new().limit_offset("x", 20)).0, "");
        assert_eq!(compile(&Where::new().limit("1; DROP TABLE t")).0, "");
    }

    #[test]
    fn invalid_column_is_fatal() {
        let quoter = Quoter::default();
        let mut ctx = CompileContext::new(&quoter, 0);
        let err = Where::new().eq("a b", 1).compile(&mut ctx).unwrap_err();
        assert!(matches!(err, OrmError::InvalidIdentifier(_)));
    }

    #[test]
    fn connective_tags() {
        assert_eq!(Connective::parse_tag("AND"), Some((Connective::And, None)));
        assert_eq!(
            Connective::parse_tag("OR #second"),
            Some((Connective::Or, Some("#second")))
        );
        assert_eq!(Connective::parse_tag("OR second"), None);
        assert_eq!(Connective::parse_tag("and"), None);
        assert_eq!(Connective::parse_tag("ANDROID"), None);
    }
}
