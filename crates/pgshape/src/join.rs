//! Join directives.
//!
//! A join key has the form `[sym]table` or `[sym]table(alias)`:
//!
//! | symbol | join        |
//! |--------|-------------|
//! | `>`    | `LEFT JOIN` |
//! | `<`    | `RIGHT JOIN`|
//! | `<>`   | `FULL JOIN` |
//! | `><`   | `INNER JOIN`|
//!
//! ```ignore
//! use pgshape::{JoinSpec, Relation};
//!
//! let joins = JoinSpec::new()
//!     .join("[><]roles(r)", Relation::on([("uid", "id")]))
//!     .join("[>]profiles", Relation::using("user_id"));
//! // INNER JOIN "roles" AS "r" ON "users"."uid" = "r"."id"
//! //   LEFT JOIN "profiles" USING ("user_id")
//! ```

use crate::compile::CompileContext;
use crate::condition::{CmpOp, Connective};
use crate::error::OrmResult;
use crate::ident::{is_name, scan_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Full,
    Inner,
}

impl JoinKind {
    pub fn from_symbol(symbol: &str) -> Option<JoinKind> {
        match symbol {
            ">" => Some(JoinKind::Left),
            "<" => Some(JoinKind::Right),
            "<>" => Some(JoinKind::Full),
            "><" => Some(JoinKind::Inner),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

/// How a joined table relates to the tables before it.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// `USING ("a", "b")`
    Using(Vec<String>),
    /// `ON ...`
    On(Vec<JoinCond>),
}

impl Relation {
    pub fn using(column: impl Into<String>) -> Self {
        Relation::Using(vec![column.into()])
    }

    pub fn using_all<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Relation::Using(columns.into_iter().map(Into::into).collect())
    }

    /// `ON` from local → referenced column pairs.
    pub fn on<L: Into<String>, F: Into<String>>(pairs: impl IntoIterator<Item = (L, F)>) -> Self {
        Relation::On(
            pairs
                .into_iter()
                .map(|(local, foreign)| JoinCond::pair(local, foreign))
                .collect(),
        )
    }
}

/// One `ON` term. Nothing here binds a value.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCond {
    /// Local column (qualified against the base table unless dotted) equals
    /// a column of the joined table.
    Pair { local: String, foreign: String },
    /// Explicit column-to-column comparison.
    Columns {
        left: String,
        op: CmpOp,
        right: String,
    },
    Group {
        connective: Connective,
        conds: Vec<JoinCond>,
    },
}

impl JoinCond {
    pub fn pair(local: impl Into<String>, foreign: impl Into<String>) -> Self {
        JoinCond::Pair {
            local: local.into(),
            foreign: foreign.into(),
        }
    }

    pub fn columns(left: impl Into<String>, op: CmpOp, right: impl Into<String>) -> Self {
        JoinCond::Columns {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    pub fn and(conds: Vec<JoinCond>) -> Self {
        JoinCond::Group {
            connective: Connective::And,
            conds,
        }
    }

    pub fn or(conds: Vec<JoinCond>) -> Self {
        JoinCond::Group {
            connective: Connective::Or,
            conds,
        }
    }
}

/// Ordered join directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSpec {
    pub entries: Vec<(String, Relation)>,
}

impl JoinSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(mut self, key: impl Into<String>, relation: Relation) -> Self {
        self.entries.push((key.into(), relation));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile all entries. `base` is the quoted alias-or-name of the FROM table.
    ///
    /// Entries whose key does not parse are skipped.
    pub fn compile(&self, base: &str, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
        let mut clauses = Vec::with_capacity(self.entries.len());

        for (key, relation) in &self.entries {
            let Some(target) = JoinTarget::parse(key) else {
                tracing::warn!(target: "pgshape.sql", key = %key, "skipping unparsable join key");
                continue;
            };

            let joined = ctx.quote_table(target.alias.unwrap_or(target.table))?;
            let relation = match relation {
                Relation::Using(columns) => {
                    let columns = columns
                        .iter()
                        .map(|c| ctx.quoter().quote_name(c))
                        .collect::<OrmResult<Vec<_>>>()?;
                    format!("USING ({})", columns.join(", "))
                }
                Relation::On(conds) => {
                    format!("ON {}", compile_on(conds, Connective::And, base, &joined, ctx)?)
                }
            };

            let mut table = ctx.quote_table(target.table)?;
            if let Some(alias) = target.alias {
                table.push_str(" AS ");
                table.push_str(&ctx.quote_table(alias)?);
            }

            clauses.push(format!("{} {table} {relation}", target.kind.as_sql()));
        }

        Ok(clauses.join(" "))
    }
}

/// Parsed join key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JoinTarget<'a> {
    pub kind: JoinKind,
    pub table: &'a str,
    pub alias: Option<&'a str>,
}

impl<'a> JoinTarget<'a> {
    /// Parse `[sym]table`, `[sym]table(alias)` or `[sym]table (alias)`.
    ///
    /// Text after the table or alias is ignored.
    pub(crate) fn parse(key: &'a str) -> Option<Self> {
        let rest = key.strip_prefix('[')?;
        let close = rest.find(']')?;
        let kind = JoinKind::from_symbol(&rest[..close])?;

        let rest = &rest[close + 1..];
        let end = scan_name(rest)?;
        let table = &rest[..end];

        let mut after = &rest[end..];
        if let Some(c) = after.chars().next().filter(|c| c.is_whitespace()) {
            after = &after[c.len_utf8()..];
        }
        let alias = after
            .strip_prefix('(')
            .and_then(|s| s.split_once(')'))
            .map(|(alias, _)| alias)
            .filter(|alias| is_name(alias));

        Some(Self { kind, table, alias })
    }
}

/// Returns `true` if `key` looks like a join directive (`[` first).
pub fn is_join_key(key: &str) -> bool {
    key.starts_with('[')
}

fn compile_on(
    conds: &[JoinCond],
    connective: Connective,
    base: &str,
    joined: &str,
    ctx: &mut CompileContext<'_>,
) -> OrmResult<String> {
    let mut parts = Vec::with_capacity(conds.len());
    for cond in conds {
        parts.push(match cond {
            JoinCond::Pair { local, foreign } => {
                let local = if local.find('.').is_some_and(|pos| pos > 0) {
                    ctx.quote_column(local)?
                } else {
                    format!("{base}.{}", ctx.quoter().quote_name(local)?)
                };
                let foreign = if foreign.contains('.') {
                    ctx.quote_column(foreign)?
                } else {
                    format!("{joined}.{}", ctx.quoter().quote_name(foreign)?)
                };
                format!("{local} = {foreign}")
            }
            JoinCond::Columns { left, op, right } => format!(
                "{} {} {}",
                ctx.quote_column(left)?,
                op.as_str(),
                ctx.quote_column(right)?
            ),
            JoinCond::Group { connective, conds } => {
                format!("({})", compile_on(conds, *connective, base, joined, ctx)?)
            }
        });
    }
    Ok(parts.join(&format!(" {} ", connective.as_str())))
}
