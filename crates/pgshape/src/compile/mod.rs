//! Statement compilation.
//!
//! [`Compiler`] turns typed specifications into a SQL string plus a
//! [`BindMap`]. It owns the placeholder counter, so placeholder names never
//! repeat across the statements one compiler builds.
//!
//! # Example
//! ```ignore
//! use pgshape::{Compiler, QuerySpec, Quoter, Where};
//!
//! let mut compiler = Compiler::new(Quoter::default());
//! let compiled = compiler.select(
//!     &QuerySpec::new("users")
//!         .columns(vec!["id", "name"])
//!         .filter(Where::new().gt("age", 18).eq("status", "active")),
//! )?;
//! assert_eq!(
//!     compiled.sql,
//!     r#"SELECT "id","name" FROM "users" WHERE "age" > :ph0_b AND "status" = :ph1_b"#
//! );
//! ```

mod context;

pub use context::CompileContext;

use crate::bind::BindMap;
use crate::columns::{Columns, project};
use crate::condition::Where;
use crate::error::{OrmError, OrmResult};
use crate::ident::{Quoter, split_alias};
use crate::join::JoinSpec;
use crate::raw::Raw;
use crate::value::Value;

/// A compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub binds: BindMap,
}

/// Specification of a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Table name, optionally with an alias: `users(u)`.
    pub table: String,
    pub join: Option<JoinSpec>,
    pub columns: Columns,
    pub filter: Option<Where>,
}

impl QuerySpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    pub fn columns(mut self, columns: impl Into<Columns>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Value assigned to a column by INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub enum Assign {
    Value(Value),
    Raw(Raw),
}

impl Assign {
    /// Expanded SQL for a raw assignment, `None` for a plain value.
    pub fn expand_raw(&self, ctx: &mut CompileContext<'_>) -> OrmResult<Option<String>> {
        match self {
            Assign::Raw(raw) => ctx.expand_raw(raw).map(Some),
            Assign::Value(_) => Ok(None),
        }
    }
}

/// Ordered column assignments for INSERT and UPDATE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    pub entries: Vec<(String, Assign)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column.into(), Assign::Value(value.into()));
        self
    }

    pub fn set_raw(mut self, column: impl Into<String>, raw: Raw) -> Self {
        self.put(column.into(), Assign::Raw(raw));
        self
    }

    fn put(&mut self, column: String, assign: Assign) {
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = assign,
            None => self.entries.push((column, assign)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Assign> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, a)| a)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Statement builder holding the quoter and placeholder counter.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    quoter: Quoter,
    next_placeholder: u64,
}

impl Compiler {
    pub fn new(quoter: Quoter) -> Self {
        Self {
            quoter,
            next_placeholder: 0,
        }
    }

    pub fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    /// Counter value the next placeholder will use.
    pub fn next_placeholder(&self) -> u64 {
        self.next_placeholder
    }

    /// Run `f` with a fresh context; the counter advances only on success.
    pub fn build(
        &mut self,
        f: impl FnOnce(&mut CompileContext<'_>) -> OrmResult<String>,
    ) -> OrmResult<Compiled> {
        let mut ctx = CompileContext::new(&self.quoter, self.next_placeholder);
        let sql = f(&mut ctx)?;
        let (binds, next) = ctx.finish();
        self.next_placeholder = next;
        Ok(Compiled { sql, binds })
    }

    pub fn select(&mut self, spec: &QuerySpec) -> OrmResult<Compiled> {
        self.build(|ctx| select(spec, ctx))
    }

    pub fn insert(&mut self, table: &str, rows: &[Data]) -> OrmResult<Compiled> {
        self.build(|ctx| insert(table, rows, ctx))
    }

    pub fn update(&mut self, table: &str, data: &Data, filter: Option<&Where>) -> OrmResult<Compiled> {
        self.build(|ctx| update(table, data, filter, ctx))
    }

    pub fn delete(&mut self, table: &str, filter: Option<&Where>) -> OrmResult<Compiled> {
        self.build(|ctx| delete(table, filter, ctx))
    }

    pub fn query(&mut self, raw: &Raw) -> OrmResult<Compiled> {
        self.build(|ctx| ctx.expand_raw(raw))
    }
}

fn filter_clause(filter: Option<&Where>, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    match filter {
        Some(filter) => filter.compile(ctx),
        None => Ok(String::new()),
    }
}

/// `SELECT <columns> FROM <table>[ AS <alias>][ <joins>]<where>`
pub fn select(spec: &QuerySpec, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    let (table, alias) = split_alias(spec.table.trim()).ok_or_else(|| {
        OrmError::invalid_identifier(format!("Incorrect table name: {}", spec.table))
    })?;

    let mut from = ctx.quote_table(table)?;
    let base = match alias {
        Some(alias) => {
            let alias = ctx.quote_table(alias)?;
            from.push_str(" AS ");
            from.push_str(&alias);
            alias
        }
        None => from.clone(),
    };

    let join = spec.join.as_ref().filter(|j| !j.is_empty());
    let columns = project(&spec.columns, join.is_some(), ctx)?;

    if let Some(join) = join {
        let joins = join.compile(&base, ctx)?;
        if !joins.is_empty() {
            from.push(' ');
            from.push_str(&joins);
        }
    }

    let clause = filter_clause(spec.filter.as_ref(), ctx)?;
    Ok(format!("SELECT {columns} FROM {from}{clause}"))
}

/// Multi-row INSERT over the union of all rows' columns, in first-seen order.
///
/// A column missing from a row, or set to NULL, is written as a literal `NULL`.
pub fn insert(table: &str, rows: &[Data], ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for (column, _) in &row.entries {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    if columns.is_empty() {
        return Err(OrmError::invalid_argument("INSERT requires at least one column"));
    }

    let table = ctx.quote_table(table)?;
    let fields = columns
        .iter()
        .map(|c| ctx.quote_column(c))
        .collect::<OrmResult<Vec<_>>>()?;

    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            values.push(match row.get(column) {
                None | Some(Assign::Value(Value::Null)) => "NULL".to_string(),
                Some(Assign::Value(value)) => ctx.push_value(value.clone()),
                Some(assign @ Assign::Raw(_)) => assign.expand_raw(ctx)?.unwrap_or_default(),
            });
        }
        tuples.push(format!("({})", values.join(", ")));
    }

    Ok(format!(
        "INSERT INTO {table} ({}) VALUES {}",
        fields.join(", "),
        tuples.join(", ")
    ))
}

/// `UPDATE <table> SET "c" = <value>, ...<where>`
pub fn update(
    table: &str,
    data: &Data,
    filter: Option<&Where>,
    ctx: &mut CompileContext<'_>,
) -> OrmResult<String> {
    if data.is_empty() {
        return Err(OrmError::invalid_argument("UPDATE requires at least one column"));
    }

    let table = ctx.quote_table(table)?;
    let mut sets = Vec::with_capacity(data.entries.len());
    for (column, assign) in &data.entries {
        let column = ctx.quote_column(column)?;
        let value = match assign {
            Assign::Value(value) => ctx.push_value(value.clone()),
            Assign::Raw(_) => assign.expand_raw(ctx)?.unwrap_or_default(),
        };
        sets.push(format!("{column} = {value}"));
    }

    let clause = filter_clause(filter, ctx)?;
    Ok(format!("UPDATE {table} SET {}{clause}", sets.join(", ")))
}

/// `DELETE FROM <table><where>`
pub fn delete(table: &str, filter: Option<&Where>, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    let table = ctx.quote_table(table)?;
    let clause = filter_clause(filter, ctx)?;
    Ok(format!("DELETE FROM {table}{clause}"))
}
