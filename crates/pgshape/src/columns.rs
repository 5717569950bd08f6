//! Column projection.
//!
//! Column names use the form `name`, `name(alias)` or `name(alias) [Type]`,
//! where `Type` is one of `String`, `Bool`, `Int`, `Number`. The type hint is
//! checked but does not change the emitted SQL.

use crate::compile::CompileContext;
use crate::error::{OrmError, OrmResult};
use crate::ident::{is_ident_char, is_name};
use crate::raw::Raw;

/// Result-shaping hint attached to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    String,
    Bool,
    Int,
    Number,
}

impl TypeHint {
    pub fn parse(s: &str) -> Option<TypeHint> {
        match s {
            "String" => Some(TypeHint::String),
            "Bool" => Some(TypeHint::Bool),
            "Int" => Some(TypeHint::Int),
            "Number" => Some(TypeHint::Number),
            _ => None,
        }
    }
}

/// Projection list of a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Columns {
    #[default]
    All,
    List(Vec<Column>),
}

impl Columns {
    pub fn list<C: Into<Column>>(columns: impl IntoIterator<Item = C>) -> Self {
        Columns::List(columns.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Columns {
    fn from(s: &str) -> Self {
        if s == "*" {
            Columns::All
        } else {
            Columns::List(vec![Column::from(s)])
        }
    }
}

impl<C: Into<Column>> From<Vec<C>> for Columns {
    fn from(columns: Vec<C>) -> Self {
        Columns::list(columns)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Name(String),
    /// A raw expression aliased as `alias` (which may carry a type hint).
    Raw { alias: String, raw: Raw },
    /// A nested group of columns, optionally under a key.
    Group {
        key: Option<String>,
        columns: Vec<Column>,
    },
}

impl Column {
    pub fn raw(alias: impl Into<String>, raw: Raw) -> Self {
        Column::Raw {
            alias: alias.into(),
            raw,
        }
    }

    pub fn group<C: Into<Column>>(key: impl Into<String>, columns: impl IntoIterator<Item = C>) -> Self {
        Column::Group {
            key: Some(key.into()),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn nested<C: Into<Column>>(columns: impl IntoIterator<Item = C>) -> Self {
        Column::Group {
            key: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&str> for Column {
    fn from(s: &str) -> Self {
        Column::Name(s.to_string())
    }
}

impl From<String> for Column {
    fn from(s: String) -> Self {
        Column::Name(s)
    }
}

/// A parsed `name(alias) [Type]` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnName<'a> {
    pub column: &'a str,
    pub alias: Option<&'a str>,
    pub hint: Option<TypeHint>,
}

impl<'a> ColumnName<'a> {
    pub fn parse(s: &'a str) -> OrmResult<Self> {
        let invalid = || OrmError::invalid_identifier(format!("Incorrect column name: {s}"));

        let s = s.trim();
        let end = s
            .char_indices()
            .find(|&(_, c)| !(is_ident_char(c) || c == '.' || c == '*'))
            .map_or(s.len(), |(i, _)| i);
        let (column, mut rest) = s.split_at(end);
        if column.is_empty() {
            return Err(invalid());
        }

        let mut alias = None;
        let trimmed = rest.trim_start();
        if let Some(inner) = trimmed.strip_prefix('(') {
            let (name, after) = inner.split_once(')').ok_or_else(invalid)?;
            if !is_name(name) {
                return Err(invalid());
            }
            alias = Some(name);
            rest = after;
        }

        let mut hint = None;
        let trimmed = rest.trim_start();
        if let Some(inner) = trimmed.strip_prefix('[') {
            let (name, after) = inner.split_once(']').ok_or_else(invalid)?;
            hint = Some(TypeHint::parse(name).ok_or_else(|| {
                OrmError::invalid_argument(format!("Unknown column type hint: {name}"))
            })?);
            rest = after;
        }

        if !rest.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            column,
            alias,
            hint,
        })
    }
}

/// Compile a projection list. `in_join` rejects any wildcard column.
pub fn project(columns: &Columns, in_join: bool, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    match columns {
        Columns::All => Ok("*".to_string()),
        Columns::List(items) => project_list(items, true, in_join, ctx),
    }
}

fn project_list(
    items: &[Column],
    root: bool,
    in_join: bool,
    ctx: &mut CompileContext<'_>,
) -> OrmResult<String> {
    let mut stack = Vec::with_capacity(items.len());

    for item in items {
        match item {
            Column::Group {
                key: Some(key),
                columns,
            } if root && items.len() == 1 => {
                stack.push(ctx.quote_column(key)?);
                stack.push(project_list(columns, false, in_join, ctx)?);
            }
            Column::Group { columns, .. } => {
                stack.push(project_list(columns, false, in_join, ctx)?);
            }
            Column::Raw { alias, raw } => {
                let alias = ColumnName::parse(alias)?.column;
                let expanded = ctx.expand_raw(raw)?;
                stack.push(format!("{expanded} AS {}", ctx.quote_column(alias)?));
            }
            Column::Name(name) => stack.push(project_name(name, in_join, ctx)?),
        }
    }

    stack.retain(|s| !s.is_empty());
    Ok(stack.join(","))
}

fn project_name(name: &str, in_join: bool, ctx: &mut CompileContext<'_>) -> OrmResult<String> {
    if in_join && name.contains('*') {
        return Err(OrmError::invalid_argument(
            "Cannot use table.* to select all columns while joining table",
        ));
    }

    let name = name.trim();
    if name == "*" {
        return Ok("*".to_string());
    }
    if let Some(table) = name.strip_suffix(".*") {
        return Ok(format!("{}.*", ctx.quote_table(table)?));
    }

    let parsed = ColumnName::parse(name)?;
    let column = ctx.quote_column(parsed.column)?;
    match parsed.alias {
        Some(alias) => Ok(format!("{column} AS {}", ctx.quote_column(alias)?)),
        None => Ok(column),
    }
}
