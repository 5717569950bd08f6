//! `tokio-postgres` driver.
//!
//! PostgreSQL only understands positional `$n` parameters, so [`PgConnection::prepare`]
//! rewrites named `:name` placeholders first. A name used more than once maps
//! to a single position.

use std::sync::Arc;

use futures_util::TryStreamExt;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

use crate::bind::{Segment, segments};
use crate::client::{Connection, ServerInfo, Statement};
use crate::config::ConnectOptions;
use crate::error::{ErrorInfo, OrmError, OrmResult};
use crate::ident::quote_literal;
use crate::row::Row;
use crate::value::{Bound, Value};

/// Wire protocol version spoken by `tokio-postgres`.
pub const PROTOCOL_VERSION: &str = "3.0";

/// Rewrite named placeholders to `$n`, returning the SQL and the name of each position.
pub fn to_positional(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();

    for segment in segments(sql) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::QuotedIdent(ident) => {
                out.push('"');
                out.push_str(ident);
                out.push('"');
            }
            Segment::Placeholder(name) => {
                let idx = match names.iter().position(|n| n == name) {
                    Some(idx) => idx,
                    None => {
                        names.push(name.to_string());
                        names.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(idx + 1).to_string());
            }
        }
    }
    (out, names)
}

/// A PostgreSQL connection.
#[derive(Clone)]
pub struct PgConnection {
    client: Arc<Client>,
}

impl PgConnection {
    /// Wrap an already connected client.
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Connect, spawn the connection task and apply `charset` and `commands`.
    pub async fn connect(options: &ConnectOptions) -> OrmResult<Self> {
        let config = options.to_pg_config()?;
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "pgshape", error = %e, "postgres connection error");
            }
        });

        let conn = Self::new(client);
        if let Some(charset) = &options.charset {
            conn.client
                .batch_execute(&format!("SET client_encoding TO {}", quote_literal(charset)))
                .await?;
        }
        for command in &options.commands {
            conn.client.batch_execute(command).await?;
        }
        Ok(conn)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

/// A prepared PostgreSQL statement with its named bindings.
pub struct PgStatement {
    client: Arc<Client>,
    statement: tokio_postgres::Statement,
    names: Vec<String>,
    values: Vec<Option<Bound>>,
    rows: Vec<Row>,
    affected: u64,
}

impl PgStatement {
    /// Placeholder names in positional order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl std::fmt::Debug for PgStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStatement")
            .field("names", &self.names)
            .field("affected", &self.affected)
            .finish()
    }
}

fn convert_row(row: &tokio_postgres::Row, columns: &Arc<[String]>) -> Result<Row, ErrorInfo> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let value: Value = row.try_get(idx).map_err(|e| {
            ErrorInfo::new("22000", format!("cannot decode column {}", columns[idx]))
                .with_detail(e.to_string())
        })?;
        values.push(value);
    }
    Ok(Row::new(columns.clone(), values))
}

impl Statement for PgStatement {
    fn bind(&mut self, name: &str, value: &Bound) -> OrmResult<()> {
        match self.names.iter().position(|n| n == name) {
            Some(idx) => self.values[idx] = Some(value.clone()),
            None => tracing::debug!(
                target: "pgshape.sql",
                placeholder = name,
                "ignoring binding for placeholder not in statement"
            ),
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<u64, ErrorInfo> {
        let params = self
            .names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| {
                value
                    .as_ref()
                    .ok_or_else(|| ErrorInfo::new("07002", format!("no value bound for {name}")))
            })
            .collect::<Result<Vec<&Bound>, _>>()?;

        let stream = self
            .client
            .query_raw(&self.statement, params)
            .await
            .map_err(|e| ErrorInfo::from_pg(&e))?;
        let mut stream = std::pin::pin!(stream);

        let columns: Arc<[String]> = self
            .statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await.map_err(|e| ErrorInfo::from_pg(&e))? {
            rows.push(convert_row(&row, &columns)?);
        }

        self.affected = stream.rows_affected().unwrap_or(rows.len() as u64);
        self.rows = rows;
        Ok(self.affected)
    }

    fn fetch_all(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    fn row_count(&self) -> u64 {
        self.affected
    }
}

impl Connection for PgConnection {
    type Statement = PgStatement;

    async fn prepare(&self, sql: &str) -> Result<PgStatement, ErrorInfo> {
        let (positional, names) = to_positional(sql);
        let statement = self
            .client
            .prepare(&positional)
            .await
            .map_err(|e| ErrorInfo::from_pg(&e))?;
        let values = vec![None; names.len()];
        Ok(PgStatement {
            client: self.client.clone(),
            statement,
            names,
            values,
            rows: Vec::new(),
            affected: 0,
        })
    }

    async fn begin(&self) -> OrmResult<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&self) -> OrmResult<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn last_insert_id(&self, sequence: Option<&str>) -> OrmResult<Option<String>> {
        let result = match sequence {
            Some(sequence) => {
                self.client
                    .query_one("SELECT currval($1::text::regclass)::text", &[&sequence])
                    .await
            }
            None => self.client.query_one("SELECT lastval()::text", &[]).await,
        };
        match result {
            Ok(row) => Ok(row.try_get::<_, Option<String>>(0)?),
            // No sequence used yet in this session.
            Err(e) if e.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn server_info(&self) -> OrmResult<ServerInfo> {
        let row = self
            .client
            .query_one(
                "SELECT current_setting('server_version'), current_setting('server_encoding'), \
                 current_setting('client_encoding')",
                &[],
            )
            .await?;
        Ok(ServerInfo {
            server_version: row.try_get(0)?,
            driver: "postgres".to_string(),
            client_version: concat!("pgshape/", env!("CARGO_PKG_VERSION")).to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_encoding: row.try_get(1)?,
            client_encoding: row.try_get(2)?,
            connection: if self.client.is_closed() { "closed" } else { "open" }.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_named_placeholders() {
        let (sql, names) =
            to_positional(r#"SELECT * FROM "t" WHERE "a" = :ph0_b AND "b" IN (:ph1_b, :ph2_b)"#);
        assert_eq!(sql, r#"SELECT * FROM "t" WHERE "a" = $1 AND "b" IN ($2, $3)"#);
        assert_eq!(names, vec![":ph0_b", ":ph1_b", ":ph2_b"]);
    }

    #[test]
    fn repeated_names_share_a_position() {
        let (sql, names) = to_positional("SELECT :x, :y, :x");
        assert_eq!(sql, "SELECT $1, $2, $1");
        assert_eq!(names, vec![":x", ":y"]);
    }

    #[test]
    fn casts_and_literals_are_not_placeholders() {
        let (sql, names) = to_positional("SELECT ':a', x::int, \"c:d\" -- :e\nFROM t WHERE y = :f");
        assert_eq!(sql, "SELECT ':a', x::int, \"c:d\" -- :e\nFROM t WHERE y = $1");
        assert_eq!(names, vec![":f"]);
    }

    #[test]
    fn dollar_bodies_and_escape_strings_are_kept() {
        let (sql, names) = to_positional("DO $$ BEGIN PERFORM :y; END $$");
        assert_eq!(sql, "DO $$ BEGIN PERFORM :y; END $$");
        assert!(names.is_empty());

        let (sql, names) = to_positional(r"SELECT E'a\'b :x', :z");
        assert_eq!(sql, r"SELECT E'a\'b :x', $1");
        assert_eq!(names, vec![":z"]);
    }
}
