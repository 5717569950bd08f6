//! Driver seam.
//!
//! [`Connection`] and [`Statement`] are what the engine needs from a database
//! driver. [`PgConnection`](crate::PgConnection) implements them over
//! `tokio-postgres`; [`Offline`] is used when nothing should ever run.

use std::future::Future;

use serde::Serialize;

use crate::error::{ErrorInfo, OrmError, OrmResult};
use crate::row::Row;
use crate::value::Bound;

/// A prepared statement.
pub trait Statement: Send {
    /// Bind `value` to the named placeholder `name` (with its leading `:`).
    fn bind(&mut self, name: &str, value: &Bound) -> OrmResult<()>;

    /// Run the statement with the current bindings, returning the affected row count.
    ///
    /// May be called more than once; each call replaces the fetched rows.
    fn execute(&mut self) -> impl Future<Output = Result<u64, ErrorInfo>> + Send;

    /// Rows produced by the last execution.
    fn fetch_all(&mut self) -> Vec<Row>;

    /// Rows affected (or returned) by the last execution.
    fn row_count(&self) -> u64;
}

/// A database connection.
pub trait Connection: Send + Sync {
    type Statement: Statement;

    fn prepare(&self, sql: &str) -> impl Future<Output = Result<Self::Statement, ErrorInfo>> + Send;

    fn begin(&self) -> impl Future<Output = OrmResult<()>> + Send;

    fn commit(&self) -> impl Future<Output = OrmResult<()>> + Send;

    fn rollback(&self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Last generated id of `sequence`, or of the session's most recent
    /// sequence use when `None`.
    fn last_insert_id(
        &self,
        sequence: Option<&str>,
    ) -> impl Future<Output = OrmResult<Option<String>>> + Send;

    fn server_info(&self) -> impl Future<Output = OrmResult<ServerInfo>> + Send;
}

/// Connection and server details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub server_version: String,
    pub driver: String,
    pub client_version: String,
    /// Frontend/backend protocol version of the session.
    pub protocol_version: String,
    pub server_encoding: String,
    pub client_encoding: String,
    pub connection: String,
}

/// A connection that refuses to run anything.
///
/// Pairs with [`EngineConfig::test_mode`](crate::EngineConfig) to compile and
/// inspect statements without a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

/// Statement type of [`Offline`]; never constructed.
#[derive(Debug)]
pub enum OfflineStatement {}

fn offline_info() -> ErrorInfo {
    ErrorInfo::new("08003", "no database connection")
}

impl Statement for OfflineStatement {
    fn bind(&mut self, _name: &str, _value: &Bound) -> OrmResult<()> {
        match *self {}
    }

    async fn execute(&mut self) -> Result<u64, ErrorInfo> {
        match *self {}
    }

    fn fetch_all(&mut self) -> Vec<Row> {
        match *self {}
    }

    fn row_count(&self) -> u64 {
        match *self {}
    }
}

impl Connection for Offline {
    type Statement = OfflineStatement;

    async fn prepare(&self, _sql: &str) -> Result<OfflineStatement, ErrorInfo> {
        Err(offline_info())
    }

    async fn begin(&self) -> OrmResult<()> {
        Err(OrmError::Connection(offline_info().message))
    }

    async fn commit(&self) -> OrmResult<()> {
        Err(OrmError::Connection(offline_info().message))
    }

    async fn rollback(&self) -> OrmResult<()> {
        Err(OrmError::Connection(offline_info().message))
    }

    async fn last_insert_id(&self, _sequence: Option<&str>) -> OrmResult<Option<String>> {
        Ok(None)
    }

    async fn server_info(&self) -> OrmResult<ServerInfo> {
        Err(OrmError::Connection(offline_info().message))
    }
}
