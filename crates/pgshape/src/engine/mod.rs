//! Statement execution.
//!
//! [`Engine`] compiles specifications, prepares the SQL on its connection,
//! binds every value by name and executes. Driver failures do not surface as
//! `Err`: they are stored (see [`Engine::error`] and [`Engine::error_info`])
//! and the operation returns `Ok(None)`. Compile errors and transaction
//! failures are returned as `Err`.
//!
//! # Example
//! ```ignore
//! use pgshape::{ConnectOptions, Engine, EngineConfig, QuerySpec, Where};
//!
//! let mut db = Engine::connect(&ConnectOptions::from_url(url), EngineConfig::new()).await?;
//! let rows = db
//!     .select(&QuerySpec::new("users").filter(Where::new().gt("age", 18)))
//!     .await?;
//! match rows {
//!     Some(rows) => println!("{} users", rows.len()),
//!     None => eprintln!("query failed: {:?}", db.error()),
//! }
//! ```
//!
//! # Modes
//! - **test mode** ([`EngineConfig::test_mode`]): nothing runs; the literal SQL
//!   of the latest statement is kept in [`Engine::query_string`].
//! - **debug** ([`Engine::debug`]): the next statement is not run; its literal
//!   SQL is emitted on the `pgshape.debug` target and kept in `query_string`.
//! - **debug session** ([`Engine::begin_debug`] / [`Engine::debug_log`]): every
//!   statement until `debug_log` is collected instead of run.

use futures_util::future::BoxFuture;

use crate::bind::BindMap;
use crate::client::{Connection, Offline, ServerInfo, Statement};
use crate::compile::{Compiler, Data, QuerySpec};
use crate::condition::Where;
use crate::config::{ConnectOptions, EngineConfig};
use crate::error::{ErrorInfo, OrmError, OrmResult};
use crate::ident::Quoter;
use crate::literal::literal_sql;
use crate::pg::PgConnection;
use crate::raw::Raw;
use crate::row::{FromRow, Row};

/// Outcome requested by a transactional callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxControl {
    Commit,
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DebugMode {
    #[default]
    Off,
    Once,
    Session,
}

type NoCallback<S> = for<'s> fn(&'s mut S) -> BoxFuture<'s, OrmResult<TxControl>>;

/// Compiles and executes statements over one connection.
pub struct Engine<C: Connection> {
    conn: C,
    config: EngineConfig,
    compiler: Compiler,
    statement: Option<C::Statement>,
    logs: Vec<(String, BindMap)>,
    debug: DebugMode,
    debug_logs: Vec<String>,
    query_string: Option<String>,
    error: Option<String>,
    error_info: Option<ErrorInfo>,
}

impl Engine<Offline> {
    /// An engine without a database, for compiling in test mode.
    pub fn offline(config: EngineConfig) -> Self {
        Self::new(Offline, config)
    }
}

impl Engine<PgConnection> {
    pub async fn connect(options: &ConnectOptions, config: EngineConfig) -> OrmResult<Self> {
        let conn = PgConnection::connect(options).await?;
        Ok(Self::new(conn, config))
    }
}

impl<C: Connection> Engine<C> {
    pub fn new(conn: C, config: EngineConfig) -> Self {
        let compiler = Compiler::new(Quoter::new(config.prefix.clone()));
        Self {
            conn,
            config,
            compiler,
            statement: None,
            logs: Vec::new(),
            debug: DebugMode::Off,
            debug_logs: Vec::new(),
            query_string: None,
            error: None,
            error_info: None,
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The compiler, sharing this engine's placeholder counter.
    pub fn compiler(&mut self) -> &mut Compiler {
        &mut self.compiler
    }

    /// Quote a string literal.
    pub fn quote(&self, value: &str) -> String {
        self.compiler.quoter().quote(value)
    }

    // ─── Execution ──────────────────────────────────────────────────────────

    /// Prepare, bind and execute `sql`.
    pub async fn exec(&mut self, sql: &str, binds: BindMap) -> OrmResult<Option<&mut C::Statement>> {
        self.run(sql, binds, None::<NoCallback<C::Statement>>).await
    }

    /// Like [`exec`](Self::exec), inside a transaction.
    ///
    /// `callback` receives the bound statement before it executes and may bind
    /// more values or execute it itself. Returning [`TxControl::Abort`] or an
    /// error rolls the transaction back; otherwise the statement executes and
    /// the transaction commits.
    pub async fn exec_with<F>(
        &mut self,
        sql: &str,
        binds: BindMap,
        callback: F,
    ) -> OrmResult<Option<&mut C::Statement>>
    where
        F: for<'s> FnOnce(&'s mut C::Statement) -> BoxFuture<'s, OrmResult<TxControl>> + Send,
    {
        self.run(sql, binds, Some(callback)).await
    }

    async fn run<F>(
        &mut self,
        sql: &str,
        binds: BindMap,
        callback: Option<F>,
    ) -> OrmResult<Option<&mut C::Statement>>
    where
        F: for<'s> FnOnce(&'s mut C::Statement) -> BoxFuture<'s, OrmResult<TxControl>> + Send,
    {
        self.statement = None;
        self.error = None;
        self.error_info = None;

        if self.config.test_mode {
            self.query_string = Some(self.literal(sql, &binds));
            return Ok(None);
        }

        match self.debug {
            DebugMode::Session => {
                let literal = self.literal(sql, &binds);
                self.debug_logs.push(literal);
                return Ok(None);
            }
            DebugMode::Once => {
                let literal = self.literal(sql, &binds);
                tracing::info!(target: "pgshape.debug", "{literal}");
                self.query_string = Some(literal);
                self.debug = DebugMode::Off;
                return Ok(None);
            }
            DebugMode::Off => {}
        }

        tracing::debug!(target: "pgshape.sql", sql = %sql, params = binds.len(), "executing statement");
        if !self.config.logging {
            self.logs.clear();
        }
        self.logs.push((sql.to_string(), binds.clone()));

        let mut statement = match self.conn.prepare(sql).await {
            Ok(statement) => statement,
            Err(info) => {
                self.fail("prepare", info);
                return Ok(None);
            }
        };
        for (name, bound) in &binds {
            statement.bind(name, bound)?;
        }

        let outcome = match callback {
            Some(callback) => transact(&self.conn, &mut statement, callback).await?,
            None => statement.execute().await,
        };

        match outcome {
            Ok(_) => {
                self.statement = Some(statement);
                Ok(self.statement.as_mut())
            }
            Err(info) => {
                self.fail("execute", info);
                Ok(None)
            }
        }
    }

    fn fail(&mut self, stage: &'static str, info: ErrorInfo) {
        tracing::warn!(
            target: "pgshape.sql",
            stage,
            sqlstate = %info.sqlstate,
            error = %info.message,
            "statement failed"
        );
        self.error = Some(info.message.clone());
        self.error_info = Some(info);
    }

    /// Run several operations atomically.
    ///
    /// Commits when `actions` returns [`TxControl::Commit`]. Rolls back on
    /// [`TxControl::Abort`] (yielding [`OrmError::TransactionAborted`]) or on
    /// error (yielding [`OrmError::Transaction`]).
    pub async fn action<F>(&mut self, actions: F) -> OrmResult<()>
    where
        F: for<'e> FnOnce(&'e mut Self) -> BoxFuture<'e, OrmResult<TxControl>>,
    {
        self.conn.begin().await?;
        let failure = match actions(&mut *self).await {
            Ok(TxControl::Commit) => None,
            Ok(TxControl::Abort) => Some(OrmError::TransactionAborted),
            Err(e) => Some(OrmError::Transaction(Box::new(e))),
        };
        match failure {
            None => self.conn.commit().await,
            Some(error) => Err(rollback_with(&self.conn, error).await),
        }
    }

    // ─── Operations ─────────────────────────────────────────────────────────

    pub async fn select(&mut self, spec: &QuerySpec) -> OrmResult<Option<Vec<Row>>> {
        let compiled = self.compiler.select(spec)?;
        Ok(self
            .exec(&compiled.sql, compiled.binds)
            .await?
            .map(|statement| statement.fetch_all()))
    }

    /// [`select`](Self::select), mapping each row with [`FromRow`].
    pub async fn select_as<T: FromRow>(&mut self, spec: &QuerySpec) -> OrmResult<Option<Vec<T>>> {
        match self.select(spec).await? {
            Some(rows) => rows.iter().map(T::from_row).collect::<OrmResult<Vec<_>>>().map(Some),
            None => Ok(None),
        }
    }

    /// Insert one or more rows, returning the affected row count.
    pub async fn insert(&mut self, table: &str, rows: &[Data]) -> OrmResult<Option<u64>> {
        let compiled = self.compiler.insert(table, rows)?;
        Ok(self
            .exec(&compiled.sql, compiled.binds)
            .await?
            .map(|statement| statement.row_count()))
    }

    pub async fn update(
        &mut self,
        table: &str,
        data: &Data,
        filter: Option<&Where>,
    ) -> OrmResult<Option<u64>> {
        let compiled = self.compiler.update(table, data, filter)?;
        Ok(self
            .exec(&compiled.sql, compiled.binds)
            .await?
            .map(|statement| statement.row_count()))
    }

    pub async fn delete(&mut self, table: &str, filter: Option<&Where>) -> OrmResult<Option<u64>> {
        let compiled = self.compiler.delete(table, filter)?;
        Ok(self
            .exec(&compiled.sql, compiled.binds)
            .await?
            .map(|statement| statement.row_count()))
    }

    /// Run a raw fragment.
    pub async fn query(&mut self, raw: &Raw) -> OrmResult<Option<&mut C::Statement>> {
        let compiled = self.compiler.query(raw)?;
        self.exec(&compiled.sql, compiled.binds).await
    }

    pub async fn last_insert_id(&self, sequence: Option<&str>) -> OrmResult<Option<String>> {
        if self.config.test_mode {
            return Ok(None);
        }
        self.conn.last_insert_id(sequence).await
    }

    pub async fn info(&self) -> OrmResult<ServerInfo> {
        self.conn.server_info().await
    }

    // ─── Diagnostics ────────────────────────────────────────────────────────

    /// Message of the last driver failure, cleared by every new statement.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    /// The last executed statement, if it succeeded.
    pub fn statement(&mut self) -> Option<&mut C::Statement> {
        self.statement.as_mut()
    }

    /// Literal SQL recorded by test mode or one-shot debug.
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Literal SQL of the most recently executed statement.
    pub fn last(&self) -> Option<String> {
        self.logs
            .last()
            .map(|(sql, binds)| self.literal(sql, binds))
    }

    /// Literal SQL of every logged statement.
    pub fn log(&self) -> Vec<String> {
        self.logs
            .iter()
            .map(|(sql, binds)| self.literal(sql, binds))
            .collect()
    }

    /// Skip execution of the next statement and emit its literal SQL instead.
    pub fn debug(&mut self) -> &mut Self {
        self.debug = DebugMode::Once;
        self
    }

    /// Collect statements instead of running them until [`debug_log`](Self::debug_log).
    pub fn begin_debug(&mut self) {
        self.debug = DebugMode::Session;
    }

    /// End a debug session and return the collected statements.
    pub fn debug_log(&mut self) -> Vec<String> {
        self.debug = DebugMode::Off;
        std::mem::take(&mut self.debug_logs)
    }

    fn literal(&self, sql: &str, binds: &BindMap) -> String {
        literal_sql(sql, binds, self.config.literal_style)
    }
}

async fn transact<C, F>(
    conn: &C,
    statement: &mut C::Statement,
    callback: F,
) -> OrmResult<Result<u64, ErrorInfo>>
where
    C: Connection,
    F: for<'s> FnOnce(&'s mut C::Statement) -> BoxFuture<'s, OrmResult<TxControl>> + Send,
{
    conn.begin().await?;

    let failure = match callback(&mut *statement).await {
        Ok(TxControl::Commit) => None,
        Ok(TxControl::Abort) => Some(OrmError::TransactionAborted),
        Err(e) => Some(OrmError::Transaction(Box::new(e))),
    };
    if let Some(error) = failure {
        return Err(rollback_with(conn, error).await);
    }

    match statement.execute().await {
        Ok(affected) => {
            conn.commit().await?;
            Ok(Ok(affected))
        }
        Err(info) => match conn.rollback().await {
            Ok(()) => Ok(Err(info)),
            Err(rollback_err) => Err(OrmError::Other(format!(
                "{info} (rollback failed: {rollback_err})"
            ))),
        },
    }
}

async fn rollback_with<C: Connection>(conn: &C, error: OrmError) -> OrmError {
    tracing::warn!(target: "pgshape.sql", error = %error, "rolling back transaction");
    match conn.rollback().await {
        Ok(()) => error,
        Err(rollback_err) => OrmError::Other(format!("{error} (rollback failed: {rollback_err})")),
    }
}
