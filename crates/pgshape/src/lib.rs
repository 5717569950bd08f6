//! # pgshape
//!
//! Shape-driven SQL statement compiler and named-parameter binder for PostgreSQL.
//!
//! ## Features
//!
//! - **Structured queries**: describe table, joins, columns and filters as data;
//!   get back SQL plus a named bind map
//! - **Safe identifiers**: every table and column name is validated and quoted
//! - **Raw fragments**: hand-written SQL with `<identifier>` markers and its own parameters
//! - **Mapping input**: the same shapes can be read from `serde_json` values
//! - **Diagnostics**: literal SQL reconstruction, test mode, debug capture, statement log
//!
//! ## Example
//!
//! ```ignore
//! use pgshape::{ConnectOptions, Data, Engine, EngineConfig, JoinSpec, QuerySpec, Relation, Where};
//!
//! let mut db = Engine::connect(
//!     &ConnectOptions::from_url(std::env::var("DATABASE_URL")?),
//!     EngineConfig::new().prefix("app_"),
//! )
//! .await?;
//!
//! // SELECT
//! let rows = db
//!     .select(
//!         &QuerySpec::new("users")
//!             .join(JoinSpec::new().join("[><]roles(r)", Relation::on([("role_id", "id")])))
//!             .columns(vec!["users.id", "r.name(role)"])
//!             .filter(Where::new().gt("users.age", 18).order_desc("users.id").limit(10)),
//!     )
//!     .await?;
//!
//! // INSERT
//! db.insert("users", &[Data::new().set("name", "alice").set("age", 30)])
//!     .await?;
//!
//! // UPDATE
//! db.update("users", &Data::new().set("age", 31), Some(&Where::new().eq("name", "alice")))
//!     .await?;
//!
//! // DELETE
//! db.delete("users", Some(&Where::new().eq("name", "alice")))
//!     .await?;
//!
//! if let Some(error) = db.error() {
//!     eprintln!("last statement failed: {error}");
//! }
//! ```

pub mod bind;
pub mod client;
pub mod columns;
pub mod compile;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod ident;
pub mod join;
pub mod json;
pub mod literal;
pub mod pg;
pub mod raw;
pub mod row;
pub mod value;

pub use bind::BindMap;
pub use client::{Connection, Offline, ServerInfo, Statement};
pub use columns::{Column, Columns, TypeHint};
pub use compile::{Assign, CompileContext, Compiled, Compiler, Data, QuerySpec};
pub use condition::{CmpOp, Cond, Connective, Direction, Limit, Where};
pub use config::{ConnectOptions, EngineConfig};
pub use engine::{Engine, TxControl};
pub use error::{ErrorInfo, OrmError, OrmResult};
pub use ident::Quoter;
pub use join::{JoinCond, JoinKind, JoinSpec, Relation};
pub use literal::{IdentStyle, literal_sql};
pub use pg::{PgConnection, PgStatement};
pub use raw::{Raw, raw};
pub use row::{FromRow, Row};
pub use value::{Bound, FromValue, ParamKind, Value};

// Re-export tokio_postgres for convenience
pub use tokio_postgres;
