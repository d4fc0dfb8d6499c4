//! Vendor-neutral SQL client facade.
//!
//! Application code issues statements through one [`client::SqlClient`]
//! interface while the actual backend (Oracle, PostgreSQL, `SQLite`, or an
//! in-process test double) is chosen via configuration. Each backend is an
//! [`engines::EngineAdapter`] pairing a connection-construction strategy
//! with a canonical error-mapping table; a driver-level interceptor injects
//! placeholder translation and tracing into every statement execution, and
//! the client applies a bounded open/ping/reconnect protocol.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sql_gateway::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlGatewayError> {
//! let adapter = Arc::new(SqliteAdapter::new(":memory:?_foreign_keys=on"));
//! let client = SqlClientBuilder::new(adapter).build();
//! client.open().await?;
//!
//! client
//!     .execute(
//!         "CREATE TABLE people (id INTEGER PRIMARY KEY, firstname TEXT, lastname TEXT)",
//!         &[],
//!     )
//!     .await?;
//! let mut insert = client
//!     .prepare("INSERT INTO people (firstname, lastname) VALUES (:1, :2)")
//!     .await?;
//! insert
//!     .execute(&[
//!         SqlValue::Text("Gene".to_string()),
//!         SqlValue::Text("Kranz".to_string()),
//!     ])
//!     .await?;
//!
//! let rows = client
//!     .query("SELECT id, firstname, lastname FROM people", &[])
//!     .await?;
//! for row in &rows.rows {
//!     println!("{:?} {:?}", row.get("firstname"), row.get("lastname"));
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod driver;
pub mod engines;
pub mod error;
pub mod prelude;
pub mod translation;
pub mod values;

pub use builder::SqlClientBuilder;
pub use client::SqlClient;
pub use engines::EngineKind;
pub use error::SqlGatewayError;
