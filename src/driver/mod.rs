//! Minimal driver SPI the engine backends plug into.
//!
//! This plays the role a standard driver interface plays elsewhere: each
//! backend exposes a [`SqlDriver`] that opens [`DriverConnection`]s, and the
//! [`proxy`] module wraps any such driver with translation, tracing, and
//! error-mapping hooks. Drivers are published under process-wide names
//! through the [`registry`].

pub mod proxy;
pub mod registry;

use async_trait::async_trait;

use crate::error::SqlGatewayError;
use crate::values::{ResultSet, SqlValue};

/// A backend capable of opening connections from a connection string.
#[async_trait]
pub trait SqlDriver: Send + Sync {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DriverConnection>, SqlGatewayError>;
}

/// One open connection to a backend.
///
/// The facade owns exactly one of these at a time; the trait is object-safe
/// so backends can be swapped behind `Box<dyn DriverConnection>`.
#[async_trait]
pub trait DriverConnection: Send {
    /// Cheap liveness round-trip.
    async fn ping(&mut self) -> Result<(), SqlGatewayError>;

    /// Run a DML/DDL statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue])
    -> Result<u64, SqlGatewayError>;

    /// Run a query, returning the rows in backend order.
    async fn query(&mut self, sql: &str, params: &[SqlValue])
    -> Result<ResultSet, SqlGatewayError>;

    /// Prepare a statement for repeated execution. The statement text is
    /// fixed at this point.
    async fn prepare(&mut self, sql: &str)
    -> Result<Box<dyn DriverStatement>, SqlGatewayError>;

    async fn begin(&mut self) -> Result<(), SqlGatewayError>;

    async fn commit(&mut self) -> Result<(), SqlGatewayError>;

    async fn rollback(&mut self) -> Result<(), SqlGatewayError>;

    /// Release the connection. Implementations must release local resources
    /// even when the backend reports an error.
    async fn close(&mut self) -> Result<(), SqlGatewayError>;
}

/// A statement prepared on one connection.
#[async_trait]
pub trait DriverStatement: Send {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError>;

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError>;
}

/// Maps driver-boundary errors onto the canonical taxonomy.
///
/// Implementations must be pure and act as the identity on values that are
/// already canonical, so an error crossing several layers is still mapped
/// exactly once.
pub trait ErrorMapper: Send + Sync {
    fn map(&self, err: SqlGatewayError) -> SqlGatewayError;
}
