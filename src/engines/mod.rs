//! Engine adapters: one per backend, pairing a connection-construction
//! strategy with an error-mapping table and a sequence-query dialect.

pub mod mock;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::driver::DriverConnection;
use crate::error::SqlGatewayError;
use crate::translation::SyntaxTranslator;

/// The database engines supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Oracle database
    Oracle,
    /// PostgreSQL database
    Postgres,
    /// SQLite database
    Sqlite,
    /// In-process test double
    Mock,
}

impl EngineKind {
    /// Engine name as reported in diagnostics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Oracle => "Oracle",
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite3",
            Self::Mock => "MockDB",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-backend strategy: connection construction, error mapping, and
/// sequence-query generation. The binding of a client to its adapter is
/// fixed at build time and immutable for the client's lifetime.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Build the vendor connection spec and open it through the driver
    /// interceptor, so every later statement passes the hooks. Registration
    /// of the backend's named proxy driver is idempotent.
    ///
    /// # Errors
    /// [`SqlGatewayError::ConnectionFailed`] when the backend cannot be
    /// reached; [`SqlGatewayError::Config`] for invalid construction
    /// parameters.
    async fn open(
        &self,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError>;

    /// Map vendor error codes onto the canonical taxonomy. Pure; identity
    /// on non-vendor and already-canonical errors.
    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError;

    /// The dialect-correct statement fetching the next value of a named
    /// sequence.
    fn next_sequence_query(&self, sequence: &str) -> String;
}
