//! Convenient imports for common functionality.

pub use crate::builder::SqlClientBuilder;
pub use crate::client::{
    LIVENESS_PROBE_TIMEOUT, PreparedStatement, RECONNECT_PROBE_TIMEOUT, SqlClient,
    SqlTransaction,
};
pub use crate::engines::mock::MockAdapter;
pub use crate::engines::oracle::OracleAdapter;
pub use crate::engines::postgres::{PostgresAdapter, PostgresTls};
pub use crate::engines::sqlite::SqliteAdapter;
pub use crate::engines::{EngineAdapter, EngineKind};
pub use crate::error::{DriverError, SqlGatewayError, VendorError};
pub use crate::translation::{NoopTranslator, PostgresTranslator, SyntaxTranslator};
pub use crate::values::{ResultSet, SqlRow, SqlValue};
