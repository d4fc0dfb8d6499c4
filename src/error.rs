use thiserror::Error;

use crate::engines::EngineKind;

/// Canonical, backend-independent outcome of a failed database operation.
///
/// Applications branch on these variants with `matches!` instead of
/// comparing vendor codes or message strings. Every vendor-specific error
/// surfaced by the crate resolves to exactly one variant; vendor codes with
/// no mapping arrive as [`SqlGatewayError::Unhandled`] carrying the original
/// code and message, never silently dropped.
#[derive(Debug, Error)]
pub enum SqlGatewayError {
    #[error("unable to connect to the database")]
    ConnectionFailed,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("database not initialized")]
    DbNotInitialized,

    #[error("unique constraint violation")]
    UniqueConstraintViolation,

    #[error("integrity constraint violation")]
    IntegrityConstraintViolation,

    #[error("value too large for column")]
    ValueTooLargeForColumn,

    #[error("value larger than specified precision for column")]
    ValueLargerThanPrecision,

    #[error("cannot set null value into a not-null column")]
    CannotSetNullColumn,

    #[error("invalid numeric value")]
    InvalidNumericValue,

    #[error("subquery returns more than one row")]
    SubqueryReturnsMoreThanOneRow,

    #[error("unable to fetch the next sequence value")]
    NextValueFailed,

    /// Vendor condition with no canonical mapping; code and message are
    /// preserved verbatim so operators can extend the mapping table.
    #[error("unhandled {backend} error. Code:[{code}] Desc:[{message}]")]
    Unhandled {
        backend: EngineKind,
        code: String,
        message: String,
    },

    /// Non-vendor driver failure (network, channel, registry), passed
    /// through unchanged by the adapters.
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} support is not compiled into this build")]
    Unsupported(&'static str),
}

/// Error surfaced at the driver boundary, before adapter mapping.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A backend reported a vendor error code.
    #[error(transparent)]
    Vendor(#[from] VendorError),

    #[error("no driver registered under name {0:?}")]
    NotRegistered(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("execution error: {0}")]
    Execution(String),
}

/// Raw vendor error signal, preserved bit-for-bit per backend.
///
/// Oracle reports a numeric ORA code, PostgreSQL a five-character SQLSTATE,
/// and `SQLite` a primary result code plus an extended code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VendorError {
    #[error("ORA-{code:05}: {message}")]
    Oracle { code: i32, message: String },

    #[error("SQLSTATE {sqlstate}: {message}")]
    Postgres { sqlstate: String, message: String },

    #[error("SQLite error {code} (extended {extended_code}): {message}")]
    Sqlite {
        code: i32,
        extended_code: i32,
        message: String,
    },
}

impl SqlGatewayError {
    /// Convenience constructor for a vendor error wrapped at the driver
    /// boundary, mostly useful in tests and mock programming.
    #[must_use]
    pub fn vendor(err: VendorError) -> Self {
        SqlGatewayError::Driver(DriverError::Vendor(err))
    }
}
