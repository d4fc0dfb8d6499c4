//! `SQLite` engine adapter.
//!
//! The connection target is a filesystem path or `:memory:`, optionally
//! suffixed with `?key=value` options (`_foreign_keys`, `_busy_timeout`)
//! that are applied as PRAGMAs right after the database is opened.

#[cfg(feature = "sqlite")]
mod driver;

use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::{DriverConnection, ErrorMapper};
use crate::engines::{EngineAdapter, EngineKind};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::translation::SyntaxTranslator;

pub const SQLITE_PROXY_NAME: &str = "sqlite-proxy";

/// Adapter for `SQLite` databases.
pub struct SqliteAdapter {
    dsn: String,
}

impl SqliteAdapter {
    /// `path` is a filesystem path or `:memory:`, optionally followed by
    /// `?key=value` options, e.g. `":memory:?_foreign_keys=on"`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { dsn: path.into() }
    }
}

#[async_trait]
impl EngineAdapter for SqliteAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    async fn open(
        &self,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        #[cfg(feature = "sqlite")]
        {
            use crate::driver::proxy::{ProxyDriver, ProxyHooks};
            use crate::driver::{SqlDriver, registry};

            let hooks = ProxyHooks::new(translator, Arc::new(SqliteErrorMapper));
            registry::register_driver(SQLITE_PROXY_NAME, move || {
                Arc::new(ProxyDriver::new(Arc::new(driver::SqliteDriver), hooks))
                    as Arc<dyn SqlDriver>
            });

            return registry::open_named(SQLITE_PROXY_NAME, &self.dsn)
                .await
                .map_err(|err| match err {
                    config @ SqlGatewayError::Config(_) => config,
                    other => {
                        tracing::debug!(error = %other, "SQLite open failed");
                        SqlGatewayError::ConnectionFailed
                    }
                });
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = translator;
            return Err(SqlGatewayError::Unsupported("sqlite"));
        }
    }

    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }

    fn next_sequence_query(&self, sequence: &str) -> String {
        // SQLite has no sequence objects; the name stands for a
        // pre-existing auto-increment column reference.
        sequence.to_string()
    }
}

/// Stateless mapper handed to the interceptor hooks.
pub(crate) struct SqliteErrorMapper;

impl ErrorMapper for SqliteErrorMapper {
    fn map(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }
}

/// `SQLite` result-code table.
///
/// Extended code 1299 (`SQLITE_CONSTRAINT_NOTNULL`) maps to
/// [`SqlGatewayError::CannotSetNullColumn`] only; `SQLite` has no distinct
/// signal for numeric-precision overflow.
fn map_vendor_error(err: SqlGatewayError) -> SqlGatewayError {
    match err {
        SqlGatewayError::Driver(DriverError::Vendor(VendorError::Sqlite {
            code,
            extended_code,
            message,
        })) => match (code, extended_code) {
            (18, _) => SqlGatewayError::ValueTooLargeForColumn,
            (19, 787 | 1555 | 1811) => SqlGatewayError::IntegrityConstraintViolation,
            (19, 1299) => SqlGatewayError::CannotSetNullColumn,
            (19, 2067) => SqlGatewayError::UniqueConstraintViolation,
            (25, _) => SqlGatewayError::InvalidNumericValue,
            _ => SqlGatewayError::Unhandled {
                backend: EngineKind::Sqlite,
                code: format!("{code}/{extended_code}"),
                message,
            },
        },
        other => other,
    }
}

/// Split a target into the path part and its `?key=value` options.
#[cfg(feature = "sqlite")]
pub(crate) fn parse_dsn(dsn: &str) -> Result<(String, Vec<(String, String)>), SqlGatewayError> {
    let Some((path, options)) = dsn.split_once('?') else {
        return Ok((dsn.to_string(), Vec::new()));
    };

    let mut parsed = Vec::new();
    for option in options.split('&').filter(|o| !o.is_empty()) {
        let (key, value) = option.split_once('=').ok_or_else(|| {
            SqlGatewayError::Config(format!("malformed SQLite option {option:?}"))
        })?;
        parsed.push((key.to_string(), value.to_string()));
    }
    Ok((path.to_string(), parsed))
}
