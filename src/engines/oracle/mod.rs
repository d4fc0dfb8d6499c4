//! Oracle engine adapter.
//!
//! The adapter type, descriptor builder, and error table compile
//! unconditionally so the mapping stays testable everywhere; the actual
//! driver requires the `oracle` cargo feature.

#[cfg(feature = "oracle")]
mod driver;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::{DriverConnection, ErrorMapper};
use crate::engines::{EngineAdapter, EngineKind};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::translation::SyntaxTranslator;

pub const ORACLE_PROXY_NAME: &str = "oracle-proxy";

/// Adapter for Oracle databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAdapter {
    connect_string: String,
    user: String,
    password: String,
}

impl OracleAdapter {
    /// Connect via a full TCP descriptor built from host, port, and the
    /// `CONNECT_DATA` body (e.g. `SERVICE_NAME=orcl` or `SID=orcl`).
    pub fn new(
        host: impl AsRef<str>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl AsRef<str>,
    ) -> Self {
        Self {
            connect_string: format!(
                "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=({})))",
                host.as_ref(),
                port,
                database.as_ref()
            ),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Connect via a named alias resolved by the client's TNS
    /// configuration.
    pub fn new_tns(
        tns_name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            connect_string: tns_name.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn connect_string(&self) -> &str {
        &self.connect_string
    }
}

#[async_trait]
impl EngineAdapter for OracleAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Oracle
    }

    async fn open(
        &self,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        #[cfg(feature = "oracle")]
        {
            use crate::driver::proxy::{ProxyDriver, ProxyHooks};
            use crate::driver::{SqlDriver, registry};

            let hooks = ProxyHooks::new(translator, Arc::new(OracleErrorMapper));
            registry::register_driver(ORACLE_PROXY_NAME, move || {
                Arc::new(ProxyDriver::new(Arc::new(driver::OracleDriver), hooks))
                    as Arc<dyn SqlDriver>
            });

            let key = driver::register_conn_spec(driver::OracleConnectSpec {
                connect_string: self.connect_string.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
            });
            return registry::open_named(ORACLE_PROXY_NAME, &key)
                .await
                .map_err(|err| {
                    tracing::debug!(error = %err, "oracle open failed");
                    SqlGatewayError::ConnectionFailed
                });
        }
        #[cfg(not(feature = "oracle"))]
        {
            let _ = translator;
            return Err(SqlGatewayError::Unsupported("oracle"));
        }
    }

    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }

    fn next_sequence_query(&self, sequence: &str) -> String {
        format!("SELECT {sequence}.NEXTVAL FROM DUAL")
    }
}

pub(crate) struct OracleErrorMapper;

impl ErrorMapper for OracleErrorMapper {
    fn map(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }
}

/// ORA code table.
fn map_vendor_error(err: SqlGatewayError) -> SqlGatewayError {
    match err {
        SqlGatewayError::Driver(DriverError::Vendor(VendorError::Oracle { code, message })) => {
            match code {
                1 => SqlGatewayError::UniqueConstraintViolation,
                2291 | 2292 => SqlGatewayError::IntegrityConstraintViolation,
                12899 => SqlGatewayError::ValueTooLargeForColumn,
                1438 => SqlGatewayError::ValueLargerThanPrecision,
                1400 | 1407 => SqlGatewayError::CannotSetNullColumn,
                1722 => SqlGatewayError::InvalidNumericValue,
                1427 => SqlGatewayError::SubqueryReturnsMoreThanOneRow,
                _ => SqlGatewayError::Unhandled {
                    backend: EngineKind::Oracle,
                    code: format!("ORA-{code:05}"),
                    message,
                },
            }
        }
        other => other,
    }
}
