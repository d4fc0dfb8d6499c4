//! PostgreSQL engine adapter.

#[cfg(feature = "postgres")]
mod driver;
#[cfg(feature = "postgres")]
mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::{DriverConnection, ErrorMapper};
use crate::engines::{EngineAdapter, EngineKind};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::translation::SyntaxTranslator;

pub const POSTGRES_PROXY_NAME: &str = "postgres-proxy";

/// Optional TLS material, passed through to the driver layer.
///
/// PEM blobs are carried inline (not as file paths) so configuration can be
/// sourced from a secret store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostgresTls {
    /// Expected server name, overriding the connection host during
    /// certificate verification.
    pub server_name: Option<String>,
    /// Skip certificate verification entirely.
    pub allow_insecure: bool,
    /// PEM-encoded server CA certificate.
    pub server_ca_pem: Option<String>,
    /// PEM-encoded client certificate; requires `client_key_pem`.
    pub client_cert_pem: Option<String>,
    /// PEM-encoded client key; requires `client_cert_pem`.
    pub client_key_pem: Option<String>,
}

/// Adapter for PostgreSQL databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresAdapter {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    ssl_mode: String,
    tls: Option<PostgresTls>,
}

impl PostgresAdapter {
    /// Plain connection with `sslmode=disable`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ssl_mode: "disable".to_string(),
            tls: None,
        }
    }

    /// Enable TLS with the given mode and material. The PEM blobs are
    /// validated eagerly so a bad bundle fails here rather than at `open`.
    ///
    /// # Errors
    /// [`SqlGatewayError::Config`] when the material is incomplete or does
    /// not parse.
    pub fn with_tls(
        mut self,
        ssl_mode: impl Into<String>,
        tls: PostgresTls,
    ) -> Result<Self, SqlGatewayError> {
        if tls.client_cert_pem.is_some() != tls.client_key_pem.is_some() {
            return Err(SqlGatewayError::Config(
                "client certificate and client key must both be provided".to_string(),
            ));
        }
        #[cfg(feature = "postgres")]
        tls::validate(&tls)?;

        self.ssl_mode = ssl_mode.into();
        self.tls = Some(tls);
        Ok(self)
    }
}

#[async_trait]
impl EngineAdapter for PostgresAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    async fn open(
        &self,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        #[cfg(feature = "postgres")]
        {
            use crate::driver::proxy::{ProxyDriver, ProxyHooks};
            use crate::driver::{SqlDriver, registry};

            let mut config = tokio_postgres::Config::new();
            config
                .host(&self.host)
                .port(self.port)
                .user(&self.user)
                .password(&self.password)
                .dbname(&self.database)
                .ssl_mode(driver::parse_ssl_mode(&self.ssl_mode)?);

            let hooks = ProxyHooks::new(translator, Arc::new(PostgresErrorMapper));
            registry::register_driver(POSTGRES_PROXY_NAME, move || {
                Arc::new(ProxyDriver::new(Arc::new(driver::PgDriver), hooks))
                    as Arc<dyn SqlDriver>
            });

            let key = driver::register_conn_spec(driver::PgConnectSpec {
                config,
                tls: self.tls.clone(),
            });
            return registry::open_named(POSTGRES_PROXY_NAME, &key)
                .await
                .map_err(|err| match err {
                    config @ SqlGatewayError::Config(_) => config,
                    other => {
                        tracing::debug!(error = %other, "postgres open failed");
                        SqlGatewayError::ConnectionFailed
                    }
                });
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = translator;
            return Err(SqlGatewayError::Unsupported("postgres"));
        }
    }

    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }

    fn next_sequence_query(&self, sequence: &str) -> String {
        format!("SELECT nextval('{}')", sequence.to_lowercase())
    }
}

pub(crate) struct PostgresErrorMapper;

impl ErrorMapper for PostgresErrorMapper {
    fn map(&self, err: SqlGatewayError) -> SqlGatewayError {
        map_vendor_error(err)
    }
}

/// SQLSTATE table.
fn map_vendor_error(err: SqlGatewayError) -> SqlGatewayError {
    match err {
        SqlGatewayError::Driver(DriverError::Vendor(VendorError::Postgres {
            sqlstate,
            message,
        })) => match sqlstate.as_str() {
            "23505" => SqlGatewayError::UniqueConstraintViolation,
            "23503" => SqlGatewayError::IntegrityConstraintViolation,
            "22001" => SqlGatewayError::ValueTooLargeForColumn,
            "22003" => SqlGatewayError::ValueLargerThanPrecision,
            "23502" => SqlGatewayError::CannotSetNullColumn,
            "22P02" => SqlGatewayError::InvalidNumericValue,
            "21000" => SqlGatewayError::SubqueryReturnsMoreThanOneRow,
            _ => SqlGatewayError::Unhandled {
                backend: EngineKind::Postgres,
                code: sqlstate,
                message,
            },
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg_vendor(sqlstate: &str) -> SqlGatewayError {
        SqlGatewayError::vendor(VendorError::Postgres {
            sqlstate: sqlstate.to_string(),
            message: "server said no".to_string(),
        })
    }

    fn adapter() -> PostgresAdapter {
        PostgresAdapter::new("localhost", 5432, "app", "secret", "appdb")
    }

    #[test]
    fn maps_the_documented_sqlstates() {
        let cases = [
            ("23505", SqlGatewayError::UniqueConstraintViolation),
            ("23503", SqlGatewayError::IntegrityConstraintViolation),
            ("22001", SqlGatewayError::ValueTooLargeForColumn),
            ("22003", SqlGatewayError::ValueLargerThanPrecision),
            ("23502", SqlGatewayError::CannotSetNullColumn),
            ("22P02", SqlGatewayError::InvalidNumericValue),
            ("21000", SqlGatewayError::SubqueryReturnsMoreThanOneRow),
        ];
        let adapter = adapter();
        for (sqlstate, want) in cases {
            let got = adapter.map_error(pg_vendor(sqlstate));
            assert_eq!(
                std::mem::discriminant(&got),
                std::mem::discriminant(&want),
                "unexpected mapping for SQLSTATE {sqlstate}: {got:?}"
            );
        }
    }

    #[test]
    fn unknown_sqlstates_become_unhandled() {
        let got = adapter().map_error(pg_vendor("40001"));
        match got {
            SqlGatewayError::Unhandled {
                backend,
                code,
                message,
            } => {
                assert_eq!(backend, EngineKind::Postgres);
                assert_eq!(code, "40001");
                assert_eq!(message, "server said no");
            }
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }

    #[test]
    fn non_vendor_errors_pass_through() {
        let got = adapter().map_error(SqlGatewayError::Driver(DriverError::Connection(
            "connection reset".to_string(),
        )));
        assert!(matches!(
            got,
            SqlGatewayError::Driver(DriverError::Connection(_))
        ));
    }

    #[test]
    fn sequence_query_lowercases_the_name() {
        assert_eq!(
            adapter().next_sequence_query("CUSTOMERS_SEQ"),
            "SELECT nextval('customers_seq')"
        );
    }

    #[test]
    fn tls_requires_a_complete_client_pair() {
        let err = adapter()
            .with_tls(
                "require",
                PostgresTls {
                    client_cert_pem: Some("cert".to_string()),
                    ..PostgresTls::default()
                },
            )
            .expect_err("must fail");
        assert!(matches!(err, SqlGatewayError::Config(_)));
    }
}
