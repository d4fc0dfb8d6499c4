//! PostgreSQL driver glue over `tokio-postgres`.
//!
//! Connection specs cannot be serialized into a plain string once TLS
//! material is involved, so the adapter registers the spec in a
//! process-wide table and hands the driver an opaque key as the DSN.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::config::SslMode;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls, Socket, Statement};
use tokio_util::bytes;

use super::PostgresTls;
use crate::driver::{DriverConnection, DriverStatement, SqlDriver};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::values::{ResultSet, SqlRow, SqlValue};

pub(crate) struct PgConnectSpec {
    pub config: tokio_postgres::Config,
    pub tls: Option<PostgresTls>,
}

static CONN_SPECS: LazyLock<Mutex<HashMap<String, PgConnectSpec>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(0);

/// Store a spec and return the opaque key the driver resolves at connect
/// time. Each key is consumed by exactly one connect attempt.
pub(crate) fn register_conn_spec(spec: PgConnectSpec) -> String {
    let key = format!("postgres-conn-{}", NEXT_SPEC_ID.fetch_add(1, Ordering::Relaxed));
    CONN_SPECS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.clone(), spec);
    key
}

fn take_conn_spec(key: &str) -> Option<PgConnectSpec> {
    CONN_SPECS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
}

pub(crate) fn parse_ssl_mode(mode: &str) -> Result<SslMode, SqlGatewayError> {
    match mode {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(SqlGatewayError::Config(format!(
            "unsupported sslmode {other:?}"
        ))),
    }
}

pub(crate) struct PgDriver;

#[async_trait]
impl SqlDriver for PgDriver {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        let spec = take_conn_spec(dsn).ok_or_else(|| {
            SqlGatewayError::Driver(DriverError::Connection(format!(
                "unknown postgres connection key {dsn:?}"
            )))
        })?;

        let client = match &spec.tls {
            None => connect_with(&spec.config, NoTls).await?,
            Some(tls) => {
                let connector = super::tls::make_connector(tls)?;
                connect_with(&spec.config, connector).await?
            }
        };
        Ok(Box::new(PgConnection { client }))
    }
}

async fn connect_with<T>(
    config: &tokio_postgres::Config,
    tls: T,
) -> Result<Arc<Client>, SqlGatewayError>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client, connection) = config.connect(tls).await.map_err(convert_error)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(error = %err, "postgres connection task ended");
        }
    });
    Ok(Arc::new(client))
}

struct PgConnection {
    client: Arc<Client>,
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        self.client
            .simple_query("")
            .await
            .map(|_| ())
            .map_err(convert_error)
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        let refs = param_refs(params);
        self.client
            .execute(sql, &refs)
            .await
            .map_err(convert_error)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        let stmt = self.client.prepare(sql).await.map_err(convert_error)?;
        run_query(&self.client, &stmt, params).await
    }

    async fn prepare(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        let stmt = self.client.prepare(sql).await.map_err(convert_error)?;
        Ok(Box::new(PgPreparedStatement {
            client: Arc::clone(&self.client),
            stmt,
        }))
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(convert_error)
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(convert_error)
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(convert_error)
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        // tokio-postgres has no explicit close; the connection task ends
        // when the last Client handle drops.
        Ok(())
    }
}

struct PgPreparedStatement {
    client: Arc<Client>,
    stmt: Statement,
}

#[async_trait]
impl DriverStatement for PgPreparedStatement {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        let refs = param_refs(params);
        self.client
            .execute(&self.stmt, &refs)
            .await
            .map_err(convert_error)
    }

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        run_query(&self.client, &self.stmt, params).await
    }
}

async fn run_query(
    client: &Client,
    stmt: &Statement,
    params: &[SqlValue],
) -> Result<ResultSet, SqlGatewayError> {
    let refs = param_refs(params);
    let rows = client.query(stmt, &refs).await.map_err(convert_error)?;

    let column_names: Arc<Vec<String>> = Arc::new(
        stmt.columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
    );
    let mut result_set = ResultSet::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            values.push(extract_value(&row, idx)?);
        }
        result_set.add_row(SqlRow::new(Arc::clone(&column_names), values));
    }
    Ok(result_set)
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Int(i) => (*i).to_sql(ty, out),
            SqlValue::Float(f) => (*f).to_sql(ty, out),
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Bool(b) => (*b).to_sql(ty, out),
            SqlValue::Timestamp(dt) => dt.to_sql(ty, out),
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Json(j) => j.to_sql(ty, out),
            SqlValue::Blob(b) => b.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::CHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

fn extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue, SqlGatewayError> {
    let type_name = row.columns()[idx].type_().name().to_string();
    let value = match type_name.as_str() {
        "int2" | "int4" | "int8" => {
            let val: Option<i64> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Int)
        }
        "float4" | "float8" => {
            let val: Option<f64> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Bool)
        }
        "timestamp" | "timestamptz" => {
            let val: Option<NaiveDateTime> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Timestamp)
        }
        "json" | "jsonb" => {
            let val: Option<JsonValue> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Json)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Blob)
        }
        _ => {
            let val: Option<String> = row.try_get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Text)
        }
    };
    Ok(value)
}

fn convert_error(err: tokio_postgres::Error) -> SqlGatewayError {
    if let Some(db) = err.as_db_error() {
        return SqlGatewayError::vendor(VendorError::Postgres {
            sqlstate: db.code().code().to_string(),
            message: db.message().to_string(),
        });
    }
    if err.is_closed() {
        SqlGatewayError::Driver(DriverError::Connection(err.to_string()))
    } else {
        SqlGatewayError::Driver(DriverError::Execution(err.to_string()))
    }
}
