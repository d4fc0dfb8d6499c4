//! Oracle driver glue over the synchronous `oracle` crate.
//!
//! Calls run under `spawn_blocking` with the connection behind a mutex, so
//! the async runtime is never blocked on OCI round-trips. Outside an
//! explicit transaction the connection runs with autocommit on, matching
//! the other backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use oracle::Connection as OracleNativeConnection;
use oracle::sql_type::{OracleType, ToSql};

use crate::driver::{DriverConnection, DriverStatement, SqlDriver};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::values::{ResultSet, SqlRow, SqlValue};

pub(crate) struct OracleConnectSpec {
    pub connect_string: String,
    pub user: String,
    pub password: String,
}

static CONN_SPECS: LazyLock<Mutex<HashMap<String, OracleConnectSpec>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));
static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn register_conn_spec(spec: OracleConnectSpec) -> String {
    let key = format!("oracle-conn-{}", NEXT_SPEC_ID.fetch_add(1, Ordering::Relaxed));
    CONN_SPECS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.clone(), spec);
    key
}

fn take_conn_spec(key: &str) -> Option<OracleConnectSpec> {
    CONN_SPECS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
}

pub(crate) struct OracleDriver;

#[async_trait]
impl SqlDriver for OracleDriver {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        let spec = take_conn_spec(dsn).ok_or_else(|| {
            SqlGatewayError::Driver(DriverError::Connection(format!(
                "unknown oracle connection key {dsn:?}"
            )))
        })?;

        let conn = run_blocking(move || {
            let mut conn =
                OracleNativeConnection::connect(&spec.user, &spec.password, &spec.connect_string)
                    .map_err(convert_error)?;
            conn.set_autocommit(true);
            Ok(conn)
        })
        .await?;

        Ok(Box::new(OracleConnection {
            conn: Arc::new(Mutex::new(conn)),
        }))
    }
}

struct OracleConnection {
    conn: Arc<Mutex<OracleNativeConnection>>,
}

fn lock_conn(
    conn: &Arc<Mutex<OracleNativeConnection>>,
) -> MutexGuard<'_, OracleNativeConnection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_blocking<T, F>(func: F) -> Result<T, SqlGatewayError>
where
    F: FnOnce() -> Result<T, SqlGatewayError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(func).await.map_err(|err| {
        SqlGatewayError::Driver(DriverError::Connection(format!(
            "oracle worker task failed: {err}"
        )))
    })?
}

#[async_trait]
impl DriverConnection for OracleConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || lock_conn(&conn).ping().map_err(convert_error)).await
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(move || execute(&lock_conn(&conn), &sql, &params)).await
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        run_blocking(move || query(&lock_conn(&conn), &sql, &params)).await
    }

    async fn prepare(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let validated = run_blocking(move || {
            lock_conn(&conn)
                .statement(&sql)
                .build()
                .map(|_| sql)
                .map_err(convert_error)
        })
        .await?;
        Ok(Box::new(OracleStatement {
            conn: Arc::clone(&self.conn),
            sql: validated,
        }))
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            lock_conn(&conn).set_autocommit(false);
            Ok(())
        })
        .await
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let mut guard = lock_conn(&conn);
            let result = guard.commit().map_err(convert_error);
            guard.set_autocommit(true);
            result
        })
        .await
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || {
            let mut guard = lock_conn(&conn);
            let result = guard.rollback().map_err(convert_error);
            guard.set_autocommit(true);
            result
        })
        .await
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || lock_conn(&conn).close().map_err(convert_error)).await
    }
}

struct OracleStatement {
    conn: Arc<Mutex<OracleNativeConnection>>,
    sql: String,
}

#[async_trait]
impl DriverStatement for OracleStatement {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        let sql = self.sql.clone();
        let params = params.to_vec();
        run_blocking(move || execute(&lock_conn(&conn), &sql, &params)).await
    }

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        let conn = Arc::clone(&self.conn);
        let sql = self.sql.clone();
        let params = params.to_vec();
        run_blocking(move || query(&lock_conn(&conn), &sql, &params)).await
    }
}

fn execute(
    conn: &OracleNativeConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, SqlGatewayError> {
    let boxed = convert_params(params);
    let refs: Vec<&dyn ToSql> = boxed.iter().map(AsRef::as_ref).collect();
    let stmt = conn.execute(sql, &refs).map_err(convert_error)?;
    stmt.row_count().map_err(convert_error)
}

fn query(
    conn: &OracleNativeConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<ResultSet, SqlGatewayError> {
    let boxed = convert_params(params);
    let refs: Vec<&dyn ToSql> = boxed.iter().map(AsRef::as_ref).collect();
    let rows = conn.query(sql, &refs).map_err(convert_error)?;

    let column_info: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|info| info.oracle_type().clone())
        .collect();
    let column_names: Arc<Vec<String>> = Arc::new(
        rows.column_info()
            .iter()
            .map(|info| info.name().to_string())
            .collect(),
    );

    let mut result_set = ResultSet::default();
    for row in rows {
        let row = row.map_err(convert_error)?;
        let mut values = Vec::with_capacity(column_names.len());
        for (idx, oratype) in column_info.iter().enumerate() {
            values.push(extract_value(&row, idx, oratype)?);
        }
        result_set.add_row(SqlRow::new(Arc::clone(&column_names), values));
    }
    Ok(result_set)
}

fn convert_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql> {
            match p {
                SqlValue::Int(i) => Box::new(*i),
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bool(b) => Box::new(i64::from(*b)),
                SqlValue::Timestamp(dt) => Box::new(*dt),
                SqlValue::Null => Box::new(None::<String>),
                SqlValue::Json(j) => Box::new(j.to_string()),
                SqlValue::Blob(b) => Box::new(b.clone()),
            }
        })
        .collect()
}

fn extract_value(
    row: &oracle::Row,
    idx: usize,
    oratype: &OracleType,
) -> Result<SqlValue, SqlGatewayError> {
    let value = match oratype {
        OracleType::Number(_, 0) | OracleType::Int64 | OracleType::UInt64 => {
            let val: Option<i64> = row.get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Int)
        }
        OracleType::Number(..)
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble => {
            let val: Option<f64> = row.get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Float)
        }
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => {
            let val: Option<NaiveDateTime> = row.get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Timestamp)
        }
        OracleType::Raw(_) | OracleType::BLOB => {
            let val: Option<Vec<u8>> = row.get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Blob)
        }
        _ => {
            let val: Option<String> = row.get(idx).map_err(convert_error)?;
            val.map_or(SqlValue::Null, SqlValue::Text)
        }
    };
    Ok(value)
}

fn convert_error(err: oracle::Error) -> SqlGatewayError {
    match err.db_error() {
        Some(db) => SqlGatewayError::vendor(VendorError::Oracle {
            code: db.code(),
            message: db.message().to_string(),
        }),
        None => SqlGatewayError::Driver(DriverError::Execution(err.to_string())),
    }
}
