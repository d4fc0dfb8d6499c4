//! `SQLite` driver: a dedicated worker thread owns the synchronous
//! `rusqlite` connection and serves commands over a channel, keeping the
//! async runtime unblocked.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use async_trait::async_trait;
use rusqlite::Connection as RusqliteConnection;
use rusqlite::types::{Value, ValueRef};
use tokio::sync::oneshot;

use crate::driver::{DriverConnection, DriverStatement, SqlDriver};
use crate::error::{DriverError, SqlGatewayError, VendorError};
use crate::values::{ResultSet, SqlRow, SqlValue};

pub(crate) struct SqliteDriver;

#[async_trait]
impl SqlDriver for SqliteDriver {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        let (path, options) = super::parse_dsn(dsn)?;
        let worker = SqliteWorker::spawn(path, options)?;
        Ok(Box::new(SqliteConnection {
            worker: Arc::new(worker),
        }))
    }
}

struct SqliteConnection {
    worker: Arc<SqliteWorker>,
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        self.worker.batch("SELECT 1;".to_string()).await
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        self.worker
            .execute(sql.to_string(), convert_params(params))
            .await
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        self.worker
            .query(sql.to_string(), convert_params(params))
            .await
    }

    async fn prepare(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        let sql = Arc::new(sql.to_string());
        self.worker.prepare(Arc::clone(&sql)).await?;
        Ok(Box::new(SqliteStatement {
            worker: Arc::clone(&self.worker),
            sql,
        }))
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        self.worker.batch("BEGIN".to_string()).await
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        self.worker.batch("COMMIT".to_string()).await
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        self.worker.batch("ROLLBACK".to_string()).await
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        self.worker.send_command(Command::Shutdown)
    }
}

struct SqliteStatement {
    worker: Arc<SqliteWorker>,
    sql: Arc<String>,
}

#[async_trait]
impl DriverStatement for SqliteStatement {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        self.worker
            .execute(self.sql.as_ref().clone(), convert_params(params))
            .await
    }

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        self.worker
            .query(self.sql.as_ref().clone(), convert_params(params))
            .await
    }
}

struct SqliteWorker {
    sender: Sender<Command>,
}

impl SqliteWorker {
    fn spawn(
        path: String,
        options: Vec<(String, String)>,
    ) -> Result<Self, SqlGatewayError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), SqlGatewayError>>();
        thread::Builder::new()
            .name("sqlite-worker".to_string())
            .spawn(move || {
                let conn = match open_connection(&path, &options) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                run_worker(&conn, &receiver);
            })
            .map_err(|err| {
                SqlGatewayError::Driver(DriverError::Connection(format!(
                    "failed to spawn SQLite worker thread: {err}"
                )))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { sender }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(SqlGatewayError::Driver(DriverError::Connection(
                "SQLite worker exited during startup".to_string(),
            ))),
        }
    }

    fn send_command(&self, command: Command) -> Result<(), SqlGatewayError> {
        self.sender.send(command).map_err(|_| {
            SqlGatewayError::Driver(DriverError::Connection("SQLite worker closed".to_string()))
        })
    }

    async fn execute(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<u64, SqlGatewayError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Execute {
            sql,
            params,
            respond_to: tx,
        })?;
        rx.await.map_err(|_| worker_dropped("executing statement"))?
    }

    async fn query(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<ResultSet, SqlGatewayError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Query {
            sql,
            params,
            respond_to: tx,
        })?;
        rx.await.map_err(|_| worker_dropped("running query"))?
    }

    async fn batch(&self, sql: String) -> Result<(), SqlGatewayError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Batch {
            sql,
            respond_to: tx,
        })?;
        rx.await.map_err(|_| worker_dropped("running batch"))?
    }

    async fn prepare(&self, sql: Arc<String>) -> Result<(), SqlGatewayError> {
        let (tx, rx) = oneshot::channel();
        self.send_command(Command::Prepare {
            sql,
            respond_to: tx,
        })?;
        rx.await
            .map_err(|_| worker_dropped("preparing statement"))?
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn worker_dropped(during: &str) -> SqlGatewayError {
    SqlGatewayError::Driver(DriverError::Connection(format!(
        "SQLite worker dropped while {during}"
    )))
}

enum Command {
    Execute {
        sql: String,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<u64, SqlGatewayError>>,
    },
    Query {
        sql: String,
        params: Vec<Value>,
        respond_to: oneshot::Sender<Result<ResultSet, SqlGatewayError>>,
    },
    Batch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), SqlGatewayError>>,
    },
    Prepare {
        sql: Arc<String>,
        respond_to: oneshot::Sender<Result<(), SqlGatewayError>>,
    },
    Shutdown,
}

fn run_worker(conn: &RusqliteConnection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(execute(conn, &sql, params));
            }
            Command::Query {
                sql,
                params,
                respond_to,
            } => {
                let _ = respond_to.send(query(conn, &sql, params));
            }
            Command::Batch { sql, respond_to } => {
                let _ = respond_to.send(conn.execute_batch(&sql).map_err(convert_error));
            }
            Command::Prepare { sql, respond_to } => {
                let outcome = conn
                    .prepare_cached(&sql)
                    .map(|_| ())
                    .map_err(convert_error);
                let _ = respond_to.send(outcome);
            }
            Command::Shutdown => break,
        }
    }
}

fn open_connection(
    path: &str,
    options: &[(String, String)],
) -> Result<RusqliteConnection, SqlGatewayError> {
    let conn = RusqliteConnection::open(path).map_err(convert_error)?;
    for (key, value) in options {
        match key.as_str() {
            "_foreign_keys" => {
                let enabled = matches!(value.as_str(), "on" | "true" | "1");
                conn.pragma_update(None, "foreign_keys", enabled)
                    .map_err(convert_error)?;
            }
            "_busy_timeout" => {
                let millis: i64 = value.parse().map_err(|_| {
                    SqlGatewayError::Config(format!("invalid _busy_timeout value {value:?}"))
                })?;
                conn.pragma_update(None, "busy_timeout", millis)
                    .map_err(convert_error)?;
            }
            other => {
                return Err(SqlGatewayError::Config(format!(
                    "unknown SQLite option {other:?}"
                )));
            }
        }
    }
    Ok(conn)
}

fn execute(
    conn: &RusqliteConnection,
    sql: &str,
    params: Vec<Value>,
) -> Result<u64, SqlGatewayError> {
    let mut stmt = conn.prepare_cached(sql).map_err(convert_error)?;
    let count = stmt
        .execute(rusqlite::params_from_iter(params))
        .map_err(convert_error)?;
    Ok(count as u64)
}

fn query(
    conn: &RusqliteConnection,
    sql: &str,
    params: Vec<Value>,
) -> Result<ResultSet, SqlGatewayError> {
    let mut stmt = conn.prepare_cached(sql).map_err(convert_error)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| (*name).to_string())
        .collect();
    let column_names = Arc::new(column_names);

    let mut rows = stmt
        .query(rusqlite::params_from_iter(params))
        .map_err(convert_error)?;
    let mut result_set = ResultSet::default();
    while let Some(row) = rows.next().map_err(convert_error)? {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            values.push(extract_value(row, idx)?);
        }
        result_set.add_row(SqlRow::new(Arc::clone(&column_names), values));
    }
    Ok(result_set)
}

fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<SqlValue, SqlGatewayError> {
    let value = row.get_ref(idx).map_err(convert_error)?;
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

fn convert_params(params: &[SqlValue]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Int(i) => Value::Integer(*i),
            SqlValue::Float(f) => Value::Real(*f),
            SqlValue::Text(s) => Value::Text(s.clone()),
            SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
            SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
            SqlValue::Null => Value::Null,
            SqlValue::Json(j) => Value::Text(j.to_string()),
            SqlValue::Blob(b) => Value::Blob(b.clone()),
        })
        .collect()
}

fn convert_error(err: rusqlite::Error) -> SqlGatewayError {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, message) => {
            let extended = ffi_err.extended_code;
            SqlGatewayError::vendor(VendorError::Sqlite {
                code: extended & 0xff,
                extended_code: extended,
                message: message.unwrap_or_else(|| ffi_err.to_string()),
            })
        }
        other => SqlGatewayError::Driver(DriverError::Execution(other.to_string())),
    }
}
