//! The client facade applications hold.
//!
//! A [`SqlClient`] owns exactly one underlying connection handle. The
//! open/probe/reconnect transition runs atomically under the client's
//! connection lock, so concurrent callers cannot race to reopen.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::warn;

use crate::driver::{DriverConnection, DriverStatement};
use crate::engines::{EngineAdapter, EngineKind};
use crate::error::{DriverError, SqlGatewayError};
use crate::translation::SyntaxTranslator;
use crate::values::{ResultSet, SqlRow, SqlValue};

/// Budget for the liveness probe issued before each statement.
pub const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Budget for the probe issued against a freshly reopened handle.
pub const RECONNECT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Vendor-neutral SQL client. Built by [`crate::builder::SqlClientBuilder`];
/// starts Closed and can always be reopened.
///
/// The probe timeouts above are fixed and not overridable per call; they
/// deliberately do not inherit any caller deadline.
pub struct SqlClient {
    adapter: Arc<dyn EngineAdapter>,
    translator: Arc<dyn SyntaxTranslator>,
    conn: Mutex<Option<Box<dyn DriverConnection>>>,
}

impl SqlClient {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn EngineAdapter>,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Self {
        Self {
            adapter,
            translator,
            conn: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EngineKind {
        self.adapter.kind()
    }

    /// Open the underlying connection through the adapter (which registers
    /// the driver interceptor if needed). On failure the client stays
    /// Closed; no partially-initialized handle is kept.
    pub async fn open(&self) -> Result<(), SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        let handle = self
            .adapter
            .open(Arc::clone(&self.translator))
            .await
            .map_err(|err| self.adapter.map_error(err))?;
        *guard = Some(handle);
        Ok(())
    }

    /// Liveness check with a single transparent reconnect attempt.
    ///
    /// Fails with [`SqlGatewayError::DbNotInitialized`] if the client was
    /// never opened. Otherwise probes the live handle; on probe failure the
    /// stale handle is closed, the adapter reopens, and a second,
    /// shorter-budget probe against the new handle decides the outcome.
    pub async fn is_open(&self) -> Result<(), SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        self.ensure_live(&mut guard).await
    }

    /// Close the connection. The internal handle is cleared even when the
    /// backend reports an error, which is still returned to the caller.
    pub async fn close(&self) -> Result<(), SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        let mut handle = guard.take().ok_or(SqlGatewayError::DbNotInitialized)?;
        handle
            .close()
            .await
            .map_err(|err| self.adapter.map_error(err))
    }

    /// Run a DML/DDL statement. The liveness/reconnect check runs first;
    /// translation and tracing happen inside the interceptor.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        self.ensure_live(&mut guard).await?;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .execute(sql, params)
            .await
            .map_err(|err| self.adapter.map_error(err))
    }

    /// Run a query, returning rows in backend order.
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        self.ensure_live(&mut guard).await?;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .query(sql, params)
            .await
            .map_err(|err| self.adapter.map_error(err))
    }

    /// Run a query and return its first row, if any.
    pub async fn query_row(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<SqlRow>, SqlGatewayError> {
        let result_set = self.query(sql, params).await?;
        Ok(result_set.rows.into_iter().next())
    }

    /// Prepare a statement. The text is translated and fixed now; later
    /// calls on the returned statement route only errors through the
    /// adapter.
    pub async fn prepare(&self, sql: &str) -> Result<PreparedStatement, SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        self.ensure_live(&mut guard).await?;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        let stmt = handle
            .prepare(sql)
            .await
            .map_err(|err| self.adapter.map_error(err))?;
        Ok(PreparedStatement {
            stmt,
            adapter: Arc::clone(&self.adapter),
        })
    }

    /// Begin a transaction. Fails if the liveness check fails. Statements
    /// on the returned transaction skip the liveness check: a reconnect in
    /// the middle of a transaction would silently discard it.
    pub async fn begin_transaction(&self) -> Result<SqlTransaction<'_>, SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        self.ensure_live(&mut guard).await?;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .begin()
            .await
            .map_err(|err| self.adapter.map_error(err))?;
        Ok(SqlTransaction {
            client: self,
            finished: false,
        })
    }

    /// Fetch the next value of a named sequence using the adapter's
    /// dialect. Fails with [`SqlGatewayError::ConnectionClosed`] when the
    /// client is not usable and with [`SqlGatewayError::NextValueFailed`]
    /// when the result cannot be read as an integer; the latter is a
    /// client-side scan failure and is intentionally not routed through
    /// the vendor mapping.
    pub async fn next_sequence_value(&self, sequence: &str) -> Result<i64, SqlGatewayError> {
        let mut guard = self.conn.lock().await;
        if self.ensure_live(&mut guard).await.is_err() {
            return Err(SqlGatewayError::ConnectionClosed);
        }
        let query = self.adapter.next_sequence_query(sequence);
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        let Ok(result_set) = handle.query(&query, &[]).await else {
            return Err(SqlGatewayError::NextValueFailed);
        };
        match result_set.rows.first().and_then(|row| row.get_by_index(0)) {
            Some(SqlValue::Int(value)) => Ok(*value),
            _ => Err(SqlGatewayError::NextValueFailed),
        }
    }

    /// Closed -> DbNotInitialized; Open -> probe; stale -> close, reopen,
    /// probe again on the shorter budget. Runs entirely under the
    /// connection lock held by the caller.
    async fn ensure_live(
        &self,
        conn: &mut Option<Box<dyn DriverConnection>>,
    ) -> Result<(), SqlGatewayError> {
        let Some(handle) = conn.as_mut() else {
            return Err(SqlGatewayError::DbNotInitialized);
        };
        let healthy = matches!(
            timeout(LIVENESS_PROBE_TIMEOUT, handle.ping()).await,
            Ok(Ok(()))
        );
        if healthy {
            return Ok(());
        }

        if let Some(mut stale) = conn.take() {
            let _ = stale.close().await;
        }
        let mut fresh = self
            .adapter
            .open(Arc::clone(&self.translator))
            .await
            .map_err(|err| self.adapter.map_error(err))?;
        let outcome = match timeout(RECONNECT_PROBE_TIMEOUT, fresh.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(self.adapter.map_error(err)),
            Err(_) => Err(SqlGatewayError::Driver(DriverError::Connection(
                "liveness probe timed out".to_string(),
            ))),
        };
        *conn = Some(fresh);
        outcome
    }
}

/// A statement whose text was fixed (and translated) at prepare time.
pub struct PreparedStatement {
    stmt: Box<dyn DriverStatement>,
    adapter: Arc<dyn EngineAdapter>,
}

impl PreparedStatement {
    pub async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        self.stmt
            .execute(params)
            .await
            .map_err(|err| self.adapter.map_error(err))
    }

    pub async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        self.stmt
            .query(params)
            .await
            .map_err(|err| self.adapter.map_error(err))
    }

    pub async fn query_row(
        &mut self,
        params: &[SqlValue],
    ) -> Result<Option<SqlRow>, SqlGatewayError> {
        let result_set = self.query(params).await?;
        Ok(result_set.rows.into_iter().next())
    }
}

/// A transaction scoped to one client. Must be finished explicitly with
/// [`SqlTransaction::commit`] or [`SqlTransaction::rollback`]; dropping an
/// unfinished transaction only logs a warning, since an async rollback
/// cannot run in `drop`.
pub struct SqlTransaction<'a> {
    client: &'a SqlClient,
    finished: bool,
}

impl SqlTransaction<'_> {
    pub async fn execute(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        let mut guard = self.client.conn.lock().await;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .execute(sql, params)
            .await
            .map_err(|err| self.client.adapter.map_error(err))
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        let mut guard = self.client.conn.lock().await;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .query(sql, params)
            .await
            .map_err(|err| self.client.adapter.map_error(err))
    }

    pub async fn commit(mut self) -> Result<(), SqlGatewayError> {
        self.finished = true;
        let mut guard = self.client.conn.lock().await;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .commit()
            .await
            .map_err(|err| self.client.adapter.map_error(err))
    }

    pub async fn rollback(mut self) -> Result<(), SqlGatewayError> {
        self.finished = true;
        let mut guard = self.client.conn.lock().await;
        let handle = guard.as_mut().ok_or(SqlGatewayError::ConnectionClosed)?;
        handle
            .rollback()
            .await
            .map_err(|err| self.client.adapter.map_error(err))
    }
}

impl Drop for SqlTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("transaction dropped without commit or rollback");
        }
    }
}
