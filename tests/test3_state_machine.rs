use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sql_gateway::driver::{DriverConnection, DriverStatement};
use sql_gateway::prelude::*;

#[tokio::test]
async fn is_open_on_a_never_opened_client_reports_uninitialized() {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    let err = client.is_open().await.expect_err("must fail");
    assert!(matches!(err, SqlGatewayError::DbNotInitialized));
}

#[tokio::test]
async fn close_on_a_never_opened_client_reports_uninitialized() {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    let err = client.close().await.expect_err("must fail");
    assert!(matches!(err, SqlGatewayError::DbNotInitialized));
}

#[tokio::test]
async fn close_is_not_idempotent() -> Result<(), SqlGatewayError> {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    client.open().await?;
    client.close().await?;

    let err = client.close().await.expect_err("second close must fail");
    assert!(matches!(err, SqlGatewayError::DbNotInitialized));
    Ok(())
}

#[tokio::test]
async fn a_closed_client_can_be_reopened() -> Result<(), SqlGatewayError> {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    client.open().await?;
    client.close().await?;
    client.open().await?;
    client.is_open().await?;
    client.close().await
}

#[tokio::test]
async fn statements_fail_fast_when_never_opened() {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    let err = client
        .execute("DELETE FROM t", &[])
        .await
        .expect_err("must fail");
    assert!(matches!(err, SqlGatewayError::DbNotInitialized));
}

#[tokio::test]
async fn next_sequence_value_requires_an_open_client() {
    let client = SqlClientBuilder::new(Arc::new(MockAdapter::new(true))).build();
    let err = client
        .next_sequence_value("CUSTOMERS_SEQ")
        .await
        .expect_err("must fail");
    assert!(matches!(err, SqlGatewayError::ConnectionClosed));
}

/// Connection whose ping fails a configurable number of times, then heals.
struct FlakyConnection {
    failures_left: Arc<AtomicUsize>,
}

#[async_trait]
impl DriverConnection for FlakyConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(SqlGatewayError::Driver(DriverError::Connection(
                "stale handle".to_string(),
            )));
        }
        Ok(())
    }

    async fn execute(&mut self, _sql: &str, _params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        Ok(0)
    }

    async fn query(
        &mut self,
        _sql: &str,
        _params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        Ok(ResultSet::default())
    }

    async fn prepare(
        &mut self,
        _sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        Err(SqlGatewayError::Driver(DriverError::Execution(
            "not supported by this double".to_string(),
        )))
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }
}

/// Adapter double driving the reconnect path: its connections share one
/// ping-failure budget, and `open` can be set to fail after the first call.
struct FlakyAdapter {
    ping_failures: Arc<AtomicUsize>,
    opens: AtomicUsize,
    reopen_fails: bool,
}

impl FlakyAdapter {
    fn new(ping_failures: usize, reopen_fails: bool) -> Self {
        Self {
            ping_failures: Arc::new(AtomicUsize::new(ping_failures)),
            opens: AtomicUsize::new(0),
            reopen_fails,
        }
    }
}

#[async_trait]
impl EngineAdapter for FlakyAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Mock
    }

    async fn open(
        &self,
        _translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        let opens = self.opens.fetch_add(1, Ordering::SeqCst);
        if self.reopen_fails && opens > 0 {
            return Err(SqlGatewayError::ConnectionFailed);
        }
        Ok(Box::new(FlakyConnection {
            failures_left: Arc::clone(&self.ping_failures),
        }))
    }

    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError {
        err
    }

    fn next_sequence_query(&self, sequence: &str) -> String {
        sequence.to_string()
    }
}

#[tokio::test]
async fn a_stale_handle_is_replaced_transparently() -> Result<(), SqlGatewayError> {
    let adapter = Arc::new(FlakyAdapter::new(1, false));
    let client = SqlClientBuilder::new(Arc::clone(&adapter) as Arc<dyn EngineAdapter>).build();
    client.open().await?;

    // First probe fails, the facade reopens, and the second probe passes.
    client.is_open().await?;
    assert_eq!(adapter.opens.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn a_failed_reopen_leaves_the_client_closed() -> Result<(), SqlGatewayError> {
    let adapter = Arc::new(FlakyAdapter::new(usize::MAX, true));
    let client = SqlClientBuilder::new(Arc::clone(&adapter) as Arc<dyn EngineAdapter>).build();
    client.open().await?;

    let err = client.is_open().await.expect_err("reopen must fail");
    assert!(matches!(err, SqlGatewayError::ConnectionFailed));

    // The stale handle was released; the client is Closed now.
    let err = client.is_open().await.expect_err("client must be closed");
    assert!(matches!(err, SqlGatewayError::DbNotInitialized));
    Ok(())
}

#[tokio::test]
async fn statements_run_the_reconnect_path_first() -> Result<(), SqlGatewayError> {
    let adapter = Arc::new(FlakyAdapter::new(1, false));
    let client = SqlClientBuilder::new(Arc::clone(&adapter) as Arc<dyn EngineAdapter>).build();
    client.open().await?;

    // The stale first handle is replaced before the statement is issued.
    client.execute("DELETE FROM t", &[]).await?;
    assert_eq!(adapter.opens.load(Ordering::SeqCst), 2);
    Ok(())
}
