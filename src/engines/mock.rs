//! In-process test double.
//!
//! The adapter is constructed with an "initialize successfully" flag and
//! pre-programmed with expected statements. Each expectation is matched by
//! exact statement text plus optional bound arguments and is consumed
//! exactly once; calls with no matching expectation fail. Unlike the real
//! backends the mock does not use the process-wide driver registry — each
//! instance owns its private expectation state — but its connections are
//! wrapped with the same interceptor hooks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::driver::proxy::{ProxyConnection, ProxyHooks};
use crate::driver::{DriverConnection, DriverStatement, ErrorMapper};
use crate::engines::{EngineAdapter, EngineKind};
use crate::error::{DriverError, SqlGatewayError};
use crate::translation::SyntaxTranslator;
use crate::values::{ResultSet, SqlRow, SqlValue};

/// Adapter for the in-process test double.
pub struct MockAdapter {
    init_ok: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// `init_ok = false` makes every `open` fail with
    /// [`SqlGatewayError::ConnectionFailed`].
    #[must_use]
    pub fn new(init_ok: bool) -> Self {
        Self {
            init_ok,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn patch_begin(&self, result: Result<(), SqlGatewayError>) {
        self.push(Expectation {
            op: MockOp::Begin,
            statement: None,
            args: None,
            outcome: result.map(|()| MockOutcome::Done),
        });
    }

    pub fn patch_commit(&self, result: Result<(), SqlGatewayError>) {
        self.push(Expectation {
            op: MockOp::Commit,
            statement: None,
            args: None,
            outcome: result.map(|()| MockOutcome::Done),
        });
    }

    pub fn patch_rollback(&self, result: Result<(), SqlGatewayError>) {
        self.push(Expectation {
            op: MockOp::Rollback,
            statement: None,
            args: None,
            outcome: result.map(|()| MockOutcome::Done),
        });
    }

    /// Expect `statement` via Exec, with any arguments.
    pub fn patch_exec(&self, statement: &str, result: Result<u64, SqlGatewayError>) {
        self.push(Expectation {
            op: MockOp::Exec,
            statement: Some(statement.to_string()),
            args: None,
            outcome: result.map(MockOutcome::RowsAffected),
        });
    }

    /// Expect `statement` via Exec with exactly these arguments.
    pub fn patch_exec_with_args(
        &self,
        statement: &str,
        args: Vec<SqlValue>,
        result: Result<u64, SqlGatewayError>,
    ) {
        self.push(Expectation {
            op: MockOp::Exec,
            statement: Some(statement.to_string()),
            args: Some(args),
            outcome: result.map(MockOutcome::RowsAffected),
        });
    }

    /// Expect `statement` via Query, with any arguments.
    pub fn patch_query(&self, statement: &str, result: Result<ResultSet, SqlGatewayError>) {
        self.push(Expectation {
            op: MockOp::Query,
            statement: Some(statement.to_string()),
            args: None,
            outcome: result.map(MockOutcome::Rows),
        });
    }

    /// Expect `statement` via Query with exactly these arguments.
    pub fn patch_query_with_args(
        &self,
        statement: &str,
        args: Vec<SqlValue>,
        result: Result<ResultSet, SqlGatewayError>,
    ) {
        self.push(Expectation {
            op: MockOp::Query,
            statement: Some(statement.to_string()),
            args: Some(args),
            outcome: result.map(MockOutcome::Rows),
        });
    }

    /// Convenience: expect `statement` via Query and return one row.
    pub fn patch_query_row(&self, statement: &str, columns: &[&str], values: Vec<SqlValue>) {
        self.patch_query(statement, Ok(Self::rows(columns, vec![values])));
    }

    /// Build a [`ResultSet`] for query patches.
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> ResultSet {
        let column_names = Arc::new(
            columns
                .iter()
                .map(|c| (*c).to_string())
                .collect::<Vec<_>>(),
        );
        let mut result_set = ResultSet::with_capacity(rows.len());
        for values in rows {
            result_set.add_row(SqlRow::new(Arc::clone(&column_names), values));
        }
        result_set
    }

    /// Number of patched expectations not yet consumed.
    #[must_use]
    pub fn remaining_expectations(&self) -> usize {
        lock_state(&self.state).expectations.len()
    }

    fn push(&self, expectation: Expectation) {
        lock_state(&self.state).expectations.push(expectation);
    }
}

#[async_trait]
impl EngineAdapter for MockAdapter {
    fn kind(&self) -> EngineKind {
        EngineKind::Mock
    }

    async fn open(
        &self,
        translator: Arc<dyn SyntaxTranslator>,
    ) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        if !self.init_ok {
            return Err(SqlGatewayError::ConnectionFailed);
        }
        let hooks = ProxyHooks::new(translator, Arc::new(MockErrorMapper));
        Ok(ProxyConnection::wrap(
            Box::new(MockConnection {
                state: Arc::clone(&self.state),
            }),
            hooks,
        ))
    }

    fn map_error(&self, err: SqlGatewayError) -> SqlGatewayError {
        err
    }

    fn next_sequence_query(&self, sequence: &str) -> String {
        sequence.to_string()
    }
}

struct MockErrorMapper;

impl ErrorMapper for MockErrorMapper {
    fn map(&self, err: SqlGatewayError) -> SqlGatewayError {
        err
    }
}

#[derive(Default)]
struct MockState {
    expectations: Vec<Expectation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockOp {
    Begin,
    Commit,
    Rollback,
    Exec,
    Query,
}

struct Expectation {
    op: MockOp,
    statement: Option<String>,
    args: Option<Vec<SqlValue>>,
    outcome: Result<MockOutcome, SqlGatewayError>,
}

enum MockOutcome {
    Done,
    RowsAffected(u64),
    Rows(ResultSet),
}

fn lock_state(state: &Arc<Mutex<MockState>>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn consume(
    state: &Arc<Mutex<MockState>>,
    op: MockOp,
    statement: Option<&str>,
    args: &[SqlValue],
) -> Result<MockOutcome, SqlGatewayError> {
    let mut guard = lock_state(state);
    let position = guard.expectations.iter().position(|e| {
        e.op == op
            && e.statement.as_deref() == statement
            && e.args.as_ref().is_none_or(|expected| expected == args)
    });
    match position {
        Some(idx) => guard.expectations.remove(idx).outcome,
        None => Err(SqlGatewayError::Driver(DriverError::Execution(format!(
            "unexpected {op:?} call: {}",
            statement.unwrap_or("<none>")
        )))),
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        match consume(&self.state, MockOp::Exec, Some(sql), params)? {
            MockOutcome::RowsAffected(count) => Ok(count),
            _ => Ok(0),
        }
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        match consume(&self.state, MockOp::Query, Some(sql), params)? {
            MockOutcome::Rows(rows) => Ok(rows),
            _ => Ok(ResultSet::default()),
        }
    }

    async fn prepare(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        Ok(Box::new(MockStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_string(),
        }))
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        consume(&self.state, MockOp::Begin, None, &[]).map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        consume(&self.state, MockOp::Commit, None, &[]).map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        consume(&self.state, MockOp::Rollback, None, &[]).map(|_| ())
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        Ok(())
    }
}

struct MockStatement {
    state: Arc<Mutex<MockState>>,
    sql: String,
}

#[async_trait]
impl DriverStatement for MockStatement {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        match consume(&self.state, MockOp::Exec, Some(self.sql.as_str()), params)? {
            MockOutcome::RowsAffected(count) => Ok(count),
            _ => Ok(0),
        }
    }

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        match consume(&self.state, MockOp::Query, Some(self.sql.as_str()), params)? {
            MockOutcome::Rows(rows) => Ok(rows),
            _ => Ok(ResultSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::NoopTranslator;

    #[tokio::test]
    async fn failing_adapter_refuses_to_open() {
        let adapter = MockAdapter::new(false);
        let Err(err) = adapter.open(Arc::new(NoopTranslator)).await else {
            panic!("open must fail");
        };
        assert!(matches!(err, SqlGatewayError::ConnectionFailed));
    }

    #[tokio::test]
    async fn patched_statement_is_consumed_exactly_once() {
        let adapter = MockAdapter::new(true);
        adapter.patch_exec("DELETE FROM t", Ok(2));
        let mut conn = adapter
            .open(Arc::new(NoopTranslator))
            .await
            .expect("open");

        assert_eq!(conn.execute("DELETE FROM t", &[]).await.expect("exec"), 2);
        assert!(conn.execute("DELETE FROM t", &[]).await.is_err());
        assert_eq!(adapter.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn argument_mismatch_is_an_unexpected_call() {
        let adapter = MockAdapter::new(true);
        adapter.patch_exec_with_args(
            "UPDATE t SET a = :1",
            vec![SqlValue::Int(1)],
            Ok(1),
        );
        let mut conn = adapter
            .open(Arc::new(NoopTranslator))
            .await
            .expect("open");

        let err = conn
            .execute("UPDATE t SET a = :1", &[SqlValue::Int(2)])
            .await
            .expect_err("wrong args must fail");
        assert!(matches!(err, SqlGatewayError::Driver(_)));
    }
}
