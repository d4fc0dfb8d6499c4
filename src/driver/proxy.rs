//! Driver-level interceptor.
//!
//! [`ProxyDriver`] wraps a backend driver so that every statement passes
//! through the syntax translator and the adapter's error mapper, with trace
//! output for each hook point, without any change at the call sites.
//! Translation always happens before the statement reaches the backend; the
//! elapsed time in the trace line spans from immediately after translation
//! to immediately after the backend call returns, including failed calls.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::driver::{DriverConnection, DriverStatement, ErrorMapper, SqlDriver};
use crate::error::SqlGatewayError;
use crate::translation::SyntaxTranslator;
use crate::values::{ResultSet, SqlValue};

/// The hook bundle injected around a backend driver: one translator and one
/// error mapper, fixed when the proxy is registered.
#[derive(Clone)]
pub struct ProxyHooks {
    translator: Arc<dyn SyntaxTranslator>,
    mapper: Arc<dyn ErrorMapper>,
}

impl ProxyHooks {
    #[must_use]
    pub fn new(translator: Arc<dyn SyntaxTranslator>, mapper: Arc<dyn ErrorMapper>) -> Self {
        Self { translator, mapper }
    }

    fn map(&self, err: SqlGatewayError) -> SqlGatewayError {
        self.mapper.map(err)
    }
}

/// A named proxy driver delegating to a real driver through the hooks.
pub struct ProxyDriver {
    inner: Arc<dyn SqlDriver>,
    hooks: ProxyHooks,
}

impl ProxyDriver {
    #[must_use]
    pub fn new(inner: Arc<dyn SqlDriver>, hooks: ProxyHooks) -> Self {
        Self { inner, hooks }
    }
}

#[async_trait]
impl SqlDriver for ProxyDriver {
    async fn connect(&self, dsn: &str) -> Result<Box<dyn DriverConnection>, SqlGatewayError> {
        match self.inner.connect(dsn).await {
            Ok(conn) => {
                debug!("Open conn");
                Ok(ProxyConnection::wrap(conn, self.hooks.clone()))
            }
            Err(err) => Err(self.hooks.map(err)),
        }
    }
}

/// A connection whose statements run through the hooks.
pub struct ProxyConnection {
    inner: Box<dyn DriverConnection>,
    hooks: ProxyHooks,
}

impl ProxyConnection {
    /// Wrap an already-open backend connection. Used by the proxy driver
    /// itself and by the mock adapter, which bypasses the registry.
    #[must_use]
    pub fn wrap(inner: Box<dyn DriverConnection>, hooks: ProxyHooks) -> Box<dyn DriverConnection> {
        Box::new(Self { inner, hooks })
    }
}

#[async_trait]
impl DriverConnection for ProxyConnection {
    async fn ping(&mut self) -> Result<(), SqlGatewayError> {
        // Not a hook point: probe errors are handled by the facade's
        // reconnect protocol, untranslated.
        self.inner.ping().await
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, SqlGatewayError> {
        let translated = self.hooks.translator.translate(sql);
        let started = Instant::now();
        let result = self.inner.execute(&translated, params).await;
        let elapsed = started.elapsed();
        trace!(
            "Exec: {}; args = {:?} ({:?})",
            pretty_query(&translated),
            params,
            elapsed
        );
        result.map_err(|err| self.hooks.map(err))
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ResultSet, SqlGatewayError> {
        let translated = self.hooks.translator.translate(sql);
        let started = Instant::now();
        let result = self.inner.query(&translated, params).await;
        let elapsed = started.elapsed();
        trace!(
            "Query: {}; args = {:?} ({:?})",
            pretty_query(&translated),
            params,
            elapsed
        );
        result.map_err(|err| self.hooks.map(err))
    }

    async fn prepare(
        &mut self,
        sql: &str,
    ) -> Result<Box<dyn DriverStatement>, SqlGatewayError> {
        // Statement text is fixed here; later calls only route errors.
        let translated = self.hooks.translator.translate(sql);
        match self.inner.prepare(&translated).await {
            Ok(stmt) => Ok(Box::new(ProxyStatement {
                inner: stmt,
                sql: translated.into_owned(),
                hooks: self.hooks.clone(),
            })),
            Err(err) => Err(self.hooks.map(err)),
        }
    }

    async fn begin(&mut self) -> Result<(), SqlGatewayError> {
        debug!("Begin");
        self.inner.begin().await.map_err(|err| self.hooks.map(err))
    }

    async fn commit(&mut self) -> Result<(), SqlGatewayError> {
        debug!("Commit");
        self.inner.commit().await.map_err(|err| self.hooks.map(err))
    }

    async fn rollback(&mut self) -> Result<(), SqlGatewayError> {
        debug!("Rollback");
        self.inner
            .rollback()
            .await
            .map_err(|err| self.hooks.map(err))
    }

    async fn close(&mut self) -> Result<(), SqlGatewayError> {
        debug!("Close conn");
        self.inner.close().await.map_err(|err| self.hooks.map(err))
    }
}

struct ProxyStatement {
    inner: Box<dyn DriverStatement>,
    sql: String,
    hooks: ProxyHooks,
}

#[async_trait]
impl DriverStatement for ProxyStatement {
    async fn execute(&mut self, params: &[SqlValue]) -> Result<u64, SqlGatewayError> {
        let started = Instant::now();
        let result = self.inner.execute(params).await;
        let elapsed = started.elapsed();
        trace!(
            "Exec: {}; args = {:?} ({:?})",
            pretty_query(&self.sql),
            params,
            elapsed
        );
        result.map_err(|err| self.hooks.map(err))
    }

    async fn query(&mut self, params: &[SqlValue]) -> Result<ResultSet, SqlGatewayError> {
        let started = Instant::now();
        let result = self.inner.query(params).await;
        let elapsed = started.elapsed();
        trace!(
            "Query: {}; args = {:?} ({:?})",
            pretty_query(&self.sql),
            params,
            elapsed
        );
        result.map_err(|err| self.hooks.map(err))
    }
}

/// Normalize a statement for trace output: strip tabs and newlines so the
/// whole statement lands on one line.
fn pretty_query(query: &str) -> String {
    query.replace('\t', "").replace('\n', "")
}
