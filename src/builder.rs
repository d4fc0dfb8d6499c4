//! Assembles a [`SqlClient`] from an engine adapter and an optional
//! translator.

use std::sync::Arc;

use crate::client::SqlClient;
use crate::engines::EngineAdapter;
use crate::translation::{NoopTranslator, SyntaxTranslator};

/// Builder for [`SqlClient`]. The translator defaults to the no-op one, the
/// right choice for same-dialect configurations and test doubles.
/// Observability is ambient: install a `tracing` subscriber to see the
/// interceptor's statement traces.
pub struct SqlClientBuilder {
    adapter: Arc<dyn EngineAdapter>,
    translator: Arc<dyn SyntaxTranslator>,
}

impl SqlClientBuilder {
    #[must_use]
    pub fn new(adapter: Arc<dyn EngineAdapter>) -> Self {
        Self {
            adapter,
            translator: Arc::new(NoopTranslator),
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn SyntaxTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Build a client in the Closed state; call [`SqlClient::open`] next.
    #[must_use]
    pub fn build(self) -> SqlClient {
        SqlClient::new(self.adapter, self.translator)
    }
}
