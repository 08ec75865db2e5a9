use std::rc::Rc;

use crate::{
    completion::{CompletionEngine, CompletionResult},
    config::SessionConfig,
    executor::{BatchExecutor, ExecutionOutcome},
    host::{CompletionRequest, ContextHost, StatementBatch},
    io::OutputSink,
    namespace::Namespace,
    value::Value,
};

/// A long-lived interactive session.
///
/// Owns the global namespace that every batch mutates in place, the host's context store
/// and the sink visible output is streamed to. Batches and completions are served one at
/// a time through `&mut self`.
pub struct Session {
    namespace: Namespace,
    host: Box<dyn ContextHost>,
    output: Box<dyn OutputSink>,
    config: SessionConfig,
}

impl Session {
    /// Creates a session with the context object bound under `config.context_name`.
    #[must_use]
    pub fn new(config: SessionConfig, host: Box<dyn ContextHost>, output: Box<dyn OutputSink>) -> Self {
        let mut namespace = Namespace::default();
        namespace.set(Rc::from(config.context_name.as_str()), Value::Context);
        Self {
            namespace,
            host,
            output,
            config,
        }
    }

    /// Runs a batch against the session namespace.
    pub fn execute(&mut self, batch: &StatementBatch) -> ExecutionOutcome {
        BatchExecutor {
            globals: &mut self.namespace,
            host: &mut *self.host,
            out: &mut *self.output,
            config: &self.config,
        }
        .execute(batch)
    }

    /// Computes completion candidates. Never fails; unresolvable prefixes only lose their
    /// attribute candidates.
    pub fn complete(&mut self, request: &CompletionRequest) -> CompletionResult {
        CompletionEngine {
            globals: &mut self.namespace,
            host: &mut *self.host,
            config: &self.config,
        }
        .complete(request)
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// `repr()` of a global, without running user `__repr__` methods.
    #[must_use]
    pub fn variable_repr(&self, name: &str) -> Option<String> {
        self.namespace.get(name).map(Value::py_repr)
    }
}
