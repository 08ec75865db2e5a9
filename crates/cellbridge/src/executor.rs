//! Runs one statement batch: every unit but the last silently, the last interactively.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::{
    classify::{BatchError, Diagnostic},
    config::SessionConfig,
    host::{ContextHost, HostFault, StatementBatch},
    interp::{ExecMode, Interp},
    io::OutputSink,
    namespace::Namespace,
    parse::{SourceFile, parse_units},
    splitter::clean_batch,
};

/// The single result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The batch ran to the end. Visible output was already streamed, so the text is
    /// normally empty.
    Finished(String),
    /// The batch stopped at a failure; the text is its diagnostic.
    Failed(String),
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Finished(text) | Self::Failed(text) => text,
        }
    }
}

/// Borrowed session state a batch runs against.
pub(crate) struct BatchExecutor<'a> {
    pub globals: &'a mut Namespace,
    pub host: &'a mut dyn ContextHost,
    pub out: &'a mut dyn OutputSink,
    pub config: &'a SessionConfig,
}

impl BatchExecutor<'_> {
    pub fn execute(&mut self, batch: &StatementBatch) -> ExecutionOutcome {
        let Some(cleaned) = clean_batch(&batch.statements) else {
            debug!(job_group = %batch.job_group, "empty batch");
            return ExecutionOutcome::Finished(String::new());
        };
        let rejected = self.tag_job_group(&batch.job_group);
        match self.run(&cleaned, &batch.job_group) {
            Ok(()) => ExecutionOutcome::Finished(String::new()),
            Err(error) => {
                let mut text = Diagnostic::classify(&error).text;
                if let Some(fault) = rejected {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&format!("note: job group '{}' was rejected: {fault}", batch.job_group));
                }
                ExecutionOutcome::Failed(text)
            }
        }
    }

    /// Associates the job group with the session. A rejection never fails the batch.
    fn tag_job_group(&mut self, job_group: &str) -> Option<HostFault> {
        match self.host.set_job_group(job_group) {
            Ok(()) => None,
            Err(fault) => {
                warn!(job_group, %fault, "host rejected job group");
                Some(fault)
            }
        }
    }

    fn run(&mut self, cleaned: &str, job_group: &str) -> Result<(), BatchError> {
        let source = Rc::new(SourceFile::new(&self.config.script_name, cleaned));
        let units = parse_units(&source).map_err(|err| BatchError::Parse(err.into_exception(&source)))?;
        debug!(job_group, units = units.len(), "running batch");
        let Some((tail, head)) = units.split_last() else {
            return Ok(());
        };

        let mut interp = Interp::new(self.globals, self.host, self.out, self.config, Rc::clone(&source));
        for unit in head {
            interp.run_unit(unit, ExecMode::Statement).map_err(BatchError::Runtime)?;
        }
        interp.run_unit(tail, ExecMode::Interactive).map_err(BatchError::Runtime)
    }
}
