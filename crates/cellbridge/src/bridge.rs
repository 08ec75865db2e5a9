//! The request loop between a host channel and a session.

use tracing::debug;

use crate::{
    host::{HostChannel, HostRequest, TransportError},
    session::Session,
};

/// Counters for the requests a bridge has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub batches: usize,
    pub completions: usize,
    /// Batches that ended in a failure.
    pub failures: usize,
}

/// Serves host requests against one session until the host closes the channel.
///
/// A failed batch is reported and the loop moves on; only a transport failure ends it early.
pub struct Bridge<C: HostChannel> {
    channel: C,
    session: Session,
    summary: ServeSummary,
}

impl<C: HostChannel> Bridge<C> {
    #[must_use]
    pub fn new(channel: C, session: Session) -> Self {
        Self {
            channel,
            session,
            summary: ServeSummary::default(),
        }
    }

    pub fn serve(&mut self) -> Result<ServeSummary, TransportError> {
        while let Some(request) = self.channel.next_request()? {
            self.handle(request)?;
        }
        debug!(summary = ?self.summary, "host closed the channel");
        Ok(self.summary)
    }

    /// Handles one request and reports its result on the channel.
    pub fn handle(&mut self, request: HostRequest) -> Result<(), TransportError> {
        match request {
            HostRequest::Execute(batch) => {
                let outcome = self.session.execute(&batch);
                self.summary.batches += 1;
                if outcome.is_error() {
                    self.summary.failures += 1;
                }
                self.channel.report_outcome(outcome.text(), outcome.is_error())
            }
            HostRequest::Complete(request) => {
                let result = self.session.complete(&request);
                self.summary.completions += 1;
                self.channel.report_completion(&result.to_wire(), false)
            }
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    #[must_use]
    pub fn summary(&self) -> ServeSummary {
        self.summary
    }
}
