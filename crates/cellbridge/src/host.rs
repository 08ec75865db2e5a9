//! The seams between a session and the host process that drives it.
//!
//! [`HostChannel`] is how requests arrive and results leave; [`ContextHost`] is the
//! shared-variable store and widget surface behind the session context object.

use std::{fmt, io};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Representation of values crossing into the host's shared store and widgets.
pub type HostValue = serde_json::Value;

/// One batch of statements delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBatch {
    /// Raw batch text; may contain blank lines and comment lines.
    pub statements: String,
    /// Opaque tag the host uses to group the work a batch triggers.
    #[serde(default)]
    pub job_group: String,
}

impl StatementBatch {
    #[must_use]
    pub fn new(statements: impl Into<String>, job_group: impl Into<String>) -> Self {
        Self {
            statements: statements.into(),
            job_group: job_group.into(),
        }
    }

    /// Builds a batch from separate lines, joined with `\n`.
    #[must_use]
    pub fn from_lines<S: AsRef<str>>(lines: &[S], job_group: impl Into<String>) -> Self {
        let statements = lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
        Self::new(statements, job_group)
    }
}

/// A request for completion candidates. `text` is the partial expression before the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()) }
    }
}

/// A request fetched from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    Execute(StatementBatch),
    Complete(CompletionRequest),
}

/// Failure of the channel itself, as opposed to a failure of the code it carries.
#[derive(Debug)]
pub enum TransportError {
    Io(io::Error),
    /// The peer sent something that is not a valid request.
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "transport I/O error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol(_) => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// The request/response surface of the host.
///
/// Requests are processed strictly one at a time: a result is reported before the next
/// request is fetched.
pub trait HostChannel {
    /// Blocks until the next request arrives. `Ok(None)` means the host closed the channel.
    fn next_request(&mut self) -> Result<Option<HostRequest>, TransportError>;

    /// Reports the outcome of the last `Execute` request.
    fn report_outcome(&mut self, text: &str, is_error: bool) -> Result<(), TransportError>;

    /// Reports the result of the last `Complete` request.
    fn report_completion(&mut self, serialized: &str, is_error: bool) -> Result<(), TransportError>;
}

/// A failure reported by the host runtime while serving a context call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFault {
    pub message: String,
    /// Host-side stack trace, when the host has one.
    pub host_trace: Option<String>,
}

impl HostFault {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            host_trace: None,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, host_trace: impl Into<String>) -> Self {
        self.host_trace = Some(host_trace.into());
        self
    }
}

impl fmt::Display for HostFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(trace) = &self.host_trace {
            write!(f, "\n{trace}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HostFault {}

/// A selectable option of a `select` or `checkbox` widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamOption {
    pub value: HostValue,
    pub label: String,
}

/// The host's shared-variable store and input widgets, reached through the session context.
pub trait ContextHost {
    /// Reads a shared variable; `Ok(None)` when the key is not set.
    fn get(&mut self, key: &str) -> Result<Option<HostValue>, HostFault>;

    fn put(&mut self, key: &str, value: HostValue) -> Result<(), HostFault>;

    fn remove(&mut self, key: &str) -> Result<(), HostFault>;

    fn contains(&mut self, key: &str) -> Result<bool, HostFault>;

    /// A free-text input form; returns the current value.
    fn input(&mut self, name: &str, default: &HostValue) -> Result<HostValue, HostFault>;

    /// A single-choice form; returns the selected option value.
    fn select(&mut self, name: &str, options: &[ParamOption], default: &HostValue) -> Result<HostValue, HostFault>;

    /// A multiple-choice form; returns the checked option values.
    fn checkbox(
        &mut self,
        name: &str,
        options: &[ParamOption],
        default_checked: &[HostValue],
    ) -> Result<Vec<HostValue>, HostFault>;

    /// Tags the work triggered by the next batch.
    fn set_job_group(&mut self, job_group: &str) -> Result<(), HostFault>;
}

/// A `ContextHost` keeping shared variables in process.
///
/// Widgets have no user to ask, so they answer with their defaults.
#[derive(Debug, Default)]
pub struct MemoryContextHost {
    values: IndexMap<String, HostValue>,
    job_group: Option<String>,
}

impl MemoryContextHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The job group set by the most recent batch.
    #[must_use]
    pub fn job_group(&self) -> Option<&str> {
        self.job_group.as_deref()
    }

    #[must_use]
    pub fn values(&self) -> &IndexMap<String, HostValue> {
        &self.values
    }
}

impl ContextHost for MemoryContextHost {
    fn get(&mut self, key: &str) -> Result<Option<HostValue>, HostFault> {
        Ok(self.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: HostValue) -> Result<(), HostFault> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), HostFault> {
        self.values.shift_remove(key);
        Ok(())
    }

    fn contains(&mut self, key: &str) -> Result<bool, HostFault> {
        Ok(self.values.contains_key(key))
    }

    fn input(&mut self, _name: &str, default: &HostValue) -> Result<HostValue, HostFault> {
        Ok(default.clone())
    }

    fn select(&mut self, _name: &str, _options: &[ParamOption], default: &HostValue) -> Result<HostValue, HostFault> {
        Ok(default.clone())
    }

    fn checkbox(
        &mut self,
        _name: &str,
        _options: &[ParamOption],
        default_checked: &[HostValue],
    ) -> Result<Vec<HostValue>, HostFault> {
        Ok(default_checked.to_vec())
    }

    fn set_job_group(&mut self, job_group: &str) -> Result<(), HostFault> {
        self.job_group = Some(job_group.to_owned());
        Ok(())
    }
}
