//! Turns batch failures into the diagnostic text reported to the host.

use std::fmt;

use crate::exception::{ExcType, Exception};

/// Marker that starts the interesting part of a host-originated traceback.
const HOST_ERROR_MARKER: &str = "HostRuntimeError:";

/// A failure that ended a batch, split by the stage it happened in.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchError {
    /// The batch did not parse; nothing ran.
    Parse(Exception),
    /// A unit raised while running.
    Runtime(Exception),
}

impl BatchError {
    #[must_use]
    pub fn exception(&self) -> &Exception {
        match self {
            Self::Parse(exc) | Self::Runtime(exc) => exc,
        }
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.exception())
    }
}

impl std::error::Error for BatchError {}

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised by the host runtime behind a context call.
    HostRuntime,
    /// Raised by the session's own code.
    Local,
}

/// The formatted result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub text: String,
    /// Every classified failure ends its batch.
    pub fatal: bool,
}

impl Diagnostic {
    /// Classifies `error` and formats its diagnostic.
    #[must_use]
    pub fn classify(error: &BatchError) -> Self {
        let exc = error.exception();
        let traceback = exc.traceback_text();
        if exc.exc_type() == ExcType::HostRuntimeError {
            Self {
                kind: ErrorKind::HostRuntime,
                text: host_diagnostic(exc, &traceback),
                fatal: true,
            }
        } else {
            Self {
                kind: ErrorKind::Local,
                text: traceback,
                fatal: true,
            }
        }
    }
}

fn host_diagnostic(exc: &Exception, traceback: &str) -> String {
    let start = marker_offset(traceback).unwrap_or(0);
    let mut text = traceback[start..].trim_end_matches('\n').to_owned();
    text.push_str(&format!(
        "\n(<class '{}'>, {}, <traceback with {} frames>)",
        exc.exc_type(),
        exc.py_repr(),
        exc.frames().len()
    ));
    text
}

/// Byte offset of the marker when it starts a line.
fn marker_offset(traceback: &str) -> Option<usize> {
    if traceback.starts_with(HOST_ERROR_MARKER) {
        return Some(0);
    }
    traceback
        .match_indices(&format!("\n{HOST_ERROR_MARKER}"))
        .next()
        .map(|(offset, _)| offset + 1)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::exception::StackFrame;

    #[test]
    fn host_error_drops_leading_traceback() {
        let exc = Exception::new_msg(ExcType::HostRuntimeError, "boom").with_traceback(vec![StackFrame::new(
            "<stdin>",
            1,
            None,
            Some("z.get('a')"),
        )]);
        let diagnostic = Diagnostic::classify(&BatchError::Runtime(exc));
        assert_eq!(diagnostic.kind, ErrorKind::HostRuntime);
        assert_eq!(
            diagnostic.text,
            "HostRuntimeError: boom\n(<class 'HostRuntimeError'>, HostRuntimeError('boom'), <traceback with 1 frames>)"
        );
    }

    #[test]
    fn marker_must_start_a_line() {
        assert_eq!(marker_offset("x HostRuntimeError: no"), None);
        assert_eq!(marker_offset("a\nHostRuntimeError: yes"), Some(2));
    }
}
