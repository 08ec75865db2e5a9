//! Tests for the request loop: ordering of results, summary counters and how transport
//! failures end the loop.

use std::collections::VecDeque;

use cellbridge::{
    Bridge, CollectOutput, CompletionRequest, HostChannel, HostRequest, MemoryContextHost, ServeSummary, Session,
    SessionConfig, StatementBatch, TransportError,
};
use pretty_assertions::assert_eq;

/// What the loop reported back, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reported {
    Outcome { text: String, is_error: bool },
    Completion { serialized: String, is_error: bool },
}

/// A channel replaying a fixed script of requests.
#[derive(Debug, Default)]
struct ScriptedChannel {
    requests: VecDeque<Result<HostRequest, String>>,
    reported: Vec<Reported>,
    fetched: usize,
}

impl ScriptedChannel {
    fn new(requests: impl IntoIterator<Item = HostRequest>) -> Self {
        Self {
            requests: requests.into_iter().map(Ok).collect(),
            ..Self::default()
        }
    }
}

impl HostChannel for ScriptedChannel {
    fn next_request(&mut self) -> Result<Option<HostRequest>, TransportError> {
        match self.requests.pop_front() {
            Some(Ok(request)) => {
                self.fetched += 1;
                Ok(Some(request))
            }
            Some(Err(message)) => Err(TransportError::Protocol(message)),
            None => Ok(None),
        }
    }

    fn report_outcome(&mut self, text: &str, is_error: bool) -> Result<(), TransportError> {
        self.reported.push(Reported::Outcome {
            text: text.to_owned(),
            is_error,
        });
        Ok(())
    }

    fn report_completion(&mut self, serialized: &str, is_error: bool) -> Result<(), TransportError> {
        self.reported.push(Reported::Completion {
            serialized: serialized.to_owned(),
            is_error,
        });
        Ok(())
    }
}

fn execute(code: &str) -> HostRequest {
    HostRequest::Execute(StatementBatch::new(code, "job"))
}

fn bridge(channel: ScriptedChannel) -> (Bridge<ScriptedChannel>, CollectOutput) {
    let output = CollectOutput::new();
    let session = Session::new(
        SessionConfig::default(),
        Box::new(MemoryContextHost::new()),
        Box::new(output.clone()),
    );
    (Bridge::new(channel, session), output)
}

// =============================================================================
// Serving
// =============================================================================

/// Every request gets exactly one report, in request order.
#[test]
fn each_request_is_answered_in_order() {
    let channel = ScriptedChannel::new([
        execute("x = 40"),
        HostRequest::Complete(CompletionRequest::new("")),
        execute("x + 2"),
    ]);
    let (mut bridge, output) = bridge(channel);
    let summary = bridge.serve().unwrap();

    assert_eq!(
        summary,
        ServeSummary {
            batches: 2,
            completions: 1,
            failures: 0,
        }
    );
    assert_eq!(
        bridge.channel().reported,
        vec![
            Reported::Outcome {
                text: String::new(),
                is_error: false
            },
            Reported::Completion {
                serialized: r#"["x","z"]"#.to_owned(),
                is_error: false
            },
            Reported::Outcome {
                text: String::new(),
                is_error: false
            },
        ]
    );
    assert_eq!(output.take(), "42\n");
}

/// A failed batch is reported and the loop keeps serving.
#[test]
fn failures_do_not_stop_the_loop() {
    let channel = ScriptedChannel::new([execute("1 / 0"), execute("print('after')")]);
    let (mut bridge, output) = bridge(channel);
    let summary = bridge.serve().unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failures, 1);
    let reported = &bridge.channel().reported;
    let Reported::Outcome { text, is_error } = &reported[0] else {
        panic!("expected an outcome, got {reported:?}");
    };
    assert!(is_error);
    assert!(text.ends_with("ZeroDivisionError: division by zero\n"), "{text}");
    assert_eq!(
        reported[1],
        Reported::Outcome {
            text: String::new(),
            is_error: false
        }
    );
    assert_eq!(output.take(), "after\n");
}

/// An empty completion result is sent as an empty string and is not an error.
#[test]
fn empty_completion_is_sent_as_empty_string() {
    let output = CollectOutput::new();
    let session = Session::new(
        SessionConfig::default().with_context_name("_z"),
        Box::new(MemoryContextHost::new()),
        Box::new(output),
    );
    let mut bridge = Bridge::new(
        ScriptedChannel::new([HostRequest::Complete(CompletionRequest::default())]),
        session,
    );
    bridge.serve().unwrap();
    assert_eq!(
        bridge.channel().reported,
        vec![Reported::Completion {
            serialized: String::new(),
            is_error: false
        }]
    );
}

/// The session's state stays reachable after serving.
#[test]
fn session_state_outlives_the_loop() {
    let (mut bridge, _) = bridge(ScriptedChannel::new([execute("answer = 6 * 7")]));
    bridge.serve().unwrap();
    assert_eq!(bridge.session().variable_repr("answer"), Some("42".to_owned()));
    assert_eq!(bridge.summary().batches, 1);
}

// =============================================================================
// Transport failures
// =============================================================================

/// A transport failure ends the loop with an error; later requests are never fetched.
#[test]
fn transport_error_ends_serve() {
    let mut channel = ScriptedChannel::new([execute("x = 1")]);
    channel.requests.push_back(Err("garbled frame".to_owned()));
    channel.requests.push_back(Ok(execute("y = 2")));
    let (mut bridge, _) = bridge(channel);

    let err = bridge.serve().unwrap_err();
    assert!(matches!(&err, TransportError::Protocol(message) if message == "garbled frame"));
    assert_eq!(err.to_string(), "protocol error: garbled frame");
    assert_eq!(bridge.channel().fetched, 1);
    assert_eq!(bridge.channel().requests.len(), 1);
    assert!(bridge.session().namespace().contains("x"));
    assert!(!bridge.session().namespace().contains("y"));
}

/// A host that closes immediately yields an empty summary.
#[test]
fn closed_channel_serves_nothing() {
    let (mut bridge, _) = bridge(ScriptedChannel::default());
    assert_eq!(bridge.serve().unwrap(), ServeSummary::default());
    assert!(bridge.channel().reported.is_empty());
}
