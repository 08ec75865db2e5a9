//! Content-Length framed JSON-RPC over stdio.
//!
//! The host sends `execute`, `complete` and `shutdown` requests. Every `execute` and
//! `complete` gets exactly one response carrying `{text, is_error}`; output produced while
//! a batch runs is pushed ahead of it as `output` notifications.

use std::{
    borrow::Cow,
    cell::RefCell,
    io::{self, BufRead, Write},
    rc::Rc,
};

use cellbridge::{CompletionRequest, HostChannel, HostRequest, OutputSink, StatementBatch, TransportError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

/// JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// A `HostChannel` reading requests from `reader` and answering on the shared `writer`.
pub struct StdioChannel<R, W> {
    reader: R,
    writer: Rc<RefCell<W>>,
    /// Id of the request awaiting its response.
    pending: Option<Value>,
}

impl<R: BufRead, W: Write> StdioChannel<R, W> {
    pub fn new(reader: R, writer: Rc<RefCell<W>>) -> Self {
        Self {
            reader,
            writer,
            pending: None,
        }
    }

    fn send(&self, payload: &Value) -> io::Result<()> {
        write_framed_message(&mut *self.writer.borrow_mut(), payload)
    }

    fn respond(&mut self, text: &str, is_error: bool) -> Result<(), TransportError> {
        let Some(id) = self.pending.take() else {
            return Err(TransportError::Protocol("no request is awaiting a response".to_owned()));
        };
        self.send(&success_response(&id, &json!({ "text": text, "is_error": is_error })))?;
        Ok(())
    }

    /// Turns a decoded request into a host request, answering the ones handled here.
    fn dispatch(&mut self, request: RpcRequest) -> io::Result<Dispatch> {
        match request.method.as_str() {
            "execute" => match serde_json::from_value::<StatementBatch>(request.params) {
                Ok(batch) => {
                    self.pending = Some(request.id);
                    Ok(Dispatch::Request(HostRequest::Execute(batch)))
                }
                Err(err) => {
                    self.send(&error_response(&request.id, -32602, &format!("invalid params: {err}")))?;
                    Ok(Dispatch::Skip)
                }
            },
            "complete" => {
                let params = if request.params.is_null() {
                    Ok(CompletionRequest::default())
                } else {
                    serde_json::from_value::<CompletionRequest>(request.params)
                };
                match params {
                    Ok(completion) => {
                        self.pending = Some(request.id);
                        Ok(Dispatch::Request(HostRequest::Complete(completion)))
                    }
                    Err(err) => {
                        self.send(&error_response(&request.id, -32602, &format!("invalid params: {err}")))?;
                        Ok(Dispatch::Skip)
                    }
                }
            }
            "shutdown" => {
                self.send(&success_response(&request.id, &json!({})))?;
                Ok(Dispatch::Shutdown)
            }
            _ => {
                self.send(&error_response(&request.id, -32601, "method not found"))?;
                Ok(Dispatch::Skip)
            }
        }
    }
}

enum Dispatch {
    Request(HostRequest),
    Skip,
    Shutdown,
}

impl<R: BufRead, W: Write> HostChannel for StdioChannel<R, W> {
    fn next_request(&mut self) -> Result<Option<HostRequest>, TransportError> {
        while let Some(body) = read_framed_message(&mut self.reader)? {
            let raw_message = match serde_json::from_slice::<Value>(&body) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "unparseable message");
                    self.send(&error_response(&Value::Null, -32700, &format!("parse error: {err}")))?;
                    continue;
                }
            };

            if is_json_rpc_notification(&raw_message) {
                continue;
            }

            let request = match serde_json::from_value::<RpcRequest>(raw_message) {
                Ok(request) => request,
                Err(err) => {
                    warn!(%err, "malformed request");
                    self.send(&error_response(&Value::Null, -32700, &format!("parse error: {err}")))?;
                    continue;
                }
            };
            match self.dispatch(request)? {
                Dispatch::Request(request) => return Ok(Some(request)),
                Dispatch::Skip => {}
                Dispatch::Shutdown => return Ok(None),
            }
        }
        Ok(None)
    }

    fn report_outcome(&mut self, text: &str, is_error: bool) -> Result<(), TransportError> {
        self.respond(text, is_error)
    }

    fn report_completion(&mut self, serialized: &str, is_error: bool) -> Result<(), TransportError> {
        self.respond(serialized, is_error)
    }
}

/// `OutputSink` that forwards each chunk as an `output` notification.
pub struct FramedOutput<W> {
    writer: Rc<RefCell<W>>,
}

impl<W> FramedOutput<W> {
    pub fn new(writer: Rc<RefCell<W>>) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputSink for FramedOutput<W> {
    fn write_output(&mut self, chunk: Cow<'_, str>) -> io::Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "output",
            "params": { "chunk": chunk },
        });
        write_framed_message(&mut *self.writer.borrow_mut(), &notification)
    }
}

/// Returns true when the payload is a JSON-RPC 2.0 notification.
///
/// Notifications contain a string `method` and omit `id`; they never get a response.
fn is_json_rpc_notification(payload: &Value) -> bool {
    let Some(object) = payload.as_object() else {
        return false;
    };

    object.get("jsonrpc").and_then(Value::as_str) == Some("2.0")
        && object.get("method").is_some_and(Value::is_string)
        && !object.contains_key("id")
}

fn success_response(id: &Value, result: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}

/// Reads one Content-Length framed message body.
fn read_framed_message(reader: &mut impl BufRead) -> io::Result<Option<Vec<u8>>> {
    let mut content_length = None;
    loop {
        let mut header_line = String::new();
        let read = reader.read_line(&mut header_line)?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = header_line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("invalid Content-Length: {err}")))?;
            content_length = Some(length);
        }
    }

    let Some(content_length) = content_length else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "missing Content-Length header",
        ));
    };

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Writes one Content-Length framed JSON message and flushes it.
fn write_framed_message(writer: &mut impl Write, payload: &Value) -> io::Result<()> {
    let body = serde_json::to_vec(payload)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("serialize error: {err}")))?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn frame(payload: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        write_framed_message(&mut out, payload).unwrap();
        out
    }

    fn decode_all(bytes: &[u8]) -> Vec<Value> {
        let mut reader = Cursor::new(bytes);
        let mut messages = Vec::new();
        while let Some(body) = read_framed_message(&mut reader).unwrap() {
            messages.push(serde_json::from_slice(&body).unwrap());
        }
        messages
    }

    #[test]
    fn frame_round_trips_through_reader() {
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "complete"});
        assert_eq!(decode_all(&frame(&payload)), vec![payload]);
    }

    #[test]
    fn missing_content_length_is_invalid_data() {
        let mut reader = Cursor::new(b"X-Other: 1\r\n\r\n{}".to_vec());
        let err = read_framed_message(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn channel_skips_notifications_and_answers_pending_request() {
        let mut input = frame(&json!({"jsonrpc": "2.0", "method": "initialized"}));
        input.extend(frame(&json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "execute",
            "params": {"statements": "1 + 1", "job_group": "g"},
        })));
        let writer = Rc::new(RefCell::new(Vec::new()));
        let mut channel = StdioChannel::new(Cursor::new(input), Rc::clone(&writer));

        let request = channel.next_request().unwrap();
        assert_eq!(
            request,
            Some(HostRequest::Execute(StatementBatch::new("1 + 1", "g")))
        );
        channel.report_outcome("", false).unwrap();
        assert!(channel.next_request().unwrap().is_none());

        let sent = decode_all(&writer.borrow());
        assert_eq!(
            sent,
            vec![json!({"jsonrpc": "2.0", "id": 7, "result": {"text": "", "is_error": false}})]
        );
    }

    #[test]
    fn unknown_method_gets_error_and_loop_continues() {
        let mut input = frame(&json!({"jsonrpc": "2.0", "id": 1, "method": "bogus"}));
        input.extend(frame(&json!({"jsonrpc": "2.0", "id": 2, "method": "complete"})));
        let writer = Rc::new(RefCell::new(Vec::new()));
        let mut channel = StdioChannel::new(Cursor::new(input), Rc::clone(&writer));

        let request = channel.next_request().unwrap();
        assert_eq!(request, Some(HostRequest::Complete(CompletionRequest::default())));
        let sent = decode_all(&writer.borrow());
        assert_eq!(sent[0]["error"]["code"], json!(-32601));
    }

    #[test]
    fn response_without_request_is_protocol_error() {
        let writer = Rc::new(RefCell::new(Vec::new()));
        let mut channel = StdioChannel::new(Cursor::new(Vec::new()), writer);
        assert!(matches!(
            channel.report_outcome("x", true),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn output_chunks_become_notifications() {
        let writer = Rc::new(RefCell::new(Vec::new()));
        let mut output = FramedOutput::new(Rc::clone(&writer));
        output.write_output(Cow::Borrowed("hi\n")).unwrap();
        let sent = decode_all(&writer.borrow());
        assert_eq!(
            sent,
            vec![json!({"jsonrpc": "2.0", "method": "output", "params": {"chunk": "hi\n"}})]
        );
    }
}
