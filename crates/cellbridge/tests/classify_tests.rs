//! Tests for turning batch failures into host-facing diagnostics.

use cellbridge::{BatchError, Diagnostic, ErrorKind, ExcType, Exception, StackFrame};
use pretty_assertions::assert_eq;

fn frame(line: u32, name: Option<&str>, preview: &str) -> StackFrame {
    StackFrame::new("<stdin>", line, name, Some(preview))
}

// =============================================================================
// Local failures
// =============================================================================

/// A local runtime failure is reported as its full traceback.
#[test]
fn local_error_is_full_traceback() {
    let exc = Exception::new_msg(ExcType::KeyError, "'a'")
        .with_traceback(vec![frame(3, None, "f()"), frame(2, Some("f"), "    return d['a']")]);
    let diagnostic = Diagnostic::classify(&BatchError::Runtime(exc));
    assert_eq!(diagnostic.kind, ErrorKind::Local);
    assert!(diagnostic.fatal);
    assert_eq!(
        diagnostic.text,
        "Traceback (most recent call last):
  File \"<stdin>\", line 3, in <module>
    f()
  File \"<stdin>\", line 2, in f
    return d['a']
KeyError: 'a'
"
    );
}

/// Parse failures are local and carry no call-stack header.
#[test]
fn syntax_error_has_no_traceback_header() {
    let mut location = frame(1, None, "b = (");
    location.caret_column = Some(4);
    let exc = Exception::new_msg(ExcType::SyntaxError, "unexpected EOF").with_traceback(vec![location]);
    let diagnostic = Diagnostic::classify(&BatchError::Parse(exc));
    assert_eq!(diagnostic.kind, ErrorKind::Local);
    assert_eq!(
        diagnostic.text,
        "  File \"<stdin>\", line 1\n    b = (\n        ^\nSyntaxError: unexpected EOF\n"
    );
}

/// An exception without a message reports just its type.
#[test]
fn messageless_exception_summary() {
    let exc = Exception::new(ExcType::StopIteration, None).with_traceback(vec![frame(1, None, "next(it)")]);
    let diagnostic = Diagnostic::classify(&BatchError::Runtime(exc));
    assert!(diagnostic.text.ends_with("\nStopIteration\n"), "{}", diagnostic.text);
}

// =============================================================================
// Host failures
// =============================================================================

/// A host failure keeps only the text from the marker on, plus the exception triple.
#[test]
fn host_error_is_cut_at_marker() {
    let exc = Exception::new_msg(ExcType::HostRuntimeError, "An error occurred while calling z.get.")
        .with_traceback(vec![frame(1, None, "x = 1"), frame(2, Some("load"), "    z.get('k')")]);
    let diagnostic = Diagnostic::classify(&BatchError::Runtime(exc));
    assert_eq!(diagnostic.kind, ErrorKind::HostRuntime);
    assert!(diagnostic.fatal);
    assert_eq!(
        diagnostic.text,
        "HostRuntimeError: An error occurred while calling z.get.\n(<class 'HostRuntimeError'>, HostRuntimeError('An error occurred while calling z.get.'), <traceback with 2 frames>)"
    );
}

/// Host detail spanning several lines is kept after the marker.
#[test]
fn host_error_keeps_multiline_detail() {
    let exc = Exception::new_msg(ExcType::HostRuntimeError, "call failed\n: remote trace")
        .with_traceback(vec![frame(1, None, "z.put('k', 1)")]);
    let text = Diagnostic::classify(&BatchError::Runtime(exc)).text;
    assert!(text.starts_with("HostRuntimeError: call failed\n: remote trace\n(<class 'HostRuntimeError'>, "), "{text}");
    assert!(text.ends_with(", <traceback with 1 frames>)"), "{text}");
}

/// Without a traceback the whole text is kept and zero frames are reported.
#[test]
fn host_error_without_frames() {
    let exc = Exception::new_msg(ExcType::HostRuntimeError, "gone");
    let text = Diagnostic::classify(&BatchError::Runtime(exc)).text;
    assert_eq!(
        text,
        "HostRuntimeError: gone\n(<class 'HostRuntimeError'>, HostRuntimeError('gone'), <traceback with 0 frames>)"
    );
}

/// BatchError displays the wrapped exception's traceback.
#[test]
fn batch_error_display() {
    let exc = Exception::new_msg(ExcType::ValueError, "bad").with_traceback(vec![frame(1, None, "int('x')")]);
    let error = BatchError::Runtime(exc.clone());
    assert_eq!(error.exception(), &exc);
    assert_eq!(error.to_string(), exc.traceback_text());
}
