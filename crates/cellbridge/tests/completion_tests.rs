//! Tests for completion candidates over the live session namespace.

use cellbridge::{
    CollectOutput, CompletionRequest, CompletionResult, MemoryContextHost, Session, SessionConfig, StatementBatch,
    is_internal_name,
};
use pretty_assertions::assert_eq;

fn session_with(config: SessionConfig, setup: &str) -> (Session, CollectOutput) {
    let output = CollectOutput::new();
    let mut session = Session::new(config, Box::new(MemoryContextHost::new()), Box::new(output.clone()));
    let outcome = session.execute(&StatementBatch::new(setup, "setup"));
    assert!(!outcome.is_error(), "setup failed: {}", outcome.text());
    output.take();
    (session, output)
}

fn complete(session: &mut Session, text: Option<&str>) -> CompletionResult {
    let request = match text {
        Some(text) => CompletionRequest::new(text),
        None => CompletionRequest::default(),
    };
    session.complete(&request)
}

// =============================================================================
// Global names
// =============================================================================

/// Without a prefix every public global is offered, the context object included.
#[test]
fn no_prefix_offers_public_globals() {
    let (mut session, _) = session_with(SessionConfig::default(), "alpha = 1\n_hidden = 2");
    let result = complete(&mut session, None);
    assert_eq!(result.names(), vec!["alpha", "z"]);
    assert_eq!(result.to_wire(), r#"["alpha","z"]"#);
}

/// A namespace holding only internal names yields no completions, serialized as "".
#[test]
fn only_internal_names_is_no_completions() {
    let (mut session, _) = session_with(SessionConfig::default().with_context_name("_ctx"), "");
    let result = complete(&mut session, Some(""));
    assert_eq!(result, CompletionResult::NoCompletions);
    assert_eq!(result.to_wire(), "");
}

/// Leading underscores mark internal names.
#[test]
fn internal_name_rule() {
    assert!(is_internal_name("_private"));
    assert!(is_internal_name("__init__"));
    assert!(!is_internal_name("public_name"));
}

// =============================================================================
// Attribute candidates
// =============================================================================

/// A trailing dot completes the attributes of the evaluated prefix, minus dunders.
#[test]
fn instance_attributes_are_offered() {
    let setup = "class C:\n    def __init__(self):\n        self.value = 1\n    def method1(self):\n        pass\nobj = C()";
    let (mut session, _) = session_with(SessionConfig::default(), setup);
    let result = complete(&mut session, Some("obj."));
    let names = result.names();
    assert!(names.contains(&"method1"), "{names:?}");
    assert!(names.contains(&"value"), "{names:?}");
    assert!(names.contains(&"obj"), "{names:?}");
    assert!(!names.contains(&"__init__"), "{names:?}");
    assert!(!names.contains(&"__class__"), "{names:?}");
}

/// Built-in values offer their methods.
#[test]
fn list_literal_offers_list_methods() {
    let (mut session, _) = session_with(SessionConfig::default(), "");
    let names = complete(&mut session, Some("[].")).names().into_iter().map(str::to_owned).collect::<Vec<_>>();
    assert!(names.iter().any(|name| name == "append"), "{names:?}");
    assert!(names.iter().any(|name| name == "sort"), "{names:?}");
}

/// The session context offers its store and widget methods.
#[test]
fn context_offers_its_methods() {
    let (mut session, _) = session_with(SessionConfig::default(), "");
    let result = complete(&mut session, Some("z."));
    let names = result.names();
    assert!(names.contains(&"get"), "{names:?}");
    assert!(names.contains(&"put"), "{names:?}");
    assert!(names.contains(&"select"), "{names:?}");
}

/// A prefix naming nothing contributes no attributes and is not an error.
#[test]
fn unresolvable_prefix_falls_back_to_globals() {
    let (mut session, _) = session_with(SessionConfig::default(), "alpha = 1");
    let baseline = complete(&mut session, None);
    assert_eq!(complete(&mut session, Some("undefined_name.")), baseline);
    assert_eq!(complete(&mut session, Some("((")), baseline);
}

/// Evaluating a prefix never writes to the session output.
#[test]
fn prefix_evaluation_is_silent() {
    let (mut session, output) = session_with(SessionConfig::default(), "def noisy():\n    print('side effect')\n    return 1");
    let result = complete(&mut session, Some("noisy()."));
    assert!(result.names().contains(&"bit_length"), "{:?}", result.names());
    assert_eq!(output.take(), "");
}

/// Completion leaves the namespace untouched.
#[test]
fn completion_does_not_bind_names() {
    let (mut session, _) = session_with(SessionConfig::default(), "alpha = 1");
    let before = session.namespace().len();
    complete(&mut session, Some("alpha."));
    assert_eq!(session.namespace().len(), before);
}
