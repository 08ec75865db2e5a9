//! Tests for the session context object: the shared-variable store, input widgets,
//! job groups and failures raised by the host behind them.

use std::{cell::RefCell, rc::Rc};

use cellbridge::{
    CollectOutput, ContextHost, ExecutionOutcome, HostFault, HostValue, ParamOption, Session, SessionConfig,
    StatementBatch,
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Debug, Default)]
struct HostState {
    values: IndexMap<String, HostValue>,
    job_groups: Vec<String>,
    widgets: Vec<(String, Vec<ParamOption>)>,
    /// Keys whose reads fail with a host fault.
    failing_keys: Vec<String>,
    reject_job_groups: bool,
}

/// A host whose state stays inspectable after the session takes ownership of it.
#[derive(Debug, Clone, Default)]
struct RecordingHost(Rc<RefCell<HostState>>);

impl ContextHost for RecordingHost {
    fn get(&mut self, key: &str) -> Result<Option<HostValue>, HostFault> {
        let state = self.0.borrow();
        if state.failing_keys.iter().any(|failing| failing == key) {
            return Err(HostFault::new("java.util.NoSuchElementException: boom"));
        }
        Ok(state.values.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: HostValue) -> Result<(), HostFault> {
        self.0.borrow_mut().values.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), HostFault> {
        self.0.borrow_mut().values.shift_remove(key);
        Ok(())
    }

    fn contains(&mut self, key: &str) -> Result<bool, HostFault> {
        Ok(self.0.borrow().values.contains_key(key))
    }

    fn input(&mut self, name: &str, default: &HostValue) -> Result<HostValue, HostFault> {
        self.0.borrow_mut().widgets.push((name.to_owned(), Vec::new()));
        Ok(default.clone())
    }

    fn select(&mut self, name: &str, options: &[ParamOption], default: &HostValue) -> Result<HostValue, HostFault> {
        self.0.borrow_mut().widgets.push((name.to_owned(), options.to_vec()));
        Ok(default.clone())
    }

    fn checkbox(
        &mut self,
        name: &str,
        options: &[ParamOption],
        default_checked: &[HostValue],
    ) -> Result<Vec<HostValue>, HostFault> {
        self.0.borrow_mut().widgets.push((name.to_owned(), options.to_vec()));
        Ok(default_checked.to_vec())
    }

    fn set_job_group(&mut self, job_group: &str) -> Result<(), HostFault> {
        let mut state = self.0.borrow_mut();
        if state.reject_job_groups {
            return Err(HostFault::new("job groups are disabled"));
        }
        state.job_groups.push(job_group.to_owned());
        Ok(())
    }
}

struct Harness {
    session: Session,
    output: CollectOutput,
    host: RecordingHost,
}

impl Harness {
    fn new(config: SessionConfig) -> Self {
        let host = RecordingHost::default();
        let output = CollectOutput::new();
        let session = Session::new(config, Box::new(host.clone()), Box::new(output.clone()));
        Self { session, output, host }
    }

    fn run(&mut self, code: &str) -> (ExecutionOutcome, String) {
        let outcome = self.session.execute(&StatementBatch::new(code, "group-1"));
        (outcome, self.output.take())
    }

    /// Runs `code`, which must succeed, and returns its output.
    fn run_ok(&mut self, code: &str) -> String {
        let (outcome, text) = self.run(code);
        assert!(!outcome.is_error(), "unexpected failure:\n{}", outcome.text());
        text
    }

    /// Runs `code`, which must fail, and returns the last line of its diagnostic.
    fn run_err(&mut self, code: &str) -> String {
        let (outcome, _) = self.run(code);
        assert!(outcome.is_error(), "expected a failure from {code:?}");
        outcome.text().trim_end().lines().last().unwrap_or_default().to_owned()
    }
}

// =============================================================================
// Shared variables
// =============================================================================

/// put stores JSON-compatible values in the host; get reads them back as fresh values.
#[test]
fn put_and_get_round_trip_through_the_host() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.run_ok("z.put('config', {'rows': [1, 2.5], 'name': 'x', 'on': True, 'none': None})");
    assert_eq!(
        harness.host.0.borrow().values.get("config"),
        Some(&json!({"rows": [1, 2.5], "name": "x", "on": true, "none": null}))
    );
    let text = harness.run_ok("z.get('config')['rows']");
    assert_eq!(text, "[1, 2.5]\n");
}

/// Subscript, membership and del forms reach the same store.
#[test]
fn subscript_forms_use_the_store() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.run_ok("z['a'] = [1, 2]");
    assert_eq!(harness.run_ok("z['a']"), "[1, 2]\n");
    assert_eq!(harness.run_ok("('a' in z, z.contains('b'))"), "(True, False)\n");
    harness.run_ok("del z['a']");
    assert_eq!(harness.run_ok("'a' in z"), "False\n");
    assert!(harness.host.0.borrow().values.is_empty());
}

/// Reading a key that was never set yields None.
#[test]
fn missing_key_reads_none() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(harness.run_ok("z.get('nope') is None"), "True\n");
    assert_eq!(harness.run_ok("z['nope']"), "");
}

/// Values read from the store are copies; mutating them does not write back.
#[test]
fn read_values_are_detached_copies() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.run_ok("z.put('items', [1])\nitems = z.get('items')\nitems.append(2)");
    assert_eq!(harness.host.0.borrow().values.get("items"), Some(&json!([1])));
}

/// Keys must be strings.
#[test]
fn non_string_key_is_type_error() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(harness.run_err("z[1]"), "TypeError: context keys must be str, not int");
}

/// Values that have no JSON form are rejected before reaching the host.
#[test]
fn unserializable_value_is_type_error() {
    let mut harness = Harness::new(SessionConfig::default());
    let last = harness.run_err("def f():\n    pass\nz.put('fn', f)");
    assert_eq!(last, "TypeError: Object of type function is not JSON serializable");
    assert!(harness.host.0.borrow().values.is_empty());
}

// =============================================================================
// Host failures
// =============================================================================

/// A host fault surfaces as HostRuntimeError with the local traceback dropped.
#[test]
fn host_fault_is_reported_as_host_error() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.host.0.borrow_mut().failing_keys.push("broken".to_owned());
    let (outcome, _) = harness.run("x = 1\nz.get('broken')");
    let text = outcome.text().to_owned();
    assert!(outcome.is_error());
    assert!(
        text.starts_with("HostRuntimeError: An error occurred while calling z.get.\n: java.util.NoSuchElementException: boom"),
        "{text}"
    );
    assert!(!text.contains("Traceback"), "{text}");
    assert!(
        text.ends_with("<traceback with 1 frames>)"),
        "{text}"
    );
}

/// The error message names the configured context object.
#[test]
fn host_fault_names_custom_context() {
    let mut harness = Harness::new(SessionConfig::default().with_context_name("ctx"));
    harness.host.0.borrow_mut().failing_keys.push("k".to_owned());
    let (outcome, _) = harness.run("ctx['k']");
    assert!(
        outcome.text().starts_with("HostRuntimeError: An error occurred while calling ctx.get."),
        "{}",
        outcome.text()
    );
}

/// A host fault can be caught like any exception.
#[test]
fn host_fault_can_be_caught() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.host.0.borrow_mut().failing_keys.push("broken".to_owned());
    let text = harness.run_ok("try:\n    z.get('broken')\nexcept Exception:\n    print('recovered')");
    assert_eq!(text, "recovered\n");
}

// =============================================================================
// Widgets
// =============================================================================

/// input answers with its default, which is the empty string when omitted.
#[test]
fn input_returns_default() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(harness.run_ok("z.input('name', 'bob')"), "'bob'\n");
    assert_eq!(harness.run_ok("z.input('other')"), "''\n");
    let widgets = &harness.host.0.borrow().widgets;
    assert_eq!(widgets[0].0, "name");
    assert_eq!(widgets[1].0, "other");
}

/// select passes its options to the host as value/label pairs.
#[test]
fn select_passes_options() {
    let mut harness = Harness::new(SessionConfig::default());
    let text = harness.run_ok("z.select('day', [('mon', 'Monday'), (2, 'Tuesday')], default='mon')");
    assert_eq!(text, "'mon'\n");
    let state = harness.host.0.borrow();
    let (name, options) = &state.widgets[0];
    assert_eq!(name, "day");
    assert_eq!(
        options,
        &vec![
            ParamOption {
                value: json!("mon"),
                label: "Monday".to_owned()
            },
            ParamOption {
                value: json!(2),
                label: "Tuesday".to_owned()
            },
        ]
    );
}

/// Options that are not pairs are rejected.
#[test]
fn malformed_options_are_index_error() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(
        harness.run_err("z.select('s', [1, 2])"),
        "IndexError: options must be a list of tuple of 2"
    );
}

/// checkbox checks every option when no default is given.
#[test]
fn checkbox_defaults_to_every_option() {
    let mut harness = Harness::new(SessionConfig::default());
    let options = "[('a', 'A'), ('b', 'B')]";
    assert_eq!(harness.run_ok(&format!("z.checkbox('c', {options})")), "['a', 'b']\n");
    assert_eq!(harness.run_ok(&format!("z.checkbox('c', {options}, ['b'])")), "['b']\n");
}

// =============================================================================
// show
// =============================================================================

/// show prints the str() of a value.
#[test]
fn show_prints_values() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(harness.run_ok("z.show([1, 'a'])\nz.show('plain', width=300)"), "[1, 'a']\nplain\n");
}

/// show calls a callable so it can render itself.
#[test]
fn show_calls_callables() {
    let mut harness = Harness::new(SessionConfig::default());
    assert_eq!(harness.run_ok("def draw():\n    print('drawn')\nz.show(draw)"), "drawn\n");
}

// =============================================================================
// Job groups
// =============================================================================

/// Every batch with something to run tags the host with its job group first.
#[test]
fn job_group_is_recorded_per_batch() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.run_ok("x = 1");
    harness.session.execute(&StatementBatch::new("y = 2", "group-2"));
    assert_eq!(harness.host.0.borrow().job_groups, vec!["group-1", "group-2"]);

    // a batch with nothing to run never reaches the host
    let outcome = harness.session.execute(&StatementBatch::new("\n# just a comment\n   \n", "group-3"));
    assert_eq!(outcome, ExecutionOutcome::Finished(String::new()));
    assert_eq!(harness.host.0.borrow().job_groups, vec!["group-1", "group-2"]);
}

/// A rejected job group does not fail the batch, but is noted on a later failure.
#[test]
fn rejected_job_group_is_noted_on_failure() {
    let mut harness = Harness::new(SessionConfig::default());
    harness.host.0.borrow_mut().reject_job_groups = true;
    let (outcome, _) = harness.run("x = 1");
    assert_eq!(outcome, ExecutionOutcome::Finished(String::new()));

    let (outcome, _) = harness.run("1 / 0");
    assert_eq!(
        outcome.text(),
        "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\n    1 / 0\nZeroDivisionError: division by zero\nnote: job group 'group-1' was rejected: job groups are disabled"
    );
}
