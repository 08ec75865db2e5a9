//! Name completion over the live session namespace.

use std::{collections::BTreeSet, rc::Rc};

use tracing::debug;

use crate::{
    config::SessionConfig,
    host::{CompletionRequest, ContextHost},
    interp::Interp,
    io::NoOutput,
    namespace::Namespace,
    parse::{SourceFile, parse_single_expression},
    value::Introspectable,
};

/// Candidates offered for a completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Sorted, deduplicated candidate names.
    Candidates(BTreeSet<String>),
    /// Nothing to offer; not an error.
    NoCompletions,
}

impl CompletionResult {
    fn from_names(names: BTreeSet<String>) -> Self {
        if names.is_empty() {
            Self::NoCompletions
        } else {
            Self::Candidates(names)
        }
    }

    /// The text sent back on the completion channel: a JSON array, or `""` when empty.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::NoCompletions => String::new(),
            Self::Candidates(names) => serde_json::to_string(names).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::NoCompletions => Vec::new(),
            Self::Candidates(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Names starting with `_`, including every `__dunder__`, are never offered.
#[must_use]
pub fn is_internal_name(name: &str) -> bool {
    name.starts_with('_')
}

pub(crate) struct CompletionEngine<'a> {
    pub globals: &'a mut Namespace,
    pub host: &'a mut dyn ContextHost,
    pub config: &'a SessionConfig,
}

impl CompletionEngine<'_> {
    pub fn complete(&mut self, request: &CompletionRequest) -> CompletionResult {
        let mut names: BTreeSet<String> = self.globals.attribute_names().into_iter().collect();
        let global_count = names.len();

        let prefix = request.text.as_deref().map(str::trim).unwrap_or_default();
        let mut attribute_count = 0;
        if !prefix.is_empty() {
            let attributes = self.attribute_candidates(prefix.strip_suffix('.').unwrap_or(prefix));
            attribute_count = attributes.len();
            names.extend(attributes);
        }

        names.retain(|name| !is_internal_name(name));
        debug!(
            global_count,
            attribute_count,
            offered = names.len(),
            "completion candidates"
        );
        CompletionResult::from_names(names)
    }

    /// Attribute names of the value `expression` evaluates to; empty on any failure.
    fn attribute_candidates(&mut self, expression: &str) -> Vec<String> {
        let source = Rc::new(SourceFile::new(&self.config.script_name, expression));
        let Ok(expr) = parse_single_expression(&source) else {
            return Vec::new();
        };
        let mut sink = NoOutput;
        let mut interp = Interp::new(self.globals, self.host, &mut sink, self.config, source);
        match interp.eval_expression(&expr) {
            Ok(value) => value.attribute_names(),
            Err(exc) => {
                debug!(error = %exc.summary(), "completion prefix did not resolve");
                Vec::new()
            }
        }
    }
}
