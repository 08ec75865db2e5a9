/// Default limit on nested Python calls before `RecursionError` is raised.
///
/// The interpreter recurses on the native stack, so the limit is far below CPython's 1000.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Settings fixed for the lifetime of a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// File name shown in traceback entries.
    pub script_name: String,
    /// Global name the session context is bound under.
    pub context_name: String,
    pub max_recursion_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            script_name: "<stdin>".to_owned(),
            context_name: "z".to_owned(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_script_name(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = script_name.into();
        self
    }

    #[must_use]
    pub fn with_context_name(mut self, context_name: impl Into<String>) -> Self {
        self.context_name = context_name.into();
        self
    }

    #[must_use]
    pub fn with_max_recursion_depth(mut self, max_recursion_depth: usize) -> Self {
        self.max_recursion_depth = max_recursion_depth;
        self
    }
}
