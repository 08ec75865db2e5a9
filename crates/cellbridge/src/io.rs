use std::{
    borrow::Cow,
    cell::RefCell,
    io,
    rc::Rc,
};

/// Trait for handling text produced while a batch runs: `print()` output and the
/// echoed value of an interactive expression.
///
/// Chunks are delivered as they are produced; implementations must not hold them back
/// until the batch finishes.
pub trait OutputSink {
    /// Called once per produced chunk. A chunk already contains any separators and
    /// line terminators.
    fn write_output(&mut self, chunk: Cow<'_, str>) -> io::Result<()>;
}

/// An `OutputSink` that collects all output into a shared string.
///
/// Cloning gives another handle to the same buffer, so a caller can keep one handle while
/// the session owns the other.
#[derive(Debug, Clone, Default)]
pub struct CollectOutput(Rc<RefCell<String>>);

impl CollectOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.borrow().clone()
    }

    /// Returns the collected output and clears the buffer.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl OutputSink for CollectOutput {
    fn write_output(&mut self, chunk: Cow<'_, str>) -> io::Result<()> {
        self.0.borrow_mut().push_str(&chunk);
        Ok(())
    }
}

/// `OutputSink` that ignores all output.
///
/// Used when evaluating completion prefixes, whose side effects must stay invisible.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutput;

impl OutputSink for NoOutput {
    fn write_output(&mut self, _chunk: Cow<'_, str>) -> io::Result<()> {
        Ok(())
    }
}
