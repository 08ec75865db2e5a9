use std::fmt::{self, Write};

use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can raise a Python exception.
pub(crate) type RunResult<T> = Result<T, Exception>;

/// Python exception types supported by the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcType {
    /// Root of the hierarchy; matches everything in `except` clauses.
    BaseException,
    /// Primary exception class - matches any exception except `BaseException` itself.
    Exception,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    /// Subclass of ArithmeticError.
    OverflowError,
    /// Subclass of ArithmeticError.
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    /// Subclass of LookupError.
    IndexError,
    /// Subclass of LookupError.
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    /// Subclass of RuntimeError.
    NotImplementedError,
    /// Subclass of RuntimeError.
    RecursionError,

    // --- NameError hierarchy ---
    NameError,
    /// Subclass of NameError - reading a function local before assignment.
    UnboundLocalError,

    AttributeError,
    AssertionError,
    /// Raised before building a result too large to allocate.
    MemoryError,
    StopIteration,
    SyntaxError,
    TypeError,
    ValueError,

    /// A failure reported by the host runtime behind the session context.
    HostRuntimeError,
}

impl ExcType {
    /// Checks if this exception type is caught by a handler for `handler_type`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::BaseException => true,
            Self::Exception => self != Self::BaseException,
            Self::LookupError => matches!(self, Self::KeyError | Self::IndexError),
            Self::ArithmeticError => matches!(self, Self::ZeroDivisionError | Self::OverflowError),
            Self::RuntimeError => matches!(self, Self::RecursionError | Self::NotImplementedError),
            Self::NameError => matches!(self, Self::UnboundLocalError),
            _ => false,
        }
    }

    #[must_use]
    pub(crate) fn type_error(msg: impl fmt::Display) -> Exception {
        Exception::new_msg(Self::TypeError, msg)
    }

    #[must_use]
    pub(crate) fn value_error(msg: impl fmt::Display) -> Exception {
        Exception::new_msg(Self::ValueError, msg)
    }

    #[must_use]
    pub(crate) fn index_error(msg: impl fmt::Display) -> Exception {
        Exception::new_msg(Self::IndexError, msg)
    }

    /// Creates a KeyError whose message is the repr of the missing key, as CPython prints it.
    #[must_use]
    pub(crate) fn key_error(key: &Value) -> Exception {
        Exception::new_msg(Self::KeyError, key.py_repr())
    }

    #[must_use]
    pub(crate) fn name_error(name: &str) -> Exception {
        Exception::new_msg(Self::NameError, format!("name '{name}' is not defined"))
    }

    #[must_use]
    pub(crate) fn unbound_local(name: &str) -> Exception {
        Exception::new_msg(
            Self::UnboundLocalError,
            format!("cannot access local variable '{name}' where it is not associated with a value"),
        )
    }

    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> Exception {
        Exception::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    #[must_use]
    pub(crate) fn zero_division(msg: &'static str) -> Exception {
        Exception::new_msg(Self::ZeroDivisionError, msg)
    }

    #[must_use]
    pub(crate) fn overflow() -> Exception {
        Exception::new_msg(Self::OverflowError, "integer result too large for 64 bits")
    }

    #[must_use]
    pub(crate) fn memory_error() -> Exception {
        Exception::new(Self::MemoryError, None)
    }

    #[must_use]
    pub(crate) fn type_error_not_sub(type_name: &str) -> Exception {
        Self::type_error(format!("'{type_name}' object is not subscriptable"))
    }

    #[must_use]
    pub(crate) fn type_error_not_sub_assignment(type_name: &str) -> Exception {
        Self::type_error(format!("'{type_name}' object does not support item assignment"))
    }

    #[must_use]
    pub(crate) fn type_error_unhashable(type_name: &str) -> Exception {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    #[must_use]
    pub(crate) fn type_error_not_callable(type_name: &str) -> Exception {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    #[must_use]
    pub(crate) fn type_error_not_iterable(type_name: &str) -> Exception {
        Self::type_error(format!("'{type_name}' object is not iterable"))
    }

    /// Matches CPython's format: `{name}() takes exactly one argument ({actual} given)` for one
    /// expected argument, `{name} expected {expected} arguments, got {actual}` otherwise.
    #[must_use]
    pub(crate) fn type_error_arg_count(name: &str, expected: usize, actual: usize) -> Exception {
        if expected == 1 {
            Self::type_error(format!("{name}() takes exactly one argument ({actual} given)"))
        } else {
            Self::type_error(format!("{name} expected {expected} arguments, got {actual}"))
        }
    }

    #[must_use]
    pub(crate) fn type_error_no_args(name: &str, actual: usize) -> Exception {
        Self::type_error(format!("{name}() takes no arguments ({actual} given)"))
    }

    #[must_use]
    pub(crate) fn type_error_at_most(name: &str, max: usize, actual: usize) -> Exception {
        Self::type_error(format!("{name} expected at most {max} arguments, got {actual}"))
    }

    #[must_use]
    pub(crate) fn type_error_at_least(name: &str, min: usize, actual: usize) -> Exception {
        Self::type_error(format!("{name} expected at least {min} argument, got {actual}"))
    }

    #[must_use]
    pub(crate) fn type_error_unexpected_keyword(name: &str, key: &str) -> Exception {
        Self::type_error(format!("{name}() got an unexpected keyword argument '{key}'"))
    }

    #[must_use]
    pub(crate) fn type_error_unsupported_operand(op: &str, left: &str, right: &str) -> Exception {
        Self::type_error(format!(
            "unsupported operand type(s) for {op}: '{left}' and '{right}'"
        ))
    }
}

/// One entry of a traceback, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub filename: String,
    /// 1-based line number.
    pub line: u32,
    /// Function name; `None` for module level.
    pub name: Option<String>,
    /// The stripped source line, when available.
    pub preview: Option<String>,
    /// Column of the `^` marker under the preview (syntax errors only).
    pub caret_column: Option<u32>,
}

impl StackFrame {
    #[must_use]
    pub fn new(filename: &str, line: u32, name: Option<&str>, preview: Option<&str>) -> Self {
        Self {
            filename: filename.to_owned(),
            line,
            name: name.map(str::to_owned),
            preview: preview.map(str::to_owned),
            caret_column: None,
        }
    }
}

/// A raised Python exception together with the traceback captured where it was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    exc_type: ExcType,
    message: Option<String>,
    frames: Vec<StackFrame>,
}

impl Exception {
    #[must_use]
    pub fn new(exc_type: ExcType, message: Option<String>) -> Self {
        Self {
            exc_type,
            message,
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub fn new_msg(exc_type: ExcType, message: impl fmt::Display) -> Self {
        Self::new(exc_type, Some(message.to_string()))
    }

    #[must_use]
    pub fn with_traceback(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub(crate) fn has_traceback(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn set_traceback(&mut self, frames: Vec<StackFrame>) {
        self.frames = frames;
    }

    /// `str(exc)`: the message, or an empty string.
    #[must_use]
    pub fn py_str(&self) -> String {
        self.message.clone().unwrap_or_default()
    }

    /// `repr(exc)`, e.g. `ValueError('bad')` or `ValueError()`.
    #[must_use]
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        out.push_str(self.exc_type.into());
        out.push('(');
        if let Some(message) = &self.message {
            out.push_str(&Value::Str(message.as_str().into()).py_repr());
        }
        out.push(')');
        out
    }

    /// The `Type: message` line that ends a traceback.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.message.as_deref() {
            Some(message) if !message.is_empty() => format!("{}: {message}", self.exc_type),
            _ => self.exc_type.to_string(),
        }
    }

    /// Full traceback text, as `traceback.format_exc()` would produce it.
    #[must_use]
    pub fn traceback_text(&self) -> String {
        let mut out = String::new();
        // infallible: writing to a String
        let _ = self.write_traceback(&mut out);
        out
    }

    fn write_traceback(&self, out: &mut impl Write) -> fmt::Result {
        // a syntax error points into source that never ran, so there is no call stack header
        let is_syntax = self.frames.iter().any(|frame| frame.caret_column.is_some());
        if !self.frames.is_empty() && !is_syntax {
            writeln!(out, "Traceback (most recent call last):")?;
        }
        for frame in &self.frames {
            write!(out, "  File \"{}\", line {}", frame.filename, frame.line)?;
            if !is_syntax {
                write!(out, ", in {}", frame.name.as_deref().unwrap_or("<module>"))?;
            }
            writeln!(out)?;
            if let Some(preview) = &frame.preview {
                let trimmed = preview.trim_start();
                if !trimmed.is_empty() {
                    writeln!(out, "    {}", trimmed.trim_end())?;
                    if let Some(column) = frame.caret_column {
                        let indent = preview.chars().count() - trimmed.chars().count();
                        let offset = usize::try_from(column).unwrap_or(0).saturating_sub(indent);
                        writeln!(out, "    {}^", " ".repeat(offset))?;
                    }
                }
            }
        }
        writeln!(out, "{}", self.summary())
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_traceback(f)
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn traceback_lists_frames_outermost_first() {
        let exc = Exception::new_msg(ExcType::ZeroDivisionError, "division by zero").with_traceback(vec![
            StackFrame::new("<stdin>", 3, None, Some("f()")),
            StackFrame::new("<stdin>", 2, Some("f"), Some("    return 1 / 0")),
        ]);
        assert_eq!(
            exc.traceback_text(),
            "Traceback (most recent call last):\n  File \"<stdin>\", line 3, in <module>\n    f()\n  File \"<stdin>\", line 2, in f\n    return 1 / 0\nZeroDivisionError: division by zero\n"
        );
    }

    #[test]
    fn syntax_error_has_caret_and_no_header() {
        let mut frame = StackFrame::new("<stdin>", 1, None, Some("x = (1 +"));
        frame.caret_column = Some(4);
        let exc = Exception::new_msg(ExcType::SyntaxError, "'(' was never closed").with_traceback(vec![frame]);
        assert_eq!(
            exc.traceback_text(),
            "  File \"<stdin>\", line 1\n    x = (1 +\n        ^\nSyntaxError: '(' was never closed\n"
        );
    }

    #[test]
    fn empty_message_prints_type_only() {
        assert_eq!(Exception::new(ExcType::ValueError, None).summary(), "ValueError");
        assert_eq!(Exception::new_msg(ExcType::ValueError, "").summary(), "ValueError");
        assert_eq!(Exception::new_msg(ExcType::ValueError, "bad").py_repr(), "ValueError('bad')");
    }

    #[test]
    fn hierarchy_matches_handlers() {
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::HostRuntimeError.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::ValueError));
        assert!(!ExcType::BaseException.is_subclass_of(ExcType::Exception));
    }
}
