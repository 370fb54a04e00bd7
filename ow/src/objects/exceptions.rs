use std::io::{self, Write};

use bitflags::bitflags;

use crate::{Error, FaultKind, Machine, ObjRef, ObjectBody, Span, Value, Visitable, Visitor};

bitflags! {
    /// What to render of an exception.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrintFlags: u8 {
        const MESSAGE = 1;
        const BACKTRACE = 2;
    }
}

/// One frame the exception passed through, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub function: String,
    pub line: Option<u32>,
}

pub struct ExceptionObj {
    pub(crate) kind: FaultKind,
    pub(crate) message: Value,
    pub(crate) location: Option<Span>,
    pub(crate) backtrace: Vec<TraceEntry>,
}

impl Visitable for ExceptionObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.message);
    }
}

impl Machine {
    /// `message` must stay reachable until this returns.
    pub fn new_exception(&mut self, kind: FaultKind, message: Value, location: Option<Span>) -> ObjRef {
        let class = self.classes.exception;
        self.allocate(
            class,
            ObjectBody::Exception(Box::new(ExceptionObj {
                kind,
                message,
                location,
                backtrace: Vec::new(),
            })),
        )
    }

    pub fn new_error(&mut self, kind: FaultKind, message: &str) -> ObjRef {
        // the message string is unreachable until the exception holds it
        let _region = self.heap.no_collect_region();
        let message = self.new_string(message);
        self.new_exception(kind, Value::from_object(message), None)
    }

    /// Turns a fault into an exception value. Already raised exceptions pass through.
    pub(crate) fn raise(&mut self, error: Error) -> Value {
        let (kind, location) = match &error {
            Error::Raised { exception, .. } => return *exception,
            Error::Compile { error: compile, .. } => (FaultKind::Compile, Some(compile.span)),
            other => (other.kind(), None),
        };
        log::debug!("raising {}: {error}", kind.name());
        let exception = self.new_error(kind, &error.to_string());
        if let Some(exception) = self.exception_obj_mut(exception) {
            exception.location = location;
        }
        Value::from_object(exception)
    }

    #[inline]
    pub(crate) fn exception_obj(&self, value: Value) -> Option<&ExceptionObj> {
        match &self.heap.try_get(value.as_object()?)?.body {
            ObjectBody::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    fn exception_obj_mut(&mut self, exception: ObjRef) -> Option<&mut ExceptionObj> {
        match &mut self.heap.try_get_mut(exception)?.body {
            ObjectBody::Exception(exception) => Some(exception),
            _ => None,
        }
    }

    pub fn is_exception(&self, value: Value) -> bool {
        self.exception_obj(value).is_some()
    }

    pub fn exception_kind(&self, value: Value) -> Option<FaultKind> {
        self.exception_obj(value).map(|exception| exception.kind)
    }

    pub fn exception_location(&self, value: Value) -> Option<Span> {
        self.exception_obj(value)?.location
    }

    pub fn exception_message(&self, value: Value) -> Option<String> {
        let message = self.exception_obj(value)?.message;
        Some(match self.text_of(message) {
            Some(text) => text.to_owned(),
            None => self.display_value(message),
        })
    }

    pub fn exception_backtrace(&self, value: Value) -> Option<&[TraceEntry]> {
        self.exception_obj(value)
            .map(|exception| exception.backtrace.as_slice())
    }

    pub(crate) fn push_trace(&mut self, value: Value, entry: TraceEntry) {
        if let Some(exception) = value.as_object().and_then(|e| self.exception_obj_mut(e)) {
            exception.backtrace.push(entry);
        }
    }

    /// Message and/or backtrace as text, without a trailing newline.
    pub fn render_exception(&self, value: Value, flags: PrintFlags) -> String {
        let mut lines = Vec::new();
        if flags.contains(PrintFlags::MESSAGE) {
            lines.push(self.exception_message(value).unwrap_or_default());
        }
        if flags.contains(PrintFlags::BACKTRACE) {
            for entry in self.exception_backtrace(value).unwrap_or_default() {
                lines.push(match entry.line {
                    Some(line) => format!("  at {} (line {line})", entry.function),
                    None => format!("  at {}", entry.function),
                });
            }
        }
        lines.join("\n")
    }

    pub fn print_exception(
        &self,
        value: Value,
        sink: &mut dyn Write,
        flags: PrintFlags,
    ) -> io::Result<()> {
        writeln!(sink, "{}", self.render_exception(value, flags))
    }

    /// Copies the rendering into `buffer`, truncated to leave room for a terminating NUL.
    /// Returns the number of text bytes written.
    pub fn exception_to_buffer(&self, value: Value, flags: PrintFlags, buffer: &mut [u8]) -> usize {
        let Some(room) = buffer.len().checked_sub(1) else {
            return 0;
        };
        let text = self.render_exception(value, flags);
        let count = text.len().min(room);
        buffer[..count].copy_from_slice(&text.as_bytes()[..count]);
        buffer[count] = 0;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom(machine: &mut Machine) -> Value {
        let exception = machine.new_error(FaultKind::User, "boom");
        Value::from_object(exception)
    }

    #[test]
    fn message_only_rendering_is_exact() {
        let mut machine = Machine::new();
        let exception = boom(&mut machine);
        let mut buffer = [0xffu8; 16];
        let written = machine.exception_to_buffer(exception, PrintFlags::MESSAGE, &mut buffer);
        assert_eq!(written, 4);
        assert_eq!(&buffer[..5], b"boom\0");
    }

    #[test]
    fn small_buffer_is_truncated_and_terminated() {
        let mut machine = Machine::new();
        let exception = boom(&mut machine);
        let mut buffer = [0xffu8; 3];
        let written = machine.exception_to_buffer(exception, PrintFlags::MESSAGE, &mut buffer);
        assert_eq!(written, 2);
        assert_eq!(&buffer, b"bo\0");
        assert_eq!(machine.exception_to_buffer(exception, PrintFlags::MESSAGE, &mut []), 0);
    }

    #[test]
    fn backtrace_lines_follow_the_message() {
        let mut machine = Machine::new();
        let exception = boom(&mut machine);
        machine.push_trace(
            exception,
            TraceEntry {
                function: "inner".into(),
                line: Some(3),
            },
        );
        machine.push_trace(
            exception,
            TraceEntry {
                function: "<module>".into(),
                line: None,
            },
        );
        assert_eq!(
            machine.render_exception(exception, PrintFlags::all()),
            "boom\n  at inner (line 3)\n  at <module>"
        );
        assert_eq!(
            machine.render_exception(exception, PrintFlags::BACKTRACE),
            "  at inner (line 3)\n  at <module>"
        );
    }

    #[test]
    fn raise_keeps_kind_and_message() {
        let mut machine = Machine::new();
        let exception = machine.raise(Error::UndefinedGlobal("nope".into()));
        assert_eq!(machine.exception_kind(exception), Some(FaultKind::Resolution));
        assert_eq!(
            machine.exception_message(exception).as_deref(),
            Some("undefined global `nope'")
        );
        let again = machine.raise(Error::Raised {
            exception,
            kind: FaultKind::Resolution,
        });
        assert_eq!(again, exception);
    }
}
