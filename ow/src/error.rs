use thiserror::Error;

use crate::{CompileError, DefinitionError, SMALL_INT_MAX, SMALL_INT_MIN, Value};

/// Coarse fault taxonomy, stored on every exception object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Index,
    Type,
    Resolution,
    Io,
    Compile,
    NotImplemented,
    /// raised explicitly by script code
    User,
}

impl FaultKind {
    pub const fn name(self) -> &'static str {
        match self {
            FaultKind::Index => "IndexError",
            FaultKind::Type => "TypeError",
            FaultKind::Resolution => "NameError",
            FaultKind::Io => "IOError",
            FaultKind::Compile => "SyntaxError",
            FaultKind::NotImplemented => "NotImplementedError",
            FaultKind::User => "Error",
        }
    }
}

/// Everything that can go wrong inside the machine.
///
/// Natives and the engine pass these around with `?`. When a fault crosses a frame boundary
/// it is turned into an exception object and travels on as [`Error::Raised`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("index {index} is out of range")]
    Index { index: isize },

    #[error("integer {value} is outside [{}, {}]", SMALL_INT_MIN, SMALL_INT_MAX)]
    SmallIntRange { value: i64 },

    #[error("integer overflow")]
    Overflow,

    #[error("division by zero")]
    ZeroDivision,

    #[error("stack overflow: more than {0} nested calls")]
    StackOverflow(usize),

    #[error("{what} is not a {expected} object")]
    Type { what: String, expected: &'static str },

    #[error("`{name}' takes {expected} arguments, {got} given")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("`{class}' object has no method `{method}'")]
    NoSuchMethod { class: String, method: String },

    #[error("`{class}' object has no attribute `{attribute}'")]
    NoSuchAttribute { class: String, attribute: String },

    #[error("undefined global `{0}'")]
    UndefinedGlobal(String),

    #[error("cannot find module `{0}'")]
    ModuleNotFound(String),

    #[error("cannot open file `{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} : {} : {}", .error.span, .error.message)]
    Compile { file: String, error: CompileError },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An exception object that is already built and on its way out.
    #[error("{} raised", .kind.name())]
    Raised { exception: Value, kind: FaultKind },
}

impl Error {
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::Index { .. }
            | Error::SmallIntRange { .. }
            | Error::Overflow
            | Error::ZeroDivision
            | Error::StackOverflow(_) => FaultKind::Index,
            Error::Type { .. } | Error::Arity { .. } | Error::Definition(_) => FaultKind::Type,
            Error::NoSuchMethod { .. }
            | Error::NoSuchAttribute { .. }
            | Error::UndefinedGlobal(_)
            | Error::ModuleNotFound(_) => FaultKind::Resolution,
            Error::Io { .. } => FaultKind::Io,
            Error::Compile { .. } => FaultKind::Compile,
            Error::NotImplemented(_) => FaultKind::NotImplemented,
            Error::Raised { kind, .. } => *kind,
        }
    }

    pub fn type_mismatch(what: impl Into<String>, expected: &'static str) -> Self {
        Error::Type {
            what: what.into(),
            expected,
        }
    }
}

/// Status codes of the embedding API.
///
/// `Fail` from an invocation or a module constructor means an exception object was pushed onto
/// the stack, from [`Machine::read_string_to`](crate::Machine::read_string_to) that the string
/// did not fit. The other codes leave the stack as it was.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Error)]
pub enum ApiError {
    #[error("operation failed")]
    Fail,
    #[error("stack index out of range")]
    Index,
    #[error("value has the wrong type")]
    Type,
    #[error("not implemented")]
    NotImplemented,
}

impl ApiError {
    pub const fn code(self) -> i32 {
        match self {
            ApiError::Fail => -1,
            ApiError::Index => -2,
            ApiError::Type => -3,
            ApiError::NotImplemented => -4,
        }
    }
}
