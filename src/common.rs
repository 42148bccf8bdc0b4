//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers.
pub type Id = internment::Intern<String>;

/// Intern a string into an [`Id`].
pub fn intern(s: impl Into<String>) -> Id {
    internment::Intern::new(s.into())
}

/// The single error type produced anywhere in the compiler.
///
/// Every error the compiler can raise is fatal: there is no partial output
/// and no recovery, so one flat enum with a message per variant is enough to
/// both report to the user and to match on in tests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("Lexer error: unexpected character {0:?} at {1}")]
    Lex(char, usize),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("\"{0}\" block is missing \"END {0}\"")]
    MissingEnd(String),

    #[error("{0} is not valid at the root level.")]
    InvalidAtRoot(String),

    #[error("Undefined type \"{0}\".")]
    UndefinedType(String),

    #[error("Undefined variable \"{0}\".")]
    UndefinedVariable(String),

    #[error("Undefined function \"{0}\".")]
    UndefinedFunction(String),

    #[error("Return value does not match function return type.")]
    ReturnTypeMismatch,

    #[error("{0}")]
    NotResolved(String),

    #[error("{0}")]
    Lowering(String),

    #[error("{0}")]
    Optimizer(String),

    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
