//! Error types for module compilation and contexts.

use smartstore_engine::{Error as EngineError, HandlerKind, Path, PathError};

/// Errors raised by the module layer.
///
/// Engine errors are wrapped in [`Error::Engine`]. Errors raised by member
/// bodies cross the engine as handler errors and come back out unchanged.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "[smartstore] module is already compiled at '{existing}' and cannot be \
         compiled again at '{requested}'; use duplicate() to place it twice"
    )]
    ModuleReused { existing: Path, requested: Path },

    #[error("[smartstore] module is not compiled yet, so its {what} is unknown")]
    NotCompiled { what: &'static str },

    #[error("[smartstore] module at '{path}' is not registered in this store")]
    NotRegistered { path: Path },

    #[error("[smartstore] the store behind this context has been dropped")]
    StoreDropped,

    #[error("[smartstore] {kind} '{name}' is not declared by this module")]
    UnknownMember { kind: HandlerKind, name: String },

    #[error("[smartstore] {kind} '{name}' is declared twice at the same inheritance depth")]
    DuplicateMember { kind: HandlerKind, name: String },

    #[error("[smartstore] no nested module under key '{key}'")]
    UnknownChild { key: String },

    #[error("[smartstore] nested module '{key}' holds {actual} state, not {requested}")]
    ChildType {
        key: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("[smartstore] instance is not bound to a store yet")]
    NotInjected,

    #[error("[smartstore] {member} was not provided to inject")]
    NotProvided { member: String },

    #[error("[smartstore] invalid message object: {reason}")]
    InvalidMessage { reason: &'static str },

    #[error(transparent)]
    Engine(EngineError),

    #[error("[smartstore] json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Custom { message: String },
}

impl Error {
    /// An error raised by user code inside a member.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom {
            message: message.into(),
        }
    }
}

/// Result type alias for module operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<EngineError> for Error {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Handler(inner) => match inner.downcast::<Error>() {
                Ok(error) => *error,
                Err(inner) => Error::Engine(EngineError::Handler(inner)),
            },
            other => Error::Engine(other),
        }
    }
}

impl From<PathError> for Error {
    fn from(error: PathError) -> Self {
        Error::Engine(EngineError::Path(error))
    }
}

impl From<Error> for EngineError {
    fn from(error: Error) -> Self {
        match error {
            Error::Engine(error) => error,
            other => EngineError::handler(other),
        }
    }
}
