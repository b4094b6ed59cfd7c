//! Error types for the store engine.

use std::fmt;

use crate::path::{Path, PathError};

/// The registry a handler name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Getter,
    Mutation,
    Action,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Getter => write!(f, "getter"),
            HandlerKind::Mutation => write!(f, "mutation"),
            HandlerKind::Action => write!(f, "action"),
        }
    }
}

/// Errors raised by the store engine.
///
/// Errors produced by handler code (getters, mutations, actions) travel
/// through the engine as [`Error::Handler`] so callers can downcast them
/// back to their own error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("[smartstore] {0}")]
    Path(#[from] PathError),

    #[error("[smartstore] unknown getter: {name}")]
    UnknownGetter { name: String },

    #[error("[smartstore] unknown mutation type: {name}")]
    UnknownMutation { name: String },

    #[error("[smartstore] unknown action type: {name}")]
    UnknownAction { name: String },

    #[error("[smartstore] getter {name} is not a method-style getter")]
    NotAMethod { name: String },

    #[error("[smartstore] getter {name} is a method-style getter and needs an argument")]
    IsAMethod { name: String },

    #[error("[smartstore] duplicate {kind} key: {name}")]
    DuplicateKey { kind: HandlerKind, name: String },

    #[error("[smartstore] no module registered at '{path}'")]
    ModuleNotFound { path: Path },

    #[error("[smartstore] a module is already registered at '{path}'")]
    ModuleExists { path: Path },

    #[error("[smartstore] the root module cannot be registered or unregistered")]
    RootModule,

    #[error("[smartstore] no state at '{path}'")]
    StateNotFound { path: Path },

    #[error("[smartstore] state at '{path}' is not an object and cannot hold nested modules")]
    StateNotObject { path: Path },

    #[error("[smartstore] state is already borrowed by a running mutation")]
    Reentrant,

    #[error("[smartstore] json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Handler(#[source] Box<dyn std::error::Error + 'static>),
}

impl Error {
    /// Wrap an error raised by handler code.
    pub fn handler<E: std::error::Error + 'static>(error: E) -> Self {
        Error::Handler(Box::new(error))
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
