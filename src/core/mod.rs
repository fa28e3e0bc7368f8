//! Core types shared by every part of ghflow.
//!
//! - [`error`]: the [`EngineError`] taxonomy and CLI-facing [`ErrorContext`]
//! - [`value`]: [`Value`], [`ValueType`] and the [`Params`] binding

pub mod error;
pub mod value;

pub use error::{EngineError, ErrorContext, ErrorKind, user_friendly_error};
pub use value::{Params, Value, ValueType};

/// Result alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
