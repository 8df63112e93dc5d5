//! Emission errors
//!
//! These are contract or I/O failures. User errors are diagnostics and stop
//! the pipeline before emission.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("unresolved type reference in {0}")]
    UnresolvedType(String),

    #[error("{backend} backend cannot emit {what}")]
    Unsupported { backend: &'static str, what: String },

    #[error("intrinsic {name} expects constant arguments")]
    IntrinsicArgument { name: String },

    #[error("method {0} needs more registers than the VM provides")]
    OutOfRegisters(String),
}
