//! Error types for flowchat-engine

use thiserror::Error;

/// Result type alias using flowchat-engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from engine operations.
///
/// Expected runtime failures of a send (validation, transport) are reported as
/// outcomes, not through this type.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Api(#[from] flowchat_api::Error),

    /// An index did not address an existing entry
    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Commit was requested with no edit in progress
    #[error("No edit in progress")]
    NoActiveEdit,

    /// Retry was requested on a message not sent by the user
    #[error("Message {0} is not a user message")]
    NotAUserMessage(usize),

    /// Text was written to an image context block
    #[error("Context {0} holds an image, not text")]
    NotTextContext(usize),

    /// A rename would collide with another context block
    #[error("A context named '{0}' already exists")]
    DuplicateContextName(String),
}
