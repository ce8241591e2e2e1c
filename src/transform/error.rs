//! Transform compilation and application errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The transform document is not a list of operations
    #[error("Transform must be a JSON array of operations")]
    NotAList,

    #[error("Operation {index}: unknown kind '{kind}'")]
    UnknownOperation { index: usize, kind: String },

    #[error("Operation {index}: {reason}")]
    MalformedOperation { index: usize, reason: String },

    #[error("Path '{path}' contains an empty segment")]
    EmptySegment { path: String },

    #[error("Path '{path}' uses forbidden segment '{segment}'")]
    ForbiddenSegment { path: String, segment: String },

    #[error("Path '{path}' exceeds maximum depth {max}")]
    TooDeep { path: String, max: usize },

    /// A write met a value that cannot hold the next segment
    #[error("Cannot write '{path}': '{segment}' is not an object")]
    NotAContainer { path: String, segment: String },

    /// A route parameter named by `from_param` was not captured
    #[error("Route parameter '{0}' is not available")]
    MissingParam(String),
}
