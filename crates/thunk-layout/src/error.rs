//! Layout analysis errors.

use thiserror::Error;

/// Errors that can occur while computing or classifying layouts.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// A type was used where a complete definition is required.
    #[error("incomplete type '{name}'")]
    IncompleteType { name: String },

    /// A record contains itself by value.
    #[error("recursive type '{name}' contains itself by value")]
    RecursiveType { name: String },

    /// A type cannot be laid out (e.g. a bare function type as a member).
    #[error("cannot compute layout of '{ty}': {detail}")]
    Unsupported { ty: String, detail: String },

    /// A size or offset does not fit in 64 bits.
    #[error("layout of '{ty}' overflows")]
    TooLarge { ty: String },

    #[error("unknown guest ABI '{name}' (expected x86-32 or x86-64)")]
    UnknownAbi { name: String },
}

/// Result type alias for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;
