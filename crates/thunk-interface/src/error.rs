//! Interface declaration error types.

/// Errors that can occur while reading and resolving interface declarations.
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    /// Failed to parse a C declaration or signature.
    #[error("invalid C declaration '{input}': {detail}")]
    InvalidDeclaration { input: String, detail: String },

    /// An annotation tag is not part of the recognized vocabulary.
    #[error("unknown annotation '{tag}' on {target}")]
    UnknownAnnotation { tag: String, target: String },

    /// An annotation is recognized but its body or placement is invalid.
    #[error("malformed annotation '{annotation}' on {target}: {detail}")]
    MalformedAnnotation {
        annotation: String,
        target: String,
        detail: String,
    },

    /// The interface file is structurally invalid.
    #[error("invalid interface: {detail}")]
    InvalidInterface { detail: String },

    /// TOML parsing error (including unrecognized fields).
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for interface operations.
pub type Result<T> = std::result::Result<T, InterfaceError>;
