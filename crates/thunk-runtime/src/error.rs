//! Runtime errors.

use thiserror::Error;

/// Errors surfaced by host library loading and capability installation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The host shared object could not be opened.
    #[error("failed to load host library '{name}': {source}")]
    LibraryLoad {
        name: String,
        #[source]
        source: libloading::Error,
    },

    /// A symbol is missing from the host library.
    #[error("symbol '{name}' not found in {library}: {source}")]
    MissingSymbol {
        name: String,
        library: String,
        #[source]
        source: libloading::Error,
    },

    /// A capability was installed twice.
    #[error("{capability} is already installed")]
    AlreadyInstalled { capability: &'static str },
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
