//! Generation error types.

use thunk_interface::InterfaceError;
use thunk_layout::LayoutError;

/// Errors that abort thunk generation. No output is produced on error.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// Declaration or annotation error from the interface front end.
    #[error(transparent)]
    Interface(#[from] InterfaceError),

    /// Layout analysis error (incomplete or recursive type).
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// An annotation is valid on its own but not in this combination.
    #[error("malformed annotation on '{function}': {detail}")]
    MalformedAnnotation { function: String, detail: String },

    /// A parameter whose layout cannot cross the boundary.
    #[error("unsupported parameter type in '{function}' parameter {index} ({ty}): {detail}")]
    UnsupportedParameter {
        function: String,
        index: usize,
        ty: String,
        detail: String,
    },

    /// A return type whose layout cannot cross the boundary.
    #[error("unsupported return type in '{function}' ({ty}): {detail}")]
    UnsupportedReturn {
        function: String,
        ty: String,
        detail: String,
    },

    /// Variadic function without `uniform_va_type`.
    #[error("variadic function '{function}' requires a uniform_va_type annotation")]
    VariadicWithoutUniformType { function: String },

    /// Function pointer return without `returns_guest_pointer`.
    #[error("function '{function}' returns a function pointer but is not annotated returns_guest_pointer")]
    FunctionPointerReturn { function: String },

    /// Callback arity outside the set the runtime supports.
    #[error("unsupported callback arity {arity} for '{signature}'")]
    UnsupportedCallbackArity { signature: String, arity: usize },

    /// A C type with no Rust spelling on both sides.
    #[error("unsupported type '{ty}': {detail}")]
    UnsupportedType { ty: String, detail: String },
}

/// Result type alias for generation.
pub type Result<T> = std::result::Result<T, GenError>;
