//! Annotated interface declarations for guest/host thunk generation.
//!
//! Reads `.thunks.toml` files describing a native library (its records,
//! functions and callback signatures plus annotations) and resolves them
//! into an [`Interface`] that the layout analyzer and thunk generator consume.
//!
//! ## Modules
//!
//! - [`csig`]: C declaration and signature parser
//! - [`annotation`]: Annotation vocabulary and resolved annotation records
//! - [`declaration`]: `.thunks.toml` declaration file parsing
//! - [`types`]: Resolved record and enum declarations
//! - [`interface`]: The resolved interface

pub mod annotation;
pub mod csig;
pub mod declaration;
pub mod error;
pub mod interface;
pub mod types;

pub use annotation::{
    AnnotationTag, FieldAnnotations, FunctionAnnotations, HostLoader, LibraryAnnotations,
    ParamAnnotations, TypeAnnotations,
};
pub use csig::{CParam, CSignature, CType, FunctionType};
pub use declaration::InterfaceDeclaration;
pub use error::{InterfaceError, Result};
pub use interface::{Interface, InterfaceCallback, InterfaceFunction, InterfaceParam, LibraryInfo};
pub use types::{FieldDecl, RecordDecl, RecordKind, TypeRegistry};
