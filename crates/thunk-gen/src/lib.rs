//! Thunk generation for guest/host library interfaces.
//!
//! Checks every annotated function against the layout analysis and the
//! boundary policy, then renders two Rust sources per library: a guest half
//! that packs arguments and calls the host by id, and a host half that
//! unpacks, converts and calls the native library.
//!
//! ## Modules
//!
//! - [`policy`]: Boundary policy checks producing a [`ThunkPlan`]
//! - [`model`]: The checked plan consumed by the renderers
//! - [`ident`]: SHA-256 export identifiers
//! - [`rust_type`]: Rust spelling of C types
//! - [`render`]: Guest and host source rendering
//! - [`pipeline`]: Plan-then-render entry point

pub mod error;
pub mod ident;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod render;
pub mod rust_type;

pub use error::{GenError, Result};
pub use ident::{callback_text, ThunkId};
pub use model::{CallbackPlan, FunctionPlan, ParamKind, ParamPlan, ThunkPlan, WrapperPlan};
pub use pipeline::{generate, GeneratedThunks};
pub use policy::{is_supported_callback_arity, Planner, SUPPORTED_CALLBACK_ARITIES};
pub use render::{guest::render_guest, host::render_host};
