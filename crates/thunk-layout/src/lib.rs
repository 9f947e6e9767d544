//! Layout analysis for guest/host thunks.
//!
//! Computes C record layouts under the guest and host data models and
//! classifies every record as `Identical`, `Repackable` or `Incompatible`
//! per guest pointer width.
//!
//! ## Modules
//!
//! - [`abi`]: Guest ABI selection and C data models
//! - [`data_layout`]: Record size, alignment and member offsets
//! - [`classify`]: Layout-compatibility classification

pub mod abi;
pub mod classify;
pub mod data_layout;
pub mod error;

pub use abi::{DataModel, GuestAbi, PointerWidth, TypeSize};
pub use classify::{classify, LayoutAnalysis, LayoutAnalyzer, RepackField, TypeLayoutClass};
pub use data_layout::{FieldLayout, LayoutComputer, RecordLayout};
pub use error::{LayoutError, Result};
