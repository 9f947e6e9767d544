//! Checked generation plan: what each thunk half does with every parameter.

use serde::Serialize;
use thunk_interface::{CType, FunctionType, HostLoader};
use thunk_layout::{GuestAbi, RepackField};

use crate::ident::ThunkId;

/// How a parameter crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum ParamKind {
    /// Converted through its `GuestRepr` (scalars, pointers to identical
    /// data, identical or repackable records by value).
    Convert,
    /// Kept in guest layout for a custom host implementation.
    Passthrough,
    /// Guest function pointer: trampoline allocated by the guest thunk and
    /// finalized by the host thunk.
    Callback,
    /// Function pointer the host never calls; replaced by an aborting stub.
    CallbackStub,
    /// Pointer to a repackable record, repacked around the call.
    RepackedPointer { record: String, is_const: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamPlan {
    /// Identifier used on both sides (`a0`, `a1`, ...).
    pub ident: String,
    #[serde(serialize_with = "serialize_ctype")]
    pub ty: CType,
    #[serde(flatten)]
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionPlan {
    pub name: String,
    pub id: ThunkId,
    pub params: Vec<ParamPlan>,
    #[serde(serialize_with = "serialize_ctype")]
    pub return_type: CType,
    /// Element type of the variadic tail.
    #[serde(serialize_with = "serialize_opt_ctype")]
    pub variadic: Option<CType>,
    pub custom_host_impl: bool,
    pub custom_guest_entrypoint: bool,
    pub host_loader: HostLoader,
}

impl FunctionPlan {
    /// The host side calls `impl_<lib>_<name>` instead of the native symbol.
    pub fn uses_external_host_impl(&self) -> bool {
        self.custom_host_impl || self.variadic.is_some()
    }

    /// Guest packing function name: `pack_<name>` or `pack_<name>_internal`.
    pub fn packer_name(&self) -> String {
        if self.variadic.is_some() {
            format!("pack_{}_internal", self.name)
        } else {
            format!("pack_{}", self.name)
        }
    }
}

/// A callback signature with a guest-to-host export entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackPlan {
    pub id: ThunkId,
    #[serde(serialize_with = "serialize_fn_type")]
    pub function_type: FunctionType,
}

/// Layout wrappers emitted for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "wrapper")]
pub enum WrapperPlan {
    /// Same bits on both sides.
    Identical { name: String },
    /// Guest-layout record plus field-by-field conversion.
    Repack { name: String, fields: Vec<RepackField> },
    /// Enum stored as a guest integer of a different width, converted with
    /// an integer cast.
    EnumCast {
        name: String,
        /// Rust integer type of the guest representation (`i32`, `u64`, ...).
        guest_int: String,
        guest_size: u64,
    },
    /// No wrappers; the record cannot be used by value.
    Omitted { name: String },
}

impl WrapperPlan {
    pub fn name(&self) -> &str {
        match self {
            WrapperPlan::Identical { name }
            | WrapperPlan::Repack { name, .. }
            | WrapperPlan::EnumCast { name, .. }
            | WrapperPlan::Omitted { name } => name,
        }
    }
}

/// Everything the renderers need for one library.
#[derive(Debug, Clone, Serialize)]
pub struct ThunkPlan {
    pub library: String,
    pub library_ident: String,
    pub shared_object: String,
    pub abi: GuestAbi,
    pub functions: Vec<FunctionPlan>,
    /// Distinct callback signatures, ordered by type.
    pub callbacks: Vec<CallbackPlan>,
    pub wrappers: Vec<WrapperPlan>,
}

impl ThunkPlan {
    /// Host export table length including the terminator.
    pub fn export_count(&self) -> usize {
        self.functions.len() + self.callbacks.len() + 1
    }

    pub fn needs_global_loader(&self) -> bool {
        self.functions
            .iter()
            .any(|f| !f.uses_external_host_impl() && f.host_loader == HostLoader::Global)
    }
}

fn serialize_ctype<S: serde::Serializer>(ty: &CType, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ty.to_string())
}

fn serialize_opt_ctype<S: serde::Serializer>(ty: &Option<CType>, serializer: S) -> Result<S::Ok, S::Error> {
    match ty {
        Some(ty) => serializer.serialize_some(&ty.to_string()),
        None => serializer.serialize_none(),
    }
}

fn serialize_fn_type<S: serde::Serializer>(ty: &FunctionType, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&crate::ident::callback_text(ty))
}
