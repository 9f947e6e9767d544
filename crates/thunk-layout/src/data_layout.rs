//! C data layout computation for records on either side of the boundary.

use std::collections::BTreeSet;

use serde::Serialize;
use thunk_interface::{CType, FieldDecl, RecordKind, TypeRegistry};

use crate::abi::{DataModel, TypeSize};
use crate::error::{LayoutError, Result};

/// Placement of one record member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLayout {
    pub name: String,
    /// C spelling of the member type.
    #[serde(rename = "type")]
    pub ty: String,
    pub offset: u64,
    pub size: u64,
}

/// Layout of a record on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordLayout {
    pub size: u64,
    pub alignment: u64,
    pub fields: Vec<FieldLayout>,
}

/// Round `offset` up to the next multiple of `align`. `None` on overflow.
pub(crate) fn align_up(offset: u64, align: u64) -> Option<u64> {
    if align == 0 {
        return Some(offset);
    }
    offset.div_ceil(align).checked_mul(align)
}

/// Computes sizes and layouts under one data model, resolving named types
/// through the registry. `guest` selects which member list of a struct is
/// used.
pub struct LayoutComputer<'a> {
    registry: &'a TypeRegistry,
    model: DataModel,
    guest: bool,
    in_progress: BTreeSet<String>,
}

impl<'a> LayoutComputer<'a> {
    pub fn guest(registry: &'a TypeRegistry, model: DataModel) -> Self {
        Self {
            registry,
            model,
            guest: true,
            in_progress: BTreeSet::new(),
        }
    }

    pub fn host(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            model: DataModel::host(),
            guest: false,
            in_progress: BTreeSet::new(),
        }
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// Size and member alignment of any complete object type.
    pub fn type_size(&mut self, ty: &CType) -> Result<TypeSize> {
        if let Some(size) = self.model.scalar(ty) {
            return Ok(size);
        }
        match ty.strip_const() {
            CType::Array(elem_ty, len) => {
                let elem = self.type_size(elem_ty)?;
                let size = elem
                    .size_bytes
                    .checked_mul(*len)
                    .ok_or_else(|| LayoutError::TooLarge { ty: ty.to_string() })?;
                Ok(TypeSize::new(size, elem.alignment_bytes))
            }
            CType::Named(name) => {
                let record = self.record_layout(name)?;
                Ok(TypeSize::new(record.size, record.alignment))
            }
            other => Err(LayoutError::Unsupported {
                ty: other.to_string(),
                detail: "not an object type".to_string(),
            }),
        }
    }

    /// Layout of a named record or enum.
    pub fn record_layout(&mut self, name: &str) -> Result<RecordLayout> {
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| LayoutError::IncompleteType { name: name.to_string() })?;

        match &record.kind {
            RecordKind::Incomplete => Err(LayoutError::IncompleteType { name: name.to_string() }),
            RecordKind::Enum { underlying } => {
                let size = self.type_size(underlying)?;
                Ok(RecordLayout {
                    size: size.size_bytes,
                    alignment: size.alignment_bytes,
                    fields: Vec::new(),
                })
            }
            RecordKind::Struct { guest_fields, host_fields } => {
                if !self.in_progress.insert(name.to_string()) {
                    return Err(LayoutError::RecursiveType { name: name.to_string() });
                }
                let fields = if self.guest { guest_fields } else { host_fields };
                let layout = self.struct_layout(name, fields);
                self.in_progress.remove(name);
                layout
            }
        }
    }

    fn struct_layout(&mut self, name: &str, fields: &[FieldDecl]) -> Result<RecordLayout> {
        let too_large = || LayoutError::TooLarge { ty: name.to_string() };
        let mut offset: u64 = 0;
        let mut max_align: u64 = 1;
        let mut placed = Vec::with_capacity(fields.len());
        for field in fields {
            let fs = self.type_size(&field.ty)?;
            offset = align_up(offset, fs.alignment_bytes).ok_or_else(too_large)?;
            placed.push(FieldLayout {
                name: field.name.clone(),
                ty: field.ty.to_string(),
                offset,
                size: fs.size_bytes,
            });
            offset = offset.checked_add(fs.size_bytes).ok_or_else(too_large)?;
            max_align = max_align.max(fs.alignment_bytes);
        }
        Ok(RecordLayout {
            size: align_up(offset, max_align).ok_or_else(too_large)?,
            alignment: max_align,
            fields: placed,
        })
    }
}
