//! Layout-compatibility classification.
//!
//! Each record is classified per guest pointer width by comparing its guest
//! and host layouts:
//!
//! - `Identical`: same members in the same order at the same offsets and
//!   sizes, with identical member types, recursively.
//! - `Repackable`: not identical, but guest and host declare the same set of
//!   member names and every member is itself identical or repackable. The
//!   members are listed in guest declaration order. An enum whose
//!   underlying integer differs in size is repackable with no members: it
//!   converts by an integer cast.
//! - `Incompatible`: anything else. Pointer members make a record
//!   incompatible unless annotated `ptr_passthrough`, or
//!   `assume_compatible_data_layout` with a pointee that is identical.
//!
//! Referencing an incomplete type where its layout matters is an error, never
//! a classification. That includes pointer members not annotated
//! `ptr_passthrough`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thunk_interface::{CType, FieldAnnotations, FieldDecl, RecordDecl, RecordKind, TypeRegistry};

use crate::abi::{DataModel, GuestAbi, PointerWidth};
use crate::data_layout::{LayoutComputer, RecordLayout};
use crate::error::{LayoutError, Result};

/// A member of a repackable record, in guest declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepackField {
    pub name: String,
    /// Guest-side member type.
    #[serde(serialize_with = "serialize_ctype")]
    pub ty: CType,
}

/// Layout verdict for one type at one guest pointer width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "class", content = "fields", rename_all = "lowercase")]
pub enum TypeLayoutClass {
    Identical,
    Repackable(Vec<RepackField>),
    Incompatible,
}

impl TypeLayoutClass {
    pub fn is_identical(&self) -> bool {
        matches!(self, TypeLayoutClass::Identical)
    }

    pub fn is_incompatible(&self) -> bool {
        matches!(self, TypeLayoutClass::Incompatible)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeLayoutClass::Identical => "identical",
            TypeLayoutClass::Repackable(_) => "repackable",
            TypeLayoutClass::Incompatible => "incompatible",
        }
    }
}

impl std::fmt::Display for TypeLayoutClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Verdict for a single member, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MemberClass {
    Identical,
    Convertible,
    Incompatible,
}

/// Computed classifications for every declared record at one guest ABI.
#[derive(Debug, Clone)]
pub struct LayoutAnalysis {
    pub abi: GuestAbi,
    classes: BTreeMap<(String, PointerWidth), TypeLayoutClass>,
    guest_layouts: BTreeMap<String, RecordLayout>,
    host_layouts: BTreeMap<String, RecordLayout>,
}

impl LayoutAnalysis {
    /// Class of a record. `None` for incomplete or undeclared names.
    pub fn class_of(&self, name: &str) -> Option<&TypeLayoutClass> {
        self.classes.get(&(name.to_string(), self.abi.pointer_width()))
    }

    pub fn guest_layout(&self, name: &str) -> Option<&RecordLayout> {
        self.guest_layouts.get(name)
    }

    pub fn host_layout(&self, name: &str) -> Option<&RecordLayout> {
        self.host_layouts.get(name)
    }

    /// All classified records in name order.
    pub fn classes(&self) -> impl Iterator<Item = (&str, &TypeLayoutClass)> {
        self.classes.iter().map(|((name, _), class)| (name.as_str(), class))
    }
}

/// Classifies records of one interface for one guest ABI.
pub struct LayoutAnalyzer<'a> {
    registry: &'a TypeRegistry,
    abi: GuestAbi,
    guest_model: DataModel,
    cache: BTreeMap<String, TypeLayoutClass>,
    in_progress: BTreeSet<String>,
}

impl<'a> LayoutAnalyzer<'a> {
    pub fn new(registry: &'a TypeRegistry, abi: GuestAbi) -> Self {
        Self {
            registry,
            abi,
            guest_model: abi.data_model(),
            cache: BTreeMap::new(),
            in_progress: BTreeSet::new(),
        }
    }

    pub fn width(&self) -> PointerWidth {
        self.abi.pointer_width()
    }

    /// Classify every complete record and compute both sides' layouts.
    pub fn analyze(mut self) -> Result<LayoutAnalysis> {
        let registry = self.registry;
        let mut guest_layouts = BTreeMap::new();
        let mut host_layouts = BTreeMap::new();
        for record in registry.iter().filter(|r| !r.is_incomplete()) {
            self.classify(&record.name)?;
            let guest = LayoutComputer::guest(registry, self.guest_model).record_layout(&record.name)?;
            let host = LayoutComputer::host(registry).record_layout(&record.name)?;
            guest_layouts.insert(record.name.clone(), guest);
            host_layouts.insert(record.name.clone(), host);
        }

        let width = self.width();
        let classes = self
            .cache
            .into_iter()
            .map(|(name, class)| ((name, width), class))
            .collect();
        Ok(LayoutAnalysis {
            abi: self.abi,
            classes,
            guest_layouts,
            host_layouts,
        })
    }

    /// Classify a named record.
    pub fn classify(&mut self, name: &str) -> Result<TypeLayoutClass> {
        if let Some(class) = self.cache.get(name) {
            return Ok(class.clone());
        }
        let registry = self.registry;
        let record = registry
            .get(name)
            .ok_or_else(|| LayoutError::IncompleteType { name: name.to_string() })?;

        if !self.in_progress.insert(name.to_string()) {
            return Err(LayoutError::RecursiveType { name: name.to_string() });
        }
        let class = self.classify_record(record);
        self.in_progress.remove(name);
        let class = class?;

        log::debug!("{name} is {class} at {}", self.width());
        self.cache.insert(name.to_string(), class.clone());
        Ok(class)
    }

    fn classify_record(&mut self, record: &RecordDecl) -> Result<TypeLayoutClass> {
        match &record.kind {
            RecordKind::Incomplete => Err(LayoutError::IncompleteType {
                name: record.name.clone(),
            }),
            RecordKind::Enum { underlying } => {
                let guest = self.guest_model.scalar(underlying).map(|s| s.size_bytes);
                let host = DataModel::host().scalar(underlying).map(|s| s.size_bytes);
                Ok(match (guest, host) {
                    (Some(g), Some(h)) if g == h => TypeLayoutClass::Identical,
                    (Some(_), Some(_)) => TypeLayoutClass::Repackable(Vec::new()),
                    _ => TypeLayoutClass::Incompatible,
                })
            }
            RecordKind::Struct { guest_fields, host_fields } => {
                if record.annotations.assume_compatible {
                    log::debug!("{} assumed compatible", record.name);
                    return Ok(TypeLayoutClass::Identical);
                }
                self.classify_struct(record, guest_fields, host_fields)
            }
        }
    }

    fn classify_struct(
        &mut self,
        record: &RecordDecl,
        guest_fields: &[FieldDecl],
        host_fields: &[FieldDecl],
    ) -> Result<TypeLayoutClass> {
        let registry = self.registry;
        let guest = LayoutComputer::guest(registry, self.guest_model).record_layout(&record.name)?;
        let host = LayoutComputer::host(registry).record_layout(&record.name)?;

        let same_names = guest_fields.len() == host_fields.len()
            && guest_fields
                .iter()
                .all(|g| host_fields.iter().any(|h| h.name == g.name));
        if !same_names {
            log::debug!("{}: member names differ between guest and host", record.name);
            return Ok(TypeLayoutClass::Incompatible);
        }

        let mut overall = MemberClass::Identical;
        for g in guest_fields {
            let Some(h) = host_fields.iter().find(|h| h.name == g.name) else {
                return Ok(TypeLayoutClass::Incompatible);
            };
            let annotations = merge_field_annotations(&g.annotations, &h.annotations);
            let class = self.classify_member(&g.ty, &h.ty, &annotations)?;
            if class == MemberClass::Incompatible {
                log::debug!("{}.{}: incompatible member", record.name, g.name);
            }
            // The weakest member verdict wins
            overall = overall.max(class);
        }

        let same_placement = guest.size == host.size
            && guest.alignment == host.alignment
            && guest.fields == host.fields;

        Ok(match overall {
            MemberClass::Incompatible => TypeLayoutClass::Incompatible,
            MemberClass::Identical if same_placement => TypeLayoutClass::Identical,
            _ => TypeLayoutClass::Repackable(
                guest_fields
                    .iter()
                    .map(|f| RepackField {
                        name: f.name.clone(),
                        ty: f.ty.clone(),
                    })
                    .collect(),
            ),
        })
    }

    /// Compare the guest and host type of one member.
    fn classify_member(
        &mut self,
        guest: &CType,
        host: &CType,
        annotations: &FieldAnnotations,
    ) -> Result<MemberClass> {
        let (guest, host) = (guest.strip_const(), host.strip_const());
        if guest != host {
            return Ok(MemberClass::Incompatible);
        }

        match guest {
            CType::Pointer(pointee) => {
                let width = self.width();
                let as_raw_pointer = if width == PointerWidth::W64 {
                    MemberClass::Identical
                } else {
                    MemberClass::Convertible
                };
                if annotations.ptr_passthrough {
                    return Ok(as_raw_pointer);
                }
                if let CType::Named(name) = pointee.innermost() {
                    if !self.registry.is_complete(name) {
                        log::debug!("pointer member to incomplete type {name} needs ptr_passthrough");
                        return Err(LayoutError::IncompleteType { name: name.clone() });
                    }
                }
                if annotations.assume_compatible
                    && self.classify_pointee(pointee)? == TypeLayoutClass::Identical
                {
                    return Ok(as_raw_pointer);
                }
                Ok(MemberClass::Incompatible)
            }
            CType::Named(name) => Ok(match self.classify(name)? {
                TypeLayoutClass::Identical => MemberClass::Identical,
                TypeLayoutClass::Repackable(_) => MemberClass::Convertible,
                TypeLayoutClass::Incompatible => MemberClass::Incompatible,
            }),
            CType::Array(elem, _) => self.classify_member(elem, elem, annotations),
            ty => {
                let g = self.guest_model.scalar(ty);
                let h = DataModel::host().scalar(ty);
                Ok(match (g, h) {
                    (Some(g), Some(h)) if g == h => MemberClass::Identical,
                    (Some(_), Some(_)) => MemberClass::Convertible,
                    _ => MemberClass::Incompatible,
                })
            }
        }
    }

    /// Classify the target of a pointer.
    ///
    /// Records use their record class. Primitives are identical when guest
    /// and host sizes agree. A pointer pointee is identical only for 64-bit
    /// guests with an identical inner pointee.
    pub fn classify_pointee(&mut self, pointee: &CType) -> Result<TypeLayoutClass> {
        match pointee.strip_const() {
            CType::Void => Ok(TypeLayoutClass::Identical),
            CType::Named(name) => {
                if !self.registry.is_complete(name) {
                    return Err(LayoutError::IncompleteType { name: name.clone() });
                }
                self.classify(name)
            }
            CType::Pointer(inner) => {
                let inner = self.classify_pointee(inner)?;
                Ok(if self.width() == PointerWidth::W64 && inner.is_identical() {
                    TypeLayoutClass::Identical
                } else {
                    TypeLayoutClass::Incompatible
                })
            }
            CType::Array(elem, _) => self.classify_pointee(elem),
            CType::Function(_) => Ok(if self.width() == PointerWidth::W64 {
                TypeLayoutClass::Identical
            } else {
                TypeLayoutClass::Incompatible
            }),
            ty => {
                let g = self.guest_model.scalar(ty);
                let h = DataModel::host().scalar(ty);
                Ok(if g.is_some() && g.map(|s| s.size_bytes) == h.map(|s| s.size_bytes) {
                    TypeLayoutClass::Identical
                } else {
                    TypeLayoutClass::Incompatible
                })
            }
        }
    }

    /// Members present on both sides, in guest order, for records whose
    /// member names match exactly. Used to force layout wrappers for records
    /// classified `Incompatible`.
    pub fn matching_fields(&self, name: &str) -> Option<Vec<RepackField>> {
        let record = self.registry.get(name)?;
        let (guest, host) = (record.guest_fields(), record.host_fields());
        if guest.is_empty() || guest.len() != host.len() {
            return None;
        }
        guest
            .iter()
            .map(|g| {
                host.iter().find(|h| h.name == g.name).map(|_| RepackField {
                    name: g.name.clone(),
                    ty: g.ty.clone(),
                })
            })
            .collect()
    }
}

fn merge_field_annotations(a: &FieldAnnotations, b: &FieldAnnotations) -> FieldAnnotations {
    FieldAnnotations {
        ptr_passthrough: a.ptr_passthrough || b.ptr_passthrough,
        assume_compatible: a.assume_compatible || b.assume_compatible,
    }
}

fn serialize_ctype<S: serde::Serializer>(ty: &CType, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&ty.to_string())
}

/// Classify a single named record at the given width.
pub fn classify(registry: &TypeRegistry, name: &str, width: PointerWidth) -> Result<TypeLayoutClass> {
    LayoutAnalyzer::new(registry, GuestAbi::from_width(width)).classify(name)
}
