//! Annotation vocabulary.
//!
//! Annotations arrive as strings (`"passthrough"`, `"version = 123"`) and are
//! parsed into [`AnnotationTag`]s, then resolved once per declaration into
//! plain records ([`LibraryAnnotations`], [`FunctionAnnotations`], ...) that
//! the analyzer and generator read. A tag outside the vocabulary is an
//! unknown-annotation error; a known tag with a bad value or placed on the
//! wrong kind of declaration is a malformed-annotation error.

use serde::Serialize;

use crate::csig::{self, CType};
use crate::error::{InterfaceError, Result};

/// Kind of declaration an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTarget {
    Library,
    Function,
    Parameter,
    Type,
    Field,
}

impl std::fmt::Display for AnnotationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationTarget::Library => write!(f, "library"),
            AnnotationTarget::Function => write!(f, "function"),
            AnnotationTarget::Parameter => write!(f, "parameter"),
            AnnotationTarget::Type => write!(f, "type"),
            AnnotationTarget::Field => write!(f, "field"),
        }
    }
}

/// Where the host-side symbol of a function is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostLoader {
    /// From the library opened by the host initializer.
    #[default]
    Library,
    /// From the global process namespace.
    Global,
}

/// A single recognized annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationTag {
    Passthrough,
    PtrPassthrough,
    AssumeCompatibleDataLayout,
    CustomHostImpl,
    CustomGuestEntrypoint,
    EmitLayoutWrappers,
    ReturnsGuestPointer,
    CallbackStub,
    UniformVaType(CType),
    Version(u32),
    HostLoader(HostLoader),
}

impl AnnotationTag {
    /// Parse a raw annotation string. `target` names the annotated declaration
    /// for diagnostics.
    pub fn parse(raw: &str, target: &str) -> Result<Self> {
        let (tag, value) = match raw.split_once('=') {
            Some((tag, value)) => (tag.trim(), Some(value.trim())),
            None => (raw.trim(), None),
        };

        let malformed = |detail: &str| InterfaceError::MalformedAnnotation {
            annotation: raw.to_string(),
            target: target.to_string(),
            detail: detail.to_string(),
        };
        let flag = |tag: AnnotationTag| match value {
            None => Ok(tag),
            Some(_) => Err(malformed("annotation takes no value")),
        };

        match tag {
            "passthrough" => flag(AnnotationTag::Passthrough),
            "ptr_passthrough" => flag(AnnotationTag::PtrPassthrough),
            "assume_compatible_data_layout" => flag(AnnotationTag::AssumeCompatibleDataLayout),
            "custom_host_impl" => flag(AnnotationTag::CustomHostImpl),
            "custom_guest_entrypoint" => flag(AnnotationTag::CustomGuestEntrypoint),
            "emit_layout_wrappers" => flag(AnnotationTag::EmitLayoutWrappers),
            "returns_guest_pointer" => flag(AnnotationTag::ReturnsGuestPointer),
            "callback_stub" => flag(AnnotationTag::CallbackStub),
            "uniform_va_type" => {
                let text = value.ok_or_else(|| malformed("expected 'uniform_va_type = <type>'"))?;
                let ty = csig::parse_type(text).map_err(|e| malformed(&e.to_string()))?;
                if ty.is_void() || matches!(ty, CType::Function(_) | CType::Array(..)) {
                    return Err(malformed("variadic element type must be a complete object type"));
                }
                Ok(AnnotationTag::UniformVaType(ty))
            }
            "version" => {
                let text = value.ok_or_else(|| malformed("expected 'version = <N>'"))?;
                text.parse()
                    .map(AnnotationTag::Version)
                    .map_err(|_| malformed("version must be a non-negative integer"))
            }
            "host_loader" => match value {
                Some("library") => Ok(AnnotationTag::HostLoader(HostLoader::Library)),
                Some("default") => Ok(AnnotationTag::HostLoader(HostLoader::Global)),
                _ => Err(malformed("expected 'host_loader = library' or 'host_loader = default'")),
            },
            _ => Err(InterfaceError::UnknownAnnotation {
                tag: tag.to_string(),
                target: target.to_string(),
            }),
        }
    }

    /// Canonical tag name.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationTag::Passthrough => "passthrough",
            AnnotationTag::PtrPassthrough => "ptr_passthrough",
            AnnotationTag::AssumeCompatibleDataLayout => "assume_compatible_data_layout",
            AnnotationTag::CustomHostImpl => "custom_host_impl",
            AnnotationTag::CustomGuestEntrypoint => "custom_guest_entrypoint",
            AnnotationTag::EmitLayoutWrappers => "emit_layout_wrappers",
            AnnotationTag::ReturnsGuestPointer => "returns_guest_pointer",
            AnnotationTag::CallbackStub => "callback_stub",
            AnnotationTag::UniformVaType(_) => "uniform_va_type",
            AnnotationTag::Version(_) => "version",
            AnnotationTag::HostLoader(_) => "host_loader",
        }
    }

    /// Whether this tag may be attached to the given kind of declaration.
    pub fn allowed_on(&self, target: AnnotationTarget) -> bool {
        use AnnotationTarget as T;
        match self {
            AnnotationTag::Passthrough | AnnotationTag::CallbackStub => target == T::Parameter,
            AnnotationTag::PtrPassthrough => matches!(target, T::Parameter | T::Field),
            AnnotationTag::AssumeCompatibleDataLayout => {
                matches!(target, T::Parameter | T::Field | T::Type)
            }
            AnnotationTag::CustomHostImpl
            | AnnotationTag::CustomGuestEntrypoint
            | AnnotationTag::ReturnsGuestPointer
            | AnnotationTag::UniformVaType(_)
            | AnnotationTag::HostLoader(_) => target == T::Function,
            AnnotationTag::EmitLayoutWrappers => target == T::Type,
            AnnotationTag::Version(_) => target == T::Library,
        }
    }
}

/// Parse a list of raw annotations and check each one's placement.
fn parse_all(raw: &[String], kind: AnnotationTarget, target: &str) -> Result<Vec<AnnotationTag>> {
    let mut tags: Vec<AnnotationTag> = Vec::with_capacity(raw.len());
    for text in raw {
        let tag = AnnotationTag::parse(text, target)?;
        if !tag.allowed_on(kind) {
            return Err(InterfaceError::MalformedAnnotation {
                annotation: text.clone(),
                target: target.to_string(),
                detail: format!("'{}' cannot be applied to a {kind}", tag.name()),
            });
        }
        if tags.iter().any(|t| t.name() == tag.name()) {
            return Err(InterfaceError::MalformedAnnotation {
                annotation: text.clone(),
                target: target.to_string(),
                detail: "duplicate annotation".to_string(),
            });
        }
        tags.push(tag);
    }
    Ok(tags)
}

/// Library-level annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryAnnotations {
    /// Shared object version suffix (`<lib>.so.N`).
    pub version: Option<u32>,
}

impl LibraryAnnotations {
    pub fn resolve(raw: &[String], target: &str) -> Result<Self> {
        let mut out = Self::default();
        for tag in parse_all(raw, AnnotationTarget::Library, target)? {
            if let AnnotationTag::Version(n) = tag {
                out.version = Some(n);
            }
        }
        Ok(out)
    }
}

/// Function-level annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionAnnotations {
    pub custom_host_impl: bool,
    pub custom_guest_entrypoint: bool,
    pub returns_guest_pointer: bool,
    #[serde(serialize_with = "serialize_ctype_opt")]
    pub uniform_va_type: Option<CType>,
    pub host_loader: HostLoader,
}

impl FunctionAnnotations {
    pub fn resolve(raw: &[String], target: &str) -> Result<Self> {
        let mut out = Self::default();
        for tag in parse_all(raw, AnnotationTarget::Function, target)? {
            match tag {
                AnnotationTag::CustomHostImpl => out.custom_host_impl = true,
                AnnotationTag::CustomGuestEntrypoint => out.custom_guest_entrypoint = true,
                AnnotationTag::ReturnsGuestPointer => out.returns_guest_pointer = true,
                AnnotationTag::UniformVaType(ty) => out.uniform_va_type = Some(ty),
                AnnotationTag::HostLoader(loader) => out.host_loader = loader,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Per-parameter annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParamAnnotations {
    pub passthrough: bool,
    pub ptr_passthrough: bool,
    pub assume_compatible: bool,
    pub callback_stub: bool,
}

impl ParamAnnotations {
    pub fn resolve(raw: &[String], target: &str) -> Result<Self> {
        let mut out = Self::default();
        for tag in parse_all(raw, AnnotationTarget::Parameter, target)? {
            match tag {
                AnnotationTag::Passthrough => out.passthrough = true,
                AnnotationTag::PtrPassthrough => out.ptr_passthrough = true,
                AnnotationTag::AssumeCompatibleDataLayout => out.assume_compatible = true,
                AnnotationTag::CallbackStub => out.callback_stub = true,
                _ => {}
            }
        }
        Ok(out)
    }

    /// Whether any annotation suppresses the pointee compatibility check.
    pub fn skips_pointee_check(&self) -> bool {
        self.passthrough || self.ptr_passthrough || self.assume_compatible
    }
}

/// Record-level annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeAnnotations {
    pub emit_layout_wrappers: bool,
    pub assume_compatible: bool,
}

impl TypeAnnotations {
    pub fn resolve(raw: &[String], target: &str) -> Result<Self> {
        let mut out = Self::default();
        for tag in parse_all(raw, AnnotationTarget::Type, target)? {
            match tag {
                AnnotationTag::EmitLayoutWrappers => out.emit_layout_wrappers = true,
                AnnotationTag::AssumeCompatibleDataLayout => out.assume_compatible = true,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Record field annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldAnnotations {
    pub ptr_passthrough: bool,
    pub assume_compatible: bool,
}

impl FieldAnnotations {
    pub fn resolve(raw: &[String], target: &str) -> Result<Self> {
        let mut out = Self::default();
        for tag in parse_all(raw, AnnotationTarget::Field, target)? {
            match tag {
                AnnotationTag::PtrPassthrough => out.ptr_passthrough = true,
                AnnotationTag::AssumeCompatibleDataLayout => out.assume_compatible = true,
                _ => {}
            }
        }
        Ok(out)
    }
}

fn serialize_ctype_opt<S: serde::Serializer>(
    ty: &Option<CType>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match ty {
        Some(ty) => serializer.serialize_some(&ty.to_string()),
        None => serializer.serialize_none(),
    }
}
