//! Resolved record and enum declarations.

use std::collections::BTreeMap;

use crate::annotation::{FieldAnnotations, TypeAnnotations};
use crate::csig::{self, CType};
use crate::declaration::{TypeDecl, TypeKind};
use crate::error::{InterfaceError, Result};

/// A record member on one side of the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: CType,
    pub annotations: FieldAnnotations,
}

/// What a named type is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// A struct with guest and host member lists (in declaration order).
    Struct {
        guest_fields: Vec<FieldDecl>,
        host_fields: Vec<FieldDecl>,
    },
    /// An enumeration stored as its underlying integer type.
    Enum { underlying: CType },
    /// Forward declaration without a definition.
    Incomplete,
}

/// A resolved `[[types]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecl {
    pub name: String,
    pub kind: RecordKind,
    pub annotations: TypeAnnotations,
}

impl RecordDecl {
    /// Resolve a raw type declaration: parse member declarations and
    /// validate annotations.
    pub fn resolve(decl: &TypeDecl) -> Result<Self> {
        let invalid = |detail: String| InterfaceError::InvalidInterface { detail };
        let annotations = TypeAnnotations::resolve(&decl.annotations, &decl.name)?;

        let has_members =
            decl.fields.is_some() || decl.guest_fields.is_some() || decl.host_fields.is_some();

        let kind = match decl.kind {
            TypeKind::Struct => {
                let (Some(guest), Some(host)) = (decl.guest_members(), decl.host_members()) else {
                    return Err(invalid(format!(
                        "struct '{}' must declare fields for both guest and host (or kind = \"incomplete\")",
                        decl.name
                    )));
                };
                let guest_fields = resolve_fields(decl, guest)?;
                let host_fields = resolve_fields(decl, host)?;

                for field_name in decl.field_annotations.keys() {
                    let known = guest_fields.iter().chain(&host_fields).any(|f| &f.name == field_name);
                    if !known {
                        return Err(invalid(format!(
                            "field annotations for unknown field '{}.{field_name}'",
                            decl.name
                        )));
                    }
                }
                RecordKind::Struct { guest_fields, host_fields }
            }
            TypeKind::Enum => {
                if has_members {
                    return Err(invalid(format!("enum '{}' cannot declare fields", decl.name)));
                }
                let underlying = match &decl.underlying {
                    Some(text) => csig::parse_type(text)?,
                    None => CType::UnsignedInt,
                };
                if !is_integer(&underlying) {
                    return Err(invalid(format!(
                        "enum '{}' has non-integer underlying type '{underlying}'",
                        decl.name
                    )));
                }
                RecordKind::Enum { underlying }
            }
            TypeKind::Incomplete => {
                if has_members {
                    return Err(invalid(format!(
                        "incomplete type '{}' cannot declare fields",
                        decl.name
                    )));
                }
                RecordKind::Incomplete
            }
        };

        if decl.underlying.is_some() && !matches!(kind, RecordKind::Enum { .. }) {
            return Err(invalid(format!(
                "'underlying' is only valid for enums (on '{}')",
                decl.name
            )));
        }

        Ok(Self {
            name: decl.name.clone(),
            kind,
            annotations,
        })
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self.kind, RecordKind::Incomplete)
    }

    /// Guest members of a struct (empty for other kinds).
    pub fn guest_fields(&self) -> &[FieldDecl] {
        match &self.kind {
            RecordKind::Struct { guest_fields, .. } => guest_fields,
            _ => &[],
        }
    }

    /// Host members of a struct (empty for other kinds).
    pub fn host_fields(&self) -> &[FieldDecl] {
        match &self.kind {
            RecordKind::Struct { host_fields, .. } => host_fields,
            _ => &[],
        }
    }
}

fn is_integer(ty: &CType) -> bool {
    ty.is_primitive()
        && !matches!(
            ty.strip_const(),
            CType::Float | CType::Double | CType::LongDouble | CType::Bool
        )
}

fn resolve_fields(decl: &TypeDecl, members: &[String]) -> Result<Vec<FieldDecl>> {
    let mut fields: Vec<FieldDecl> = Vec::with_capacity(members.len());
    for member in members {
        let (ty, name) = csig::parse_declaration(member)?;
        let Some(name) = name else {
            return Err(InterfaceError::InvalidInterface {
                detail: format!("member '{member}' of '{}' has no name", decl.name),
            });
        };
        if ty.is_void() || matches!(ty, CType::Function(_)) {
            return Err(InterfaceError::InvalidInterface {
                detail: format!("member '{name}' of '{}' has invalid type '{ty}'", decl.name),
            });
        }
        if fields.iter().any(|f| f.name == name) {
            return Err(InterfaceError::InvalidInterface {
                detail: format!("duplicate member '{name}' in '{}'", decl.name),
            });
        }
        let raw = decl
            .field_annotations
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let annotations = FieldAnnotations::resolve(raw, &format!("{}.{name}", decl.name))?;
        fields.push(FieldDecl { name, ty, annotations });
    }
    Ok(fields)
}

/// All named types of an interface, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRegistry {
    records: BTreeMap<String, RecordDecl>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record. Duplicate names are rejected.
    pub fn insert(&mut self, record: RecordDecl) -> Result<()> {
        if self.records.contains_key(&record.name) {
            return Err(InterfaceError::InvalidInterface {
                detail: format!("type '{}' declared more than once", record.name),
            });
        }
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RecordDecl> {
        self.records.get(name)
    }

    /// Whether `name` refers to a declared type with a definition.
    pub fn is_complete(&self, name: &str) -> bool {
        self.get(name).is_some_and(|r| !r.is_incomplete())
    }

    /// Records in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordDecl> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::InterfaceDeclaration;

    fn types(toml: &str) -> Vec<TypeDecl> {
        let input = format!("[library]\nname = \"libtest\"\n{toml}");
        InterfaceDeclaration::parse(&input).unwrap().types
    }

    #[test]
    fn resolve_struct_fields() {
        let decls = types(
            r#"
[[types]]
name = "A"
guest-fields = ["int b", "char name[16]"]
host-fields = ["char name[16]", "int b"]
field-annotations = { b = ["assume_compatible_data_layout"] }
"#,
        );
        let record = RecordDecl::resolve(&decls[0]).unwrap();
        assert_eq!(record.guest_fields()[0].name, "b");
        assert_eq!(record.host_fields()[0].name, "name");
        assert_eq!(
            record.host_fields()[0].ty,
            CType::Array(Box::new(CType::Char), 16)
        );
        assert!(record.guest_fields()[0].annotations.assume_compatible);
    }

    #[test]
    fn resolve_enum_default_underlying() {
        let decls = types("[[types]]\nname = \"E\"\nkind = \"enum\"\n");
        let record = RecordDecl::resolve(&decls[0]).unwrap();
        assert_eq!(
            record.kind,
            RecordKind::Enum { underlying: CType::UnsignedInt }
        );

        let decls = types("[[types]]\nname = \"E\"\nkind = \"enum\"\nunderlying = \"double\"\n");
        assert!(RecordDecl::resolve(&decls[0]).is_err());
    }

    #[test]
    fn struct_without_fields_rejected() {
        let decls = types("[[types]]\nname = \"A\"\n");
        let err = RecordDecl::resolve(&decls[0]).unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }

    #[test]
    fn incomplete_with_fields_rejected() {
        let decls = types("[[types]]\nname = \"B\"\nkind = \"incomplete\"\nfields = [\"int a\"]\n");
        assert!(RecordDecl::resolve(&decls[0]).is_err());
    }

    #[test]
    fn duplicate_member_rejected() {
        let decls = types("[[types]]\nname = \"A\"\nfields = [\"int a\", \"long a\"]\n");
        let err = RecordDecl::resolve(&decls[0]).unwrap_err();
        assert!(err.to_string().contains("duplicate member"));
    }

    #[test]
    fn annotation_for_unknown_field_rejected() {
        let decls = types(
            "[[types]]\nname = \"A\"\nfields = [\"int a\"]\nfield-annotations = { z = [\"ptr_passthrough\"] }\n",
        );
        assert!(RecordDecl::resolve(&decls[0]).is_err());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let decls = types("[[types]]\nname = \"B\"\nkind = \"incomplete\"\n");
        let mut registry = TypeRegistry::new();
        registry.insert(RecordDecl::resolve(&decls[0]).unwrap()).unwrap();
        assert!(registry.insert(RecordDecl::resolve(&decls[0]).unwrap()).is_err());
        assert!(registry.get("B").is_some());
        assert!(!registry.is_complete("B"));
        assert!(!registry.is_complete("missing"));
    }
}
