//! The resolved interface: what the analyzer and generator consume.

use std::collections::BTreeMap;

use crate::annotation::{FunctionAnnotations, LibraryAnnotations, ParamAnnotations};
use crate::csig::{self, CSignature, CType, FunctionType};
use crate::declaration::InterfaceDeclaration;
use crate::error::{InterfaceError, Result};
use crate::types::{RecordDecl, TypeRegistry};

/// The library being thunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    /// Library name as declared (e.g., "libGL"). Also the shared object stem.
    pub name: String,
    /// Name usable inside Rust identifiers (e.g., "libGL", "libfoo_bar").
    pub ident: String,
    pub annotations: LibraryAnnotations,
}

impl LibraryInfo {
    /// Shared object file name the host loads: `<name>.so` or `<name>.so.<N>`.
    pub fn shared_object_name(&self) -> String {
        match self.annotations.version {
            Some(version) => format!("{}.so.{version}", self.name),
            None => format!("{}.so", self.name),
        }
    }
}

/// A function parameter with its annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceParam {
    /// Declared name, or empty.
    pub name: String,
    pub ty: CType,
    pub annotations: ParamAnnotations,
}

/// A function to thunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceFunction {
    pub name: String,
    pub return_type: CType,
    pub params: Vec<InterfaceParam>,
    pub is_variadic: bool,
    pub annotations: FunctionAnnotations,
    /// Canonical signature text (parameter names dropped).
    pub normalized_signature: String,
}

impl InterfaceFunction {
    /// The C function type of this function.
    pub fn function_type(&self) -> FunctionType {
        FunctionType {
            return_type: self.return_type.clone(),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            is_variadic: self.is_variadic,
        }
    }
}

/// A callback signature declared explicitly in `[[callbacks]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCallback {
    pub function_type: FunctionType,
    pub param_annotations: Vec<ParamAnnotations>,
}

/// A fully resolved interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub library: LibraryInfo,
    pub records: TypeRegistry,
    /// Functions in declaration order.
    pub functions: Vec<InterfaceFunction>,
    pub callbacks: Vec<InterfaceCallback>,
}

impl Interface {
    /// Resolve a raw declaration: parse every signature and member, and
    /// validate every annotation.
    pub fn resolve(decl: &InterfaceDeclaration) -> Result<Self> {
        let library = LibraryInfo {
            name: decl.library.name.clone(),
            ident: sanitize_ident(&decl.library.name),
            annotations: LibraryAnnotations::resolve(&decl.library.annotations, &decl.library.name)?,
        };

        let mut records = TypeRegistry::new();
        for ty in &decl.types {
            records.insert(RecordDecl::resolve(ty)?)?;
        }

        let mut functions: Vec<InterfaceFunction> = Vec::with_capacity(decl.functions.len());
        for func in &decl.functions {
            let sig = CSignature::parse(&func.signature)?;
            if functions.iter().any(|f| f.name == sig.name) {
                return Err(InterfaceError::InvalidInterface {
                    detail: format!("function '{}' declared more than once", sig.name),
                });
            }
            let annotations = FunctionAnnotations::resolve(&func.annotations, &sig.name)?;
            let param_annotations = resolve_param_annotations(
                &sig.name,
                &sig.parameters.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                &func.param_annotations,
            )?;
            let params = sig
                .parameters
                .iter()
                .zip(param_annotations)
                .map(|(p, annotations)| InterfaceParam {
                    name: p.name.clone(),
                    ty: p.param_type.clone(),
                    annotations,
                })
                .collect();

            log::debug!("resolved function {}", sig.normalized());
            functions.push(InterfaceFunction {
                name: sig.name.clone(),
                return_type: sig.return_type.clone(),
                params,
                is_variadic: sig.is_variadic,
                annotations,
                normalized_signature: sig.normalized(),
            });
        }

        let mut callbacks = Vec::with_capacity(decl.callbacks.len());
        for cb in &decl.callbacks {
            let function_type = match csig::parse_type(&cb.signature)? {
                CType::Function(f) => *f,
                // Accept the pointer spelling too: `int (*)(char, char)`
                other => match other.as_function_pointer() {
                    Some(f) => f.clone(),
                    None => {
                        return Err(InterfaceError::InvalidInterface {
                            detail: format!("callback '{}' is not a function type", cb.signature),
                        })
                    }
                },
            };
            let names = vec![""; function_type.params.len()];
            let param_annotations =
                resolve_param_annotations(&cb.signature, &names, &cb.param_annotations)?;
            callbacks.push(InterfaceCallback {
                function_type,
                param_annotations,
            });
        }

        Ok(Self {
            library,
            records,
            functions,
            callbacks,
        })
    }

    /// Parse and resolve a `.thunks.toml` string.
    pub fn parse(input: &str) -> Result<Self> {
        Self::resolve(&InterfaceDeclaration::parse(input)?)
    }

    /// Load and resolve a `.thunks.toml` file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        Self::resolve(&InterfaceDeclaration::load(path)?)
    }

    pub fn function(&self, name: &str) -> Option<&InterfaceFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Map `param-annotations` keys (index or name) to one annotation record per
/// parameter.
fn resolve_param_annotations(
    owner: &str,
    names: &[&str],
    raw: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<ParamAnnotations>> {
    let mut out = vec![ParamAnnotations::default(); names.len()];
    for (key, tags) in raw {
        let index = match key.parse::<usize>() {
            Ok(i) if i < names.len() => i,
            Ok(i) => {
                return Err(InterfaceError::InvalidInterface {
                    detail: format!(
                        "parameter index {i} out of range for '{owner}' ({} parameters)",
                        names.len()
                    ),
                })
            }
            Err(_) => names
                .iter()
                .position(|n| !n.is_empty() && n == key)
                .ok_or_else(|| InterfaceError::InvalidInterface {
                    detail: format!("'{owner}' has no parameter named '{key}'"),
                })?,
        };
        out[index] = ParamAnnotations::resolve(tags, &format!("{owner} parameter {index}"))?;
    }
    Ok(out)
}

/// Replace characters that cannot appear in a Rust identifier.
pub fn sanitize_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_trivial_interface() {
        let iface = Interface::parse(
            r#"
[library]
name = "libtest"

[[functions]]
signature = "void func()"
"#,
        )
        .unwrap();
        assert_eq!(iface.library.ident, "libtest");
        assert_eq!(iface.library.shared_object_name(), "libtest.so");
        assert_eq!(iface.functions.len(), 1);
        let func = iface.function("func").unwrap();
        assert!(func.params.is_empty());
        assert!(func.return_type.is_void());
        assert_eq!(func.normalized_signature, "void func()");
    }

    #[test]
    fn versioned_library() {
        let iface = Interface::parse(
            "[library]\nname = \"libtest\"\nannotations = [\"version = 123\"]\n",
        )
        .unwrap();
        assert_eq!(iface.library.shared_object_name(), "libtest.so.123");
    }

    #[test]
    fn param_annotations_by_index_and_name() {
        let iface = Interface::parse(
            r#"
[library]
name = "libtest"

[[functions]]
signature = "void func(void* a, char* b)"
param-annotations = { 0 = ["ptr_passthrough"], b = ["assume_compatible_data_layout"] }
"#,
        )
        .unwrap();
        let func = &iface.functions[0];
        assert!(func.params[0].annotations.ptr_passthrough);
        assert!(func.params[1].annotations.assume_compatible);
    }

    #[test]
    fn param_annotation_out_of_range() {
        let err = Interface::parse(
            r#"
[library]
name = "libtest"

[[functions]]
signature = "void func(int a)"
param-annotations = { 3 = ["passthrough"] }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn unknown_annotation_on_function() {
        let err = Interface::parse(
            r#"
[library]
name = "libtest"

[[functions]]
signature = "void func()"
annotations = ["invalid_annotation"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, InterfaceError::UnknownAnnotation { .. }));
    }

    #[test]
    fn duplicate_function_rejected() {
        let err = Interface::parse(
            r#"
[library]
name = "libtest"

[[functions]]
signature = "void func()"

[[functions]]
signature = "int func(int)"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn callbacks_accept_both_spellings() {
        let iface = Interface::parse(
            r#"
[library]
name = "libtest"

[[callbacks]]
signature = "int (char, char)"

[[callbacks]]
signature = "void (*)(int)"
param-annotations = { 0 = ["passthrough"] }
"#,
        )
        .unwrap();
        assert_eq!(iface.callbacks.len(), 2);
        assert_eq!(iface.callbacks[0].function_type.params, vec![CType::Char, CType::Char]);
        assert!(iface.callbacks[1].param_annotations[0].passthrough);

        assert!(Interface::parse("[library]\nname = \"l\"\n[[callbacks]]\nsignature = \"int\"\n").is_err());
    }

    #[test]
    fn sanitize_library_names() {
        assert_eq!(sanitize_ident("libfoo-bar"), "libfoo_bar");
        assert_eq!(sanitize_ident("libGL"), "libGL");
        assert_eq!(sanitize_ident("3d"), "_3d");
    }
}
