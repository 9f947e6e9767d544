//! Interface declaration file (`.thunks.toml`) parsing.
//!
//! A `.thunks.toml` file declares a native library, the records its
//! functions exchange, the functions to thunk and any callback signatures
//! that need guest-to-host invocation support. All annotations are kept as
//! raw strings here; [`crate::interface::Interface::resolve`] validates them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{InterfaceError, Result};

/// A complete interface declaration parsed from a `.thunks.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDeclaration {
    /// The native library being thunked.
    pub library: LibraryDecl,
    /// Record and enum declarations.
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    /// Functions to thunk.
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    /// Additional callback signatures needing guest-to-host support.
    #[serde(default)]
    pub callbacks: Vec<CallbackDecl>,
}

/// The `[library]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryDecl {
    /// Library name (e.g., "libGL"). The host loads `<name>.so`.
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Declared kind of a `[[types]]` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Struct,
    Enum,
    /// Forward-declared only; never usable as a pointee.
    Incomplete,
}

/// A `[[types]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
    /// Member declarations shared by guest and host.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Guest-side member declarations (overrides `fields`).
    #[serde(default)]
    pub guest_fields: Option<Vec<String>>,
    /// Host-side member declarations (overrides `fields`).
    #[serde(default)]
    pub host_fields: Option<Vec<String>>,
    /// Underlying integer type for enums (default `unsigned int`).
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Annotations per field name.
    #[serde(default)]
    pub field_annotations: BTreeMap<String, Vec<String>>,
}

impl TypeDecl {
    /// Guest member declarations, if any were given.
    pub fn guest_members(&self) -> Option<&[String]> {
        self.guest_fields.as_deref().or(self.fields.as_deref())
    }

    /// Host member declarations, if any were given.
    pub fn host_members(&self) -> Option<&[String]> {
        self.host_fields.as_deref().or(self.fields.as_deref())
    }
}

/// A `[[functions]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FunctionDecl {
    /// C signature (e.g., "int func(char* s, ...)").
    pub signature: String,
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Annotations keyed by zero-based parameter index or parameter name.
    #[serde(default)]
    pub param_annotations: BTreeMap<String, Vec<String>>,
}

/// A `[[callbacks]]` entry: an abstract function type such as `"int (char, char)"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CallbackDecl {
    pub signature: String,
    /// Annotations keyed by zero-based parameter index.
    #[serde(default)]
    pub param_annotations: BTreeMap<String, Vec<String>>,
}

impl InterfaceDeclaration {
    /// Parse an interface declaration from a TOML string.
    pub fn parse(input: &str) -> Result<Self> {
        let decl: InterfaceDeclaration = toml::from_str(input)?;

        if decl.library.name.trim().is_empty() {
            return Err(InterfaceError::InvalidInterface {
                detail: "library.name is required".to_string(),
            });
        }

        Ok(decl)
    }

    /// Parse an interface declaration from a file path.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_full_declaration() {
        let toml = r#"
[library]
name = "libtest"
annotations = ["version = 123"]

[[types]]
name = "A"
guest-fields = ["int b", "int a"]
host-fields = ["int a", "int b"]
annotations = ["emit_layout_wrappers"]
field-annotations = { a = ["ptr_passthrough"] }

[[types]]
name = "B"
kind = "incomplete"

[[functions]]
signature = "void func(int (*cb)(char, char), A* a)"
annotations = ["custom_host_impl"]
param-annotations = { 1 = ["ptr_passthrough"] }

[[callbacks]]
signature = "int (char, char)"
"#;
        let decl = InterfaceDeclaration::parse(toml).unwrap();
        assert_eq!(decl.library.name, "libtest");
        assert_eq!(decl.library.annotations, vec!["version = 123"]);
        assert_eq!(decl.types.len(), 2);
        assert_eq!(decl.types[0].kind, TypeKind::Struct);
        assert_eq!(decl.types[0].guest_members().unwrap()[0], "int b");
        assert_eq!(decl.types[0].host_members().unwrap()[0], "int a");
        assert_eq!(decl.types[0].field_annotations["a"], vec!["ptr_passthrough"]);
        assert_eq!(decl.types[1].kind, TypeKind::Incomplete);
        assert_eq!(decl.functions[0].param_annotations["1"], vec!["ptr_passthrough"]);
        assert_eq!(decl.callbacks.len(), 1);
    }

    #[test]
    fn shared_fields_apply_to_both_sides() {
        let toml = r#"
[library]
name = "libtest"

[[types]]
name = "A"
fields = ["int a", "int b"]
host-fields = ["int a", "long b"]
"#;
        let decl = InterfaceDeclaration::parse(toml).unwrap();
        assert_eq!(decl.types[0].guest_members().unwrap()[1], "int b");
        assert_eq!(decl.types[0].host_members().unwrap()[1], "long b");
    }

    #[test]
    fn parse_minimal_declaration() {
        let decl = InterfaceDeclaration::parse("[library]\nname = \"libtest\"\n").unwrap();
        assert!(decl.types.is_empty());
        assert!(decl.functions.is_empty());
        assert!(decl.callbacks.is_empty());
    }

    #[test]
    fn missing_library_section() {
        let toml = r#"
[[functions]]
signature = "void orphan(void)"
"#;
        assert!(InterfaceDeclaration::parse(toml).is_err());
    }

    #[test]
    fn empty_library_name_rejected() {
        let err = InterfaceDeclaration::parse("[library]\nname = \"\"\n").unwrap_err();
        assert!(matches!(err, InterfaceError::InvalidInterface { .. }));
    }

    #[test]
    fn unknown_fields_rejected() {
        let toml = r#"
[library]
name = "libtest"

[[functions]]
signature = "void func()"
anotations = ["custom_host_impl"]
"#;
        let err = InterfaceDeclaration::parse(toml).unwrap_err();
        assert!(matches!(err, InterfaceError::Toml(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[library]\nname = \"libfile\"").unwrap();
        let decl = InterfaceDeclaration::load(file.path()).unwrap();
        assert_eq!(decl.library.name, "libfile");

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            InterfaceDeclaration::load(&missing),
            Err(InterfaceError::Io(_))
        ));
    }
}
