//! Export identifiers.
//!
//! Every export is keyed by the SHA-256 digest of its normalized signature
//! text, so both thunk halves agree on ids without sharing any state.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thunk_interface::{CType, FunctionType};

/// A 256-bit export identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThunkId(pub [u8; 32]);

impl ThunkId {
    fn digest(text: &str) -> Self {
        Self(Sha256::digest(text.as_bytes()).into())
    }

    /// Id of a library function: `sha256("<lib>:<normalized signature>")`.
    pub fn for_function(library: &str, normalized_signature: &str) -> Self {
        Self::digest(&format!("{library}:{normalized_signature}"))
    }

    /// Id of the guest-to-host entry for a callback signature:
    /// `sha256("callback:<function type>")`. Shared by every library.
    pub fn for_callback(function_type: &FunctionType) -> Self {
        Self::digest(&format!("callback:{}", callback_text(function_type)))
    }

    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// First 8 hex digits, for identifiers in generated code.
    pub fn short(&self) -> String {
        self.hex()[..8].to_string()
    }

    /// `[0x12, 0x34, ...]` array literal.
    pub fn rust_literal(&self) -> String {
        let bytes: Vec<String> = self.0.iter().map(|b| format!("0x{b:02x}")).collect();
        format!("[{}]", bytes.join(", "))
    }
}

impl std::fmt::Display for ThunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex())
    }
}

impl Serialize for ThunkId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// C spelling of a function type, e.g. `int (char, char)`.
pub fn callback_text(function_type: &FunctionType) -> String {
    CType::Function(Box::new(function_type.clone())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunk_interface::csig::parse_type;

    fn fn_type(text: &str) -> FunctionType {
        match parse_type(text).unwrap() {
            CType::Function(f) => *f,
            other => panic!("not a function type: {other}"),
        }
    }

    #[test]
    fn known_digest() {
        let id = ThunkId::for_function("libtest", "void func()");
        assert_eq!(id.hex().len(), 64);
        assert_eq!(id, ThunkId::for_function("libtest", "void func()"));
        assert_ne!(id, ThunkId::for_function("libother", "void func()"));
    }

    #[test]
    fn callback_ids_ignore_spelling() {
        let a = ThunkId::for_callback(&fn_type("int (char, char)"));
        let b = ThunkId::for_callback(&fn_type("int(char a,char   b)"));
        assert_eq!(a, b);
        assert_ne!(a, ThunkId::for_callback(&fn_type("int (char)")));
    }

    #[test]
    fn rendering() {
        let id = ThunkId([0xab; 32]);
        assert_eq!(id.short(), "abababab");
        assert!(id.rust_literal().starts_with("[0xab, 0xab"));
        assert_eq!(id.rust_literal().matches("0x").count(), 32);
        assert_eq!(callback_text(&fn_type("int (char, char)")), "int (char, char)");
    }
}
