//! Guest and host ABI data models.
//!
//! The host is always a 64-bit LP64 target (x86-64 System V and AArch64
//! agree on every C type size this crate deals with). Guests are either
//! 32-bit x86 (ILP32, i386 System V) or 64-bit x86 (LP64).

use serde::{Deserialize, Serialize};
use thunk_interface::CType;

use crate::error::LayoutError;

/// Size and alignment of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeSize {
    /// Size in bytes.
    pub size_bytes: u64,
    /// Required alignment in bytes (as a record member).
    pub alignment_bytes: u64,
}

impl TypeSize {
    pub const fn new(size_bytes: u64, alignment_bytes: u64) -> Self {
        Self {
            size_bytes,
            alignment_bytes,
        }
    }
}

/// Guest pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    #[serde(rename = "32")]
    W32,
    #[serde(rename = "64")]
    W64,
}

impl PointerWidth {
    pub fn bits(self) -> u32 {
        match self {
            PointerWidth::W32 => 32,
            PointerWidth::W64 => 64,
        }
    }

    pub fn bytes(self) -> u64 {
        u64::from(self.bits() / 8)
    }
}

impl std::fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Guest ABI selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestAbi {
    #[serde(rename = "x86-32")]
    X86_32,
    #[serde(rename = "x86-64")]
    X86_64,
}

impl GuestAbi {
    pub fn pointer_width(self) -> PointerWidth {
        match self {
            GuestAbi::X86_32 => PointerWidth::W32,
            GuestAbi::X86_64 => PointerWidth::W64,
        }
    }

    /// The C data model of this guest.
    pub fn data_model(self) -> DataModel {
        match self {
            GuestAbi::X86_32 => DataModel::ilp32_i386(),
            GuestAbi::X86_64 => DataModel::lp64(),
        }
    }

    pub fn from_width(width: PointerWidth) -> Self {
        match width {
            PointerWidth::W32 => GuestAbi::X86_32,
            PointerWidth::W64 => GuestAbi::X86_64,
        }
    }
}

impl std::fmt::Display for GuestAbi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestAbi::X86_32 => write!(f, "x86-32"),
            GuestAbi::X86_64 => write!(f, "x86-64"),
        }
    }
}

impl std::str::FromStr for GuestAbi {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "x86-32" | "i386" | "x86" => Ok(GuestAbi::X86_32),
            "x86-64" | "amd64" => Ok(GuestAbi::X86_64),
            _ => Err(LayoutError::UnknownAbi { name: s.to_string() }),
        }
    }
}

/// Sizes and record-member alignments of the C scalar types on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataModel {
    pub pointer_width: PointerWidth,
    /// `long`, `size_t`, `intptr_t` and friends.
    pub long_bytes: u64,
    /// Alignment of 8-byte scalars (`long long`, `double`) inside records.
    pub int64_record_align: u64,
    pub long_double: TypeSize,
}

impl DataModel {
    /// 64-bit LP64 (the host, and x86-64 guests).
    pub const fn lp64() -> Self {
        Self {
            pointer_width: PointerWidth::W64,
            long_bytes: 8,
            int64_record_align: 8,
            long_double: TypeSize::new(16, 16),
        }
    }

    /// 32-bit i386 System V.
    pub const fn ilp32_i386() -> Self {
        Self {
            pointer_width: PointerWidth::W32,
            long_bytes: 4,
            int64_record_align: 4,
            long_double: TypeSize::new(12, 4),
        }
    }

    /// The host data model.
    pub const fn host() -> Self {
        Self::lp64()
    }

    pub fn pointer(&self) -> TypeSize {
        let bytes = self.pointer_width.bytes();
        TypeSize::new(bytes, bytes)
    }

    /// Size of a builtin scalar or pointer type. `None` for named, array,
    /// function and void types.
    pub fn scalar(&self, ty: &CType) -> Option<TypeSize> {
        let sized = |n: u64| Some(TypeSize::new(n, n));
        match ty.strip_const() {
            CType::Bool
            | CType::Char
            | CType::SignedChar
            | CType::UnsignedChar
            | CType::Int8
            | CType::UInt8 => sized(1),
            CType::Short | CType::UnsignedShort | CType::Int16 | CType::UInt16 => sized(2),
            CType::Int | CType::UnsignedInt | CType::Int32 | CType::UInt32 | CType::Float => {
                sized(4)
            }
            CType::Long
            | CType::UnsignedLong
            | CType::SizeT
            | CType::SSizeT
            | CType::IntPtr
            | CType::UIntPtr => sized(self.long_bytes),
            CType::LongLong
            | CType::UnsignedLongLong
            | CType::Int64
            | CType::UInt64
            | CType::Double => Some(TypeSize::new(8, self.int64_record_align)),
            CType::LongDouble => Some(self.long_double),
            CType::Pointer(_) => Some(self.pointer()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i386_scalar_sizes() {
        let m = GuestAbi::X86_32.data_model();
        assert_eq!(m.scalar(&CType::Long), Some(TypeSize::new(4, 4)));
        assert_eq!(m.scalar(&CType::Double), Some(TypeSize::new(8, 4)));
        assert_eq!(m.scalar(&CType::LongDouble), Some(TypeSize::new(12, 4)));
        assert_eq!(
            m.scalar(&CType::Pointer(Box::new(CType::Void))),
            Some(TypeSize::new(4, 4))
        );
    }

    #[test]
    fn lp64_matches_host() {
        let m = GuestAbi::X86_64.data_model();
        assert_eq!(m, DataModel::host());
        assert_eq!(m.scalar(&CType::SizeT), Some(TypeSize::new(8, 8)));
        assert_eq!(m.scalar(&CType::Named("A".into())), None);
    }

    #[test]
    fn parse_guest_abi() {
        assert_eq!("x86-32".parse::<GuestAbi>().unwrap(), GuestAbi::X86_32);
        assert_eq!("X86_64".parse::<GuestAbi>().unwrap(), GuestAbi::X86_64);
        assert!("arm".parse::<GuestAbi>().is_err());
        assert_eq!(GuestAbi::X86_32.pointer_width(), PointerWidth::W32);
        assert_eq!(GuestAbi::from_width(PointerWidth::W64), GuestAbi::X86_64);
        assert_eq!(GuestAbi::X86_32.to_string(), "x86-32");
    }
}
