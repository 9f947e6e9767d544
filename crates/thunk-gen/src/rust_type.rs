//! Rust spelling of C types in generated code.
//!
//! Named types resolve against the bindings in the enclosing module.
//! `long` is spelled as the pointer-sized integer so that one spelling is
//! correct on ILP32 guests and LP64 hosts alike.

use thunk_interface::{CType, FunctionType};

use crate::error::{GenError, Result};

/// Rust type for a C type.
pub fn rust_type(ty: &CType) -> Result<String> {
    Ok(match ty {
        CType::Void => "()".to_string(),
        CType::Bool => "bool".to_string(),
        CType::Char => "core::ffi::c_char".to_string(),
        CType::SignedChar => "core::ffi::c_schar".to_string(),
        CType::UnsignedChar => "core::ffi::c_uchar".to_string(),
        CType::Short => "core::ffi::c_short".to_string(),
        CType::UnsignedShort => "core::ffi::c_ushort".to_string(),
        CType::Int => "core::ffi::c_int".to_string(),
        CType::UnsignedInt => "core::ffi::c_uint".to_string(),
        CType::Long | CType::SSizeT | CType::IntPtr => "isize".to_string(),
        CType::UnsignedLong | CType::SizeT | CType::UIntPtr => "usize".to_string(),
        CType::LongLong => "core::ffi::c_longlong".to_string(),
        CType::UnsignedLongLong => "core::ffi::c_ulonglong".to_string(),
        CType::Float => "f32".to_string(),
        CType::Double => "f64".to_string(),
        CType::LongDouble => {
            return Err(GenError::UnsupportedType {
                ty: ty.to_string(),
                detail: "no Rust equivalent".into(),
            })
        }
        CType::Int8 => "i8".to_string(),
        CType::Int16 => "i16".to_string(),
        CType::Int32 => "i32".to_string(),
        CType::Int64 => "i64".to_string(),
        CType::UInt8 => "u8".to_string(),
        CType::UInt16 => "u16".to_string(),
        CType::UInt32 => "u32".to_string(),
        CType::UInt64 => "u64".to_string(),
        CType::Const(inner) => rust_type(inner)?,
        CType::Named(name) => name.clone(),
        CType::Array(inner, len) => format!("[{}; {len}]", rust_type(inner)?),
        CType::Function(func) => fn_pointer_type(func)?,
        CType::Pointer(inner) => match inner.strip_const() {
            CType::Function(func) => format!("Option<{}>", fn_pointer_type(func)?),
            pointee => {
                let mutability = if matches!(inner.as_ref(), CType::Const(_)) {
                    "const"
                } else {
                    "mut"
                };
                format!("*{mutability} {}", pointee_type(pointee)?)
            }
        },
    })
}

fn pointee_type(pointee: &CType) -> Result<String> {
    match pointee {
        CType::Void => Ok("core::ffi::c_void".to_string()),
        other => rust_type(other),
    }
}

/// Fixed-width Rust integer of `size_bytes` with the signedness of the C
/// integer type `ty`.
pub fn fixed_width_integer(ty: &CType, size_bytes: u64) -> Result<String> {
    let unsigned = matches!(
        ty.strip_const(),
        CType::Bool
            | CType::UnsignedChar
            | CType::UnsignedShort
            | CType::UnsignedInt
            | CType::UnsignedLong
            | CType::UnsignedLongLong
            | CType::SizeT
            | CType::UIntPtr
            | CType::UInt8
            | CType::UInt16
            | CType::UInt32
            | CType::UInt64
    );
    let bits = match size_bytes {
        1 | 2 | 4 | 8 => size_bytes * 8,
        _ => {
            return Err(GenError::UnsupportedType {
                ty: ty.to_string(),
                detail: format!("no {size_bytes}-byte integer"),
            })
        }
    };
    Ok(format!("{}{bits}", if unsigned { "u" } else { "i" }))
}

/// `unsafe extern "C" fn(A, B) -> R` for a C function type.
pub fn fn_pointer_type(func: &FunctionType) -> Result<String> {
    if func.is_variadic {
        return Err(GenError::UnsupportedType {
            ty: CType::Function(Box::new(func.clone())).to_string(),
            detail: "variadic function pointers cannot be thunked".into(),
        });
    }
    let params = func
        .params
        .iter()
        .map(rust_type)
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!("unsafe extern \"C\" fn({params}){}", return_suffix(&func.return_type)?))
}

/// ` -> R`, or nothing for `void`.
pub fn return_suffix(ty: &CType) -> Result<String> {
    if ty.is_void() {
        Ok(String::new())
    } else {
        Ok(format!(" -> {}", rust_type(ty)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunk_interface::csig::parse_type;

    fn render(text: &str) -> String {
        rust_type(&parse_type(text).unwrap()).unwrap()
    }

    #[test]
    fn primitives() {
        assert_eq!(render("int"), "core::ffi::c_int");
        assert_eq!(render("unsigned long"), "usize");
        assert_eq!(render("long"), "isize");
        assert_eq!(render("uint64_t"), "u64");
        assert_eq!(render("const double"), "f64");
    }

    #[test]
    fn pointers() {
        assert_eq!(render("void*"), "*mut core::ffi::c_void");
        assert_eq!(render("const char*"), "*const core::ffi::c_char");
        assert_eq!(render("A**"), "*mut *mut A");
        assert_eq!(
            rust_type(&CType::Array(Box::new(CType::Int), 4)).unwrap(),
            "[core::ffi::c_int; 4]"
        );
    }

    #[test]
    fn function_pointers() {
        assert_eq!(
            render("int (*)(char, char)"),
            "Option<unsafe extern \"C\" fn(core::ffi::c_char, core::ffi::c_char) -> core::ffi::c_int>"
        );
        assert_eq!(render("void (*)(void)"), "Option<unsafe extern \"C\" fn()>");
    }

    #[test]
    fn fixed_width_integers() {
        assert_eq!(fixed_width_integer(&CType::Long, 4).unwrap(), "i32");
        assert_eq!(fixed_width_integer(&CType::UnsignedLong, 8).unwrap(), "u64");
        assert!(fixed_width_integer(&CType::Int, 3).is_err());
    }

    #[test]
    fn unsupported() {
        assert!(rust_type(&CType::LongDouble).is_err());
        assert!(rust_type(&parse_type("int (*)(int, ...)").unwrap()).is_err());
    }
}
