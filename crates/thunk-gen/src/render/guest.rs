//! Guest half: packing functions, public entry points and host function
//! pointer callers.
//!
//! The guest crate is compiled for the guest architecture, so its native
//! types already have guest layout. Packing copies arguments into a record
//! and hands it to the host by id.

use thunk_interface::CType;

use super::{callback_id_const, id_const, open_module, SourceWriter};
use crate::error::Result;
use crate::ident::callback_text;
use crate::model::{CallbackPlan, FunctionPlan, ParamKind, ThunkPlan, WrapperPlan};
use crate::rust_type::{fn_pointer_type, return_suffix, rust_type};

pub fn render_guest(plan: &ThunkPlan) -> Result<String> {
    let mut out = SourceWriter::default();
    open_module(&mut out, plan, "guest");
    out.line("use core::mem::MaybeUninit;");
    out.line("use thunk_runtime::{allocate_host_trampoline_for_guest_function, invoke_host, CallHostFunction, ThunkId};");
    out.blank();
    let bits = plan.abi.pointer_width().bits();
    out.line(format!(
        "const _: () = assert!(usize::BITS == {bits} && thunk_runtime::GUEST_POINTER_BITS == {bits}, \"thunks were generated for a {bits}-bit guest\");"
    ));

    for wrapper in &plan.wrappers {
        if let WrapperPlan::EnumCast { name, guest_size, .. } = wrapper {
            out.line(format!(
                "const _: () = assert!(core::mem::size_of::<{name}>() == {guest_size}, \"{name} must be a {guest_size}-byte integer on the guest\");"
            ));
        }
    }

    for func in &plan.functions {
        out.blank();
        render_function(&mut out, func)?;
    }
    for callback in &plan.callbacks {
        out.blank();
        render_host_caller(&mut out, callback)?;
    }
    out.close("");
    Ok(out.finish())
}

fn render_function(out: &mut SourceWriter, func: &FunctionPlan) -> Result<()> {
    let id = id_const(&func.name);
    let record = format!("PackedArgs_{}", func.name);
    let ret = return_suffix(&func.return_type)?;

    out.line(format!("pub const {id}: ThunkId = {};", func.id.rust_literal()));
    out.blank();

    // Packed argument record
    let mut slots = Vec::new();
    for param in &func.params {
        slots.push((param.ident.clone(), rust_type(&param.ty)?));
    }
    if let Some(element) = &func.variadic {
        slots.push(("count".to_string(), "usize".to_string()));
        slots.push(("va".to_string(), format!("*const {}", rust_type(element)?)));
    }
    out.line("#[repr(C)]");
    out.open(format!("struct {record}"));
    for (name, ty) in &slots {
        out.line(format!("{name}: {ty},"));
    }
    out.line(format!("rv: MaybeUninit<{}>,", rust_type(&func.return_type)?));
    out.close("");
    out.blank();

    // Packing function
    let packer_params = slots
        .iter()
        .map(|(name, ty)| format!("{name}: {ty}"))
        .collect::<Vec<_>>()
        .join(", ");
    out.open(format!("pub unsafe fn {}({packer_params}){ret}", func.packer_name()));
    out.open(format!("let mut args = {record}"));
    for param in &func.params {
        match param.kind {
            ParamKind::Callback => out.line(format!(
                "{0}: allocate_host_trampoline_for_guest_function({0}),",
                param.ident
            )),
            _ => out.line(format!("{},", param.ident)),
        }
    }
    if func.variadic.is_some() {
        out.line("count,");
        out.line("va,");
    }
    out.line("rv: MaybeUninit::uninit(),");
    out.close(";");
    out.line(format!("invoke_host(&{id}, core::ptr::addr_of_mut!(args).cast());"));
    if !func.return_type.is_void() {
        out.line("args.rv.assume_init()");
    }
    out.close("");

    if func.custom_guest_entrypoint {
        return Ok(());
    }
    out.blank();
    match &func.variadic {
        None => render_entry(out, func, &ret),
        Some(element) => render_variadic_entry(out, func, element, &ret),
    }
}

fn explicit_params(func: &FunctionPlan) -> Result<String> {
    Ok(func
        .params
        .iter()
        .map(|p| Ok(format!("{}: {}", p.ident, rust_type(&p.ty)?)))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

fn render_entry(out: &mut SourceWriter, func: &FunctionPlan, ret: &str) -> Result<()> {
    let args = func.params.iter().map(|p| p.ident.as_str()).collect::<Vec<_>>().join(", ");
    out.line("#[no_mangle]");
    out.open(format!(
        "pub unsafe extern \"C\" fn {}({}){ret}",
        func.name,
        explicit_params(func)?
    ));
    out.line(format!("{}({args})", func.packer_name()));
    out.close("");
    Ok(())
}

/// Public entry for a variadic function: collect arguments up to the zero
/// terminator, then forward them as an array.
fn render_variadic_entry(out: &mut SourceWriter, func: &FunctionPlan, element: &CType, ret: &str) -> Result<()> {
    let element_ty = rust_type(element)?;
    let read = va_read_expr(element)?;
    let is_terminator = match element.strip_const() {
        CType::Pointer(_) => "value.is_null()",
        CType::Float | CType::Double => "value == 0.0",
        CType::Bool => "!value",
        _ => "value == 0",
    };
    let mut params = explicit_params(func)?;
    if !params.is_empty() {
        params.push_str(", ");
    }
    let mut forwarded: Vec<&str> = func.params.iter().map(|p| p.ident.as_str()).collect();
    forwarded.extend(["values.len()", "values.as_ptr()"]);

    out.line("// Requires #![feature(c_variadic)] in the guest crate");
    out.line("#[cfg(feature = \"c-variadic\")]");
    out.line("#[no_mangle]");
    out.open(format!("pub unsafe extern \"C\" fn {}({params}mut va: ...){ret}", func.name));
    out.line(format!("let mut values: Vec<{element_ty}> = Vec::new();"));
    out.open("loop");
    out.line(format!("let value: {element_ty} = {read};"));
    out.open(format!("if {is_terminator}"));
    out.line("break;");
    out.close("");
    out.line("values.push(value);");
    out.close("");
    out.line(format!("{}({})", func.packer_name(), forwarded.join(", ")));
    out.close("");
    Ok(())
}

/// Read one variadic argument, undoing C default argument promotion.
fn va_read_expr(element: &CType) -> Result<String> {
    let ty = rust_type(element)?;
    Ok(match element.strip_const() {
        CType::Bool => "va.arg::<core::ffi::c_int>() != 0".to_string(),
        CType::Char
        | CType::SignedChar
        | CType::UnsignedChar
        | CType::Short
        | CType::UnsignedShort
        | CType::Int8
        | CType::Int16
        | CType::UInt8
        | CType::UInt16 => format!("va.arg::<core::ffi::c_int>() as {ty}"),
        CType::Float => "va.arg::<f64>() as f32".to_string(),
        _ => format!("va.arg::<{ty}>()"),
    })
}

/// Guest-side caller for host function pointers of one signature.
fn render_host_caller(out: &mut SourceWriter, callback: &CallbackPlan) -> Result<()> {
    let short = callback.id.short();
    let id = callback_id_const(&short);
    let fn_type = fn_pointer_type(&callback.function_type)?;
    let ret = return_suffix(&callback.function_type.return_type)?;
    let mut params = vec![format!("host_fn: {fn_type}")];
    let mut args = Vec::new();
    for (index, ty) in callback.function_type.params.iter().enumerate() {
        params.push(format!("a{index}: {}", rust_type(ty)?));
        args.push(format!("a{index}"));
    }
    let args = if args.is_empty() {
        String::new()
    } else {
        format!(", {}", args.join(", "))
    };

    out.line(format!("pub const {id}: ThunkId = {};", callback.id.rust_literal()));
    out.blank();
    out.line(format!(
        "/// Call a host function pointer of type `{}`.",
        callback_text(&callback.function_type)
    ));
    out.open(format!("pub unsafe fn call_host_{short}({}){ret}", params.join(", ")));
    out.line(format!("CallHostFunction::<{fn_type}>::call(&{id}, host_fn{args})"));
    out.close("");
    Ok(())
}
