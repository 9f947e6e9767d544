//! Host half: layout wrappers, unpacking functions, library imports and the
//! export table.
//!
//! Every slot of a packed record is read as `GuestLayout<T>` and converted
//! explicitly before the native call. The return value travels back the
//! same way.

use thunk_interface::CType;

use super::{callback_id_const, guest_record_repr, id_const, open_module, SourceWriter};
use crate::error::Result;
use crate::model::{CallbackPlan, FunctionPlan, ParamKind, ParamPlan, ThunkPlan, WrapperPlan};
use crate::rust_type::{fn_pointer_type, return_suffix, rust_type};

pub fn render_host(plan: &ThunkPlan) -> Result<String> {
    let mut out = SourceWriter::default();
    open_module(&mut out, plan, "host");
    out.line("use core::ffi::c_void;");
    out.line("use core::mem::MaybeUninit;");
    out.line("use std::sync::OnceLock;");
    out.line(
        "use thunk_runtime::{finalize_host_trampoline_for_guest_function, CallbackStub, ExportEntry, ExportTable, GuestLayout, GuestRepr, GuestWrapperForHostFunction, HostLayout, HostLibrary, RepackedPointer, ThunkId};",
    );
    out.blank();
    let bits = plan.abi.pointer_width().bits();
    out.line(format!(
        "const _: () = assert!(thunk_runtime::GUEST_POINTER_BITS == {bits}, \"thunks were generated for a {bits}-bit guest\");"
    ));

    for wrapper in &plan.wrappers {
        out.blank();
        render_wrapper(&mut out, plan, wrapper)?;
    }
    for func in &plan.functions {
        out.blank();
        render_unpacker(&mut out, plan, func)?;
    }
    for callback in &plan.callbacks {
        out.blank();
        out.line(format!(
            "pub static {}: ThunkId = {};",
            callback_id_const(&callback.id.short()),
            callback.id.rust_literal()
        ));
    }
    out.blank();
    render_imports(&mut out, plan)?;
    out.blank();
    render_exports(&mut out, plan)?;
    out.close("");
    Ok(out.finish())
}

fn render_wrapper(out: &mut SourceWriter, plan: &ThunkPlan, wrapper: &WrapperPlan) -> Result<()> {
    match wrapper {
        WrapperPlan::Identical { name } => {
            out.line(format!("thunk_runtime::identical_layout!({name});"));
        }
        WrapperPlan::Omitted { name } => {
            out.line(format!("// {name}: incompatible layout, no wrappers"));
        }
        WrapperPlan::EnumCast { name, guest_int, .. } => {
            out.line(format!("/// `{name}` is stored by the guest as `{guest_int}`."));
            out.open(format!("impl GuestRepr for {name}"));
            out.line(format!("type Guest = {guest_int};"));
            out.blank();
            out.open(format!("fn from_guest(guest: {guest_int}) -> Self"));
            out.line(format!("{name}(guest as _)"));
            out.close("");
            out.blank();
            out.open(format!("fn to_guest(&self) -> {guest_int}"));
            out.line(format!("self.0 as {guest_int}"));
            out.close("");
            out.close("");
        }
        WrapperPlan::Repack { name, fields } => {
            let guest_name = format!("Guest_{name}");
            out.line(format!("/// `{name}` as the guest lays it out."));
            out.line(guest_record_repr(plan.abi.pointer_width()));
            out.line("#[derive(Clone, Copy)]");
            out.open(format!("pub struct {guest_name}"));
            for field in fields {
                out.line(format!("pub {}: GuestLayout<{}>,", field.name, rust_type(&field.ty)?));
            }
            out.close("");
            out.blank();
            out.open(format!("impl GuestRepr for {name}"));
            out.line(format!("type Guest = {guest_name};"));
            out.blank();
            out.open(format!("fn from_guest(guest: {guest_name}) -> Self"));
            out.open(name);
            for field in fields {
                out.line(format!(
                    "{0}: HostLayout::<{1}>::from_guest(guest.{0}).data,",
                    field.name,
                    rust_type(&field.ty)?
                ));
            }
            out.close("");
            out.close("");
            out.blank();
            out.open(format!("fn to_guest(&self) -> {guest_name}"));
            out.open(&guest_name);
            for field in fields {
                out.line(format!("{0}: GuestLayout::from_host(&self.{0}),", field.name));
            }
            out.close("");
            out.close("");
            out.close("");
        }
    }
    Ok(())
}

/// Type the host implementation receives for a parameter.
fn host_param_type(param: &ParamPlan) -> Result<String> {
    let ty = rust_type(&param.ty)?;
    Ok(match param.kind {
        ParamKind::Passthrough => format!("GuestLayout<{ty}>"),
        _ => ty,
    })
}

/// `F` of an `Option<F>` function pointer parameter.
fn callback_fn_type(ty: &CType) -> Result<String> {
    match ty.as_function_pointer() {
        Some(func) => fn_pointer_type(func),
        None => rust_type(ty),
    }
}

fn render_unpacker(out: &mut SourceWriter, plan: &ThunkPlan, func: &FunctionPlan) -> Result<()> {
    let ident = &plan.library_ident;
    let record = format!("PackedArgs_{}", func.name);
    let is_void = func.return_type.is_void();

    out.line(format!("pub static {}: ThunkId = {};", id_const(&func.name), func.id.rust_literal()));
    out.blank();

    out.line(guest_record_repr(plan.abi.pointer_width()));
    out.open(format!("struct {record}"));
    for param in &func.params {
        out.line(format!("{}: GuestLayout<{}>,", param.ident, rust_type(&param.ty)?));
    }
    if let Some(element) = &func.variadic {
        out.line("count: GuestLayout<usize>,");
        out.line(format!("va: GuestLayout<*const {}>,", rust_type(element)?));
    }
    out.line(format!("rv: MaybeUninit<GuestLayout<{}>>,", rust_type(&func.return_type)?));
    out.close("");
    out.blank();

    let mut impl_params = Vec::new();
    for param in &func.params {
        impl_params.push(host_param_type(param)?);
    }
    if let Some(element) = &func.variadic {
        impl_params.push("usize".to_string());
        impl_params.push(format!("*const {}", rust_type(element)?));
    }
    let ret = return_suffix(&func.return_type)?;

    let callee = if func.uses_external_host_impl() {
        let alias = format!("Impl_{ident}_{}", func.name);
        let implementation = format!("impl_{ident}_{}", func.name);
        out.line(format!(
            "/// Signature of the host implementation of `{}`, supplied next to these thunks.",
            func.name
        ));
        out.line(format!("pub type {alias} = unsafe fn({}){ret};", impl_params.join(", ")));
        out.line(format!("const _: {alias} = {implementation};"));
        out.blank();
        implementation
    } else {
        format!("(host_imports().{})", func.name)
    };

    out.open(format!("unsafe extern \"C\" fn unpack_{ident}_{}(argsv: *mut c_void)", func.name));
    out.line(format!("let args = argsv.cast::<{record}>();"));
    let mut call_args = Vec::new();
    for param in &func.params {
        let a = &param.ident;
        let ty = rust_type(&param.ty)?;
        match &param.kind {
            ParamKind::Convert => {
                out.line(format!("let {a} = HostLayout::<{ty}>::from_guest((*args).{a}).data;"));
            }
            ParamKind::Passthrough => out.line(format!("let {a} = (*args).{a};")),
            ParamKind::Callback => out.line(format!(
                "let {a} = finalize_host_trampoline_for_guest_function::<{}>((*args).{a});",
                callback_fn_type(&param.ty)?
            )),
            ParamKind::CallbackStub => {
                let fn_type = callback_fn_type(&param.ty)?;
                out.line(format!(
                    "let {a}: {ty} = if (*args).{a}.data == 0 {{ None }} else {{ Some(CallbackStub::<{fn_type}>::abort_stub as {fn_type}) }};"
                ));
            }
            ParamKind::RepackedPointer { record, is_const } => {
                if *is_const {
                    out.line(format!(
                        "let repacked_{a} = RepackedPointer::<{record}>::new_const((*args).{a});"
                    ));
                    out.line(format!("let {a} = repacked_{a}.as_ptr();"));
                } else {
                    out.line(format!(
                        "let mut repacked_{a} = RepackedPointer::<{record}>::new((*args).{a});"
                    ));
                    out.line(format!("let {a} = repacked_{a}.as_mut_ptr();"));
                }
            }
        }
        call_args.push(a.clone());
    }
    if let Some(element) = &func.variadic {
        out.line("let count = HostLayout::<usize>::from_guest((*args).count).data;");
        out.line(format!(
            "let va = HostLayout::<*const {}>::from_guest((*args).va).data;",
            rust_type(element)?
        ));
        call_args.extend(["count".to_string(), "va".to_string()]);
    }
    let call = format!("{callee}({})", call_args.join(", "));
    if is_void {
        out.line(format!("{call};"));
    } else {
        out.line(format!("let rv = {call};"));
        out.line("(*args).rv = MaybeUninit::new(GuestLayout::from_host(&rv));");
    }
    out.close("");
    Ok(())
}

/// Native symbols, resolved once when the export table is first requested.
fn render_imports(out: &mut SourceWriter, plan: &ThunkPlan) -> Result<()> {
    let imported: Vec<&FunctionPlan> = plan
        .functions
        .iter()
        .filter(|f| !f.uses_external_host_impl())
        .collect();
    let needs_global = plan.needs_global_loader();

    out.open("struct HostImports");
    for func in &imported {
        out.line(format!("{}: {},", func.name, native_fn_type(func)?));
    }
    if needs_global {
        out.line("_global: HostLibrary,");
    }
    // Declared last so symbols never outlive their library
    out.line("_library: HostLibrary,");
    out.close("");
    out.blank();
    out.line("static HOST_IMPORTS: OnceLock<HostImports> = OnceLock::new();");
    out.blank();

    out.open("unsafe fn load_host_imports() -> thunk_runtime::Result<HostImports>");
    out.line(format!("let library = HostLibrary::open(\"{}\")?;", plan.shared_object));
    if needs_global {
        out.line("let global = HostLibrary::global();");
    }
    out.open("Ok(HostImports");
    for func in &imported {
        let source = match func.host_loader {
            thunk_interface::HostLoader::Global => "global",
            thunk_interface::HostLoader::Library => "library",
        };
        out.line(format!("{0}: {source}.symbol(\"{0}\")?,", func.name));
    }
    if needs_global {
        out.line("_global: global,");
    }
    out.line("_library: library,");
    out.close(")");
    out.close("");
    out.blank();

    out.open("fn host_imports() -> &'static HostImports");
    out.open("match HOST_IMPORTS.get()");
    out.line("Some(imports) => imports,");
    out.open("None =>");
    out.line(format!(
        "thunk_runtime::log::error!(\"{} called before its host library was loaded\");",
        plan.library
    ));
    out.line("std::process::abort()");
    out.close("");
    out.close("");
    out.close("");
    out.blank();

    out.line("/// Load the host library and resolve its symbols. Returns false on failure.");
    out.open(format!("pub fn ldr_init_{}() -> bool", plan.library_ident));
    out.open("if HOST_IMPORTS.get().is_some()");
    out.line("return true;");
    out.close("");
    out.line("// SAFETY: symbol types follow the declared interface");
    out.open("match unsafe { load_host_imports() }");
    out.open("Ok(imports) =>");
    out.line("let _ = HOST_IMPORTS.set(imports);");
    out.line("true");
    out.close("");
    out.open("Err(err) =>");
    out.line(format!(
        "thunk_runtime::log::error!(\"failed to initialize host thunks for {}: {{err}}\");",
        plan.library
    ));
    out.line("false");
    out.close("");
    out.close("");
    out.close("");
    Ok(())
}

fn native_fn_type(func: &FunctionPlan) -> Result<String> {
    let params = func
        .params
        .iter()
        .map(|p| rust_type(&p.ty))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    Ok(format!(
        "unsafe extern \"C\" fn({params}){}",
        return_suffix(&func.return_type)?
    ))
}

fn render_exports(out: &mut SourceWriter, plan: &ThunkPlan) -> Result<()> {
    let ident = &plan.library_ident;
    out.push_block(format!(
        "static EXPORTS: ExportTable<{}> = ExportTable::new([",
        plan.export_count()
    ));
    for func in &plan.functions {
        out.line(format!(
            "ExportEntry::new(&{}, unpack_{ident}_{}),",
            id_const(&func.name),
            func.name
        ));
    }
    for callback in &plan.callbacks {
        out.line(callback_entry(callback)?);
    }
    out.line("ExportEntry::TERMINATOR,");
    out.pop_block("]);");
    out.blank();

    out.line("/// Export table handed to the emulator, or null if the host library failed to load.");
    out.line("#[no_mangle]");
    out.open(format!("pub extern \"C\" fn thunk_exports_{ident}() -> *const ExportEntry"));
    out.open(format!("if !ldr_init_{ident}()"));
    out.line("return core::ptr::null();");
    out.close("");
    out.line("EXPORTS.as_ptr()");
    out.close("");
    Ok(())
}

fn callback_entry(callback: &CallbackPlan) -> Result<String> {
    Ok(format!(
        "ExportEntry::new(&{}, GuestWrapperForHostFunction::<{}>::call),",
        callback_id_const(&callback.id.short()),
        fn_pointer_type(&callback.function_type)?
    ))
}
