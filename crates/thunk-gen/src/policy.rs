//! Generation policy: decides how every parameter, return value and record
//! crosses the boundary, and rejects what cannot.

use std::collections::BTreeMap;

use thunk_interface::{
    CType, FunctionType, Interface, InterfaceFunction, InterfaceParam, ParamAnnotations, RecordKind,
};
use thunk_layout::{GuestAbi, LayoutAnalyzer, LayoutError, PointerWidth, TypeLayoutClass};

use crate::error::{GenError, Result};
use crate::ident::{callback_text, ThunkId};
use crate::model::{CallbackPlan, FunctionPlan, ParamKind, ParamPlan, ThunkPlan, WrapperPlan};
use crate::rust_type::{fixed_width_integer, fn_pointer_type, rust_type};

/// Callback arities the runtime has packers and unpackers for.
pub const SUPPORTED_CALLBACK_ARITIES: &[usize] = &[
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 23,
];

pub fn is_supported_callback_arity(arity: usize) -> bool {
    SUPPORTED_CALLBACK_ARITIES.contains(&arity)
}

/// Builds a [`ThunkPlan`] for one interface and guest ABI.
pub struct Planner<'a> {
    interface: &'a Interface,
    abi: GuestAbi,
    analyzer: LayoutAnalyzer<'a>,
    callbacks: BTreeMap<FunctionType, ThunkId>,
}

impl<'a> Planner<'a> {
    pub fn new(interface: &'a Interface, abi: GuestAbi) -> Self {
        Self {
            interface,
            abi,
            analyzer: LayoutAnalyzer::new(&interface.records, abi),
            callbacks: BTreeMap::new(),
        }
    }

    fn width(&self) -> PointerWidth {
        self.abi.pointer_width()
    }

    /// Run every policy check. The first violation aborts planning.
    pub fn plan(mut self) -> Result<ThunkPlan> {
        let interface = self.interface;
        let functions = interface
            .functions
            .iter()
            .map(|f| self.plan_function(f))
            .collect::<Result<Vec<_>>>()?;

        for callback in &interface.callbacks {
            let owner = format!("callback {}", callback_text(&callback.function_type));
            self.check_callback(&owner, &callback.function_type, &callback.param_annotations)?;
            self.register_callback(&callback.function_type);
        }

        let wrappers = self.plan_wrappers()?;
        let callbacks = self
            .callbacks
            .into_iter()
            .map(|(function_type, id)| CallbackPlan { id, function_type })
            .collect();

        Ok(ThunkPlan {
            library: interface.library.name.clone(),
            library_ident: interface.library.ident.clone(),
            shared_object: interface.library.shared_object_name(),
            abi: self.abi,
            functions,
            callbacks,
            wrappers,
        })
    }

    fn plan_function(&mut self, func: &InterfaceFunction) -> Result<FunctionPlan> {
        let variadic = if func.is_variadic {
            let Some(element) = &func.annotations.uniform_va_type else {
                return Err(GenError::VariadicWithoutUniformType {
                    function: func.name.clone(),
                });
            };
            self.check_variadic_element(func, element)?;
            Some(element.clone())
        } else {
            None
        };

        let params = func
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                Ok(ParamPlan {
                    ident: format!("a{index}"),
                    ty: param.ty.clone(),
                    kind: self.plan_param(func, index, param)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.check_return(func)?;

        let plan = FunctionPlan {
            name: func.name.clone(),
            id: ThunkId::for_function(&self.interface.library.name, &func.normalized_signature),
            params,
            return_type: func.return_type.clone(),
            variadic,
            custom_host_impl: func.annotations.custom_host_impl,
            custom_guest_entrypoint: func.annotations.custom_guest_entrypoint,
            host_loader: func.annotations.host_loader,
        };
        log::debug!("planned {} as {}", func.normalized_signature, plan.id.short());
        Ok(plan)
    }

    fn plan_param(&mut self, func: &InterfaceFunction, index: usize, param: &InterfaceParam) -> Result<ParamKind> {
        let ty = param.ty.strip_const();
        let annotations = &param.annotations;
        let unsupported = |detail: &str| GenError::UnsupportedParameter {
            function: func.name.clone(),
            index,
            ty: param.ty.to_string(),
            detail: detail.to_string(),
        };

        if annotations.passthrough && !func.annotations.custom_host_impl && !func.is_variadic {
            return Err(GenError::MalformedAnnotation {
                function: func.name.clone(),
                detail: format!("passthrough on parameter {index} requires custom_host_impl"),
            });
        }
        if annotations.callback_stub && !ty.is_function_pointer() {
            return Err(GenError::MalformedAnnotation {
                function: func.name.clone(),
                detail: format!("callback_stub on parameter {index}, which is not a function pointer"),
            });
        }

        // Incomplete pointees are rejected regardless of annotations
        self.check_complete_pointee(ty)?;

        if let Some(callback) = ty.as_function_pointer() {
            if annotations.passthrough {
                return Ok(ParamKind::Passthrough);
            }
            self.check_callback(&func.name, callback, &[])?;
            if annotations.callback_stub {
                return Ok(ParamKind::CallbackStub);
            }
            self.register_callback(callback);
            return Ok(ParamKind::Callback);
        }
        if annotations.passthrough {
            rust_type(ty)?;
            return Ok(ParamKind::Passthrough);
        }

        match ty {
            CType::Pointer(pointee) => {
                rust_type(ty)?;
                if annotations.ptr_passthrough {
                    log::debug!("{} parameter {index}: pointer passed through unchecked", func.name);
                    return Ok(ParamKind::Convert);
                }
                if pointee.is_void() {
                    if self.width() == PointerWidth::W32 {
                        log::warn!(
                            "{} parameter {index}: void* passed unchecked to a 32-bit guest",
                            func.name
                        );
                    }
                    return Ok(ParamKind::Convert);
                }
                if annotations.assume_compatible {
                    return Ok(ParamKind::Convert);
                }
                match self.analyzer.classify_pointee(pointee)? {
                    TypeLayoutClass::Identical => Ok(ParamKind::Convert),
                    TypeLayoutClass::Repackable(_) => match pointee.strip_const() {
                        CType::Named(record) => Ok(ParamKind::RepackedPointer {
                            record: record.clone(),
                            is_const: matches!(pointee.as_ref(), CType::Const(_)),
                        }),
                        _ => Err(unsupported("pointer to a repackable non-record type")),
                    },
                    TypeLayoutClass::Incompatible => Err(unsupported(
                        "pointee layout is incompatible; annotate ptr_passthrough or assume_compatible_data_layout",
                    )),
                }
            }
            CType::Named(record) => match self.analyzer.classify(record)? {
                TypeLayoutClass::Incompatible => Err(unsupported("incompatible layout passed by value")),
                _ => Ok(ParamKind::Convert),
            },
            _ => {
                rust_type(ty)?;
                Ok(ParamKind::Convert)
            }
        }
    }

    fn check_return(&mut self, func: &InterfaceFunction) -> Result<()> {
        let ty = func.return_type.strip_const();
        let unsupported = |detail: &str| GenError::UnsupportedReturn {
            function: func.name.clone(),
            ty: func.return_type.to_string(),
            detail: detail.to_string(),
        };

        if let Some(callback) = ty.as_function_pointer() {
            if !func.annotations.returns_guest_pointer {
                return Err(GenError::FunctionPointerReturn {
                    function: func.name.clone(),
                });
            }
            fn_pointer_type(callback)?;
            return Ok(());
        }

        self.check_complete_pointee(ty)?;
        match ty {
            CType::Pointer(pointee) => {
                rust_type(ty)?;
                if pointee.is_void() {
                    if self.width() == PointerWidth::W32 {
                        log::warn!("{}: void* returned unchecked to a 32-bit guest", func.name);
                    }
                    return Ok(());
                }
                match self.analyzer.classify_pointee(pointee)? {
                    TypeLayoutClass::Identical => Ok(()),
                    _ => Err(unsupported("pointee layout differs between guest and host")),
                }
            }
            CType::Named(record) => match self.analyzer.classify(record)? {
                TypeLayoutClass::Incompatible => Err(unsupported("incompatible layout returned by value")),
                _ => Ok(()),
            },
            _ => rust_type(ty).map(|_| ()),
        }
    }

    /// Variadic elements reach the host as an array, so they must have
    /// the same layout on both sides.
    fn check_variadic_element(&mut self, func: &InterfaceFunction, element: &CType) -> Result<()> {
        let unsupported = |detail: &str| GenError::UnsupportedParameter {
            function: func.name.clone(),
            index: func.params.len(),
            ty: element.to_string(),
            detail: detail.to_string(),
        };
        rust_type(element)?;
        if matches!(element.strip_const(), CType::Named(_)) || element.is_function_pointer() {
            return Err(unsupported("variadic elements must be scalars or data pointers"));
        }
        self.check_complete_pointee(element)?;
        if self.analyzer.classify_pointee(element)?.is_identical() {
            Ok(())
        } else {
            Err(unsupported("variadic elements must have identical guest and host layout"))
        }
    }

    fn check_callback(
        &mut self,
        owner: &str,
        callback: &FunctionType,
        annotations: &[ParamAnnotations],
    ) -> Result<()> {
        let arity = callback.params.len();
        if !is_supported_callback_arity(arity) || callback.is_variadic {
            return Err(GenError::UnsupportedCallbackArity {
                signature: callback_text(callback),
                arity,
            });
        }
        fn_pointer_type(callback)?;

        for (index, param) in callback.params.iter().enumerate() {
            let unchecked = annotations
                .get(index)
                .is_some_and(|a| a.passthrough || a.skips_pointee_check());
            if unchecked {
                continue;
            }
            self.check_complete_pointee(param)?;
            let unsupported = |detail: &str| GenError::UnsupportedParameter {
                function: owner.to_string(),
                index,
                ty: param.to_string(),
                detail: format!("callback {} {detail}", callback_text(callback)),
            };
            if let CType::Named(record) = param.strip_const() {
                if self.analyzer.classify(record)?.is_incompatible() {
                    return Err(unsupported("takes an incompatible record"));
                }
            }
            // Pointers reach the guest unconverted, so the pointee must
            // already be in guest layout
            if let Some(CType::Named(record)) = param.strip_const().pointee().map(CType::strip_const) {
                if !self.analyzer.classify(record)?.is_identical() {
                    return Err(unsupported(
                        "takes a pointer to a record whose layout differs; annotate passthrough or ptr_passthrough",
                    ));
                }
            }
        }
        let returned = callback.return_type.strip_const();
        let pointee = returned.pointee().map(CType::strip_const);
        if let Some(CType::Named(record)) = pointee {
            self.check_complete_pointee(returned)?;
            if !self.analyzer.classify(record)?.is_identical() {
                return Err(GenError::UnsupportedReturn {
                    function: owner.to_string(),
                    ty: callback.return_type.to_string(),
                    detail: format!(
                        "callback {} returns a pointer to a record whose layout differs",
                        callback_text(callback)
                    ),
                });
            }
        }
        if let CType::Named(record) = returned {
            if self.analyzer.classify(record)?.is_incompatible() {
                return Err(GenError::UnsupportedReturn {
                    function: owner.to_string(),
                    ty: callback.return_type.to_string(),
                    detail: format!("callback {} returns an incompatible record", callback_text(callback)),
                });
            }
        }
        Ok(())
    }

    fn register_callback(&mut self, callback: &FunctionType) {
        self.callbacks
            .entry(callback.clone())
            .or_insert_with(|| ThunkId::for_callback(callback));
    }

    /// Reject pointers (at any depth) to undeclared or incomplete records.
    fn check_complete_pointee(&self, ty: &CType) -> Result<()> {
        let mut current = ty.strip_const();
        let mut depth = 0;
        while let CType::Pointer(inner) = current {
            current = inner.strip_const();
            depth += 1;
        }
        match current {
            CType::Named(name) if depth > 0 && !self.interface.records.is_complete(name) => {
                Err(LayoutError::IncompleteType { name: name.clone() }.into())
            }
            _ => Ok(()),
        }
    }

    fn plan_wrappers(&mut self) -> Result<Vec<WrapperPlan>> {
        let interface = self.interface;
        let mut wrappers = Vec::new();
        for record in interface.records.iter().filter(|r| !r.is_incomplete()) {
            let name = record.name.clone();
            let plan = match self.analyzer.classify(&record.name)? {
                TypeLayoutClass::Identical => WrapperPlan::Identical { name },
                TypeLayoutClass::Repackable(_) if matches!(record.kind, RecordKind::Enum { .. }) => {
                    self.enum_cast(name, &record.kind)?
                }
                TypeLayoutClass::Repackable(fields) => WrapperPlan::Repack { name, fields },
                TypeLayoutClass::Incompatible if record.annotations.emit_layout_wrappers => {
                    match self.analyzer.matching_fields(&record.name) {
                        Some(fields) => WrapperPlan::Repack { name, fields },
                        None => {
                            log::warn!("{name}: emit_layout_wrappers ignored, member names differ");
                            WrapperPlan::Omitted { name }
                        }
                    }
                }
                TypeLayoutClass::Incompatible => WrapperPlan::Omitted { name },
            };
            wrappers.push(plan);
        }
        Ok(wrappers)
    }

    fn enum_cast(&self, name: String, kind: &RecordKind) -> Result<WrapperPlan> {
        let RecordKind::Enum { underlying } = kind else {
            return Ok(WrapperPlan::Omitted { name });
        };
        let Some(size) = self.abi.data_model().scalar(underlying) else {
            return Err(GenError::UnsupportedType {
                ty: underlying.to_string(),
                detail: format!("underlying type of enum '{name}' has no guest size"),
            });
        };
        Ok(WrapperPlan::EnumCast {
            guest_int: fixed_width_integer(underlying, size.size_bytes)?,
            guest_size: size.size_bytes,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(toml: &str, abi: GuestAbi) -> Result<ThunkPlan> {
        let iface = Interface::parse(toml).unwrap();
        Planner::new(&iface, abi).plan()
    }

    const RECORDS: &str = r#"
[library]
name = "libtest"

[[types]]
name = "Same"
fields = ["int a", "int b"]

[[types]]
name = "Reordered"
guest-fields = ["int a", "double b"]
host-fields = ["double b", "int a"]

[[types]]
name = "Renamed"
guest-fields = ["int a"]
host-fields = ["int x"]

[[types]]
name = "Opaque"
kind = "incomplete"
"#;

    fn with_function(signature: &str, extra: &str) -> String {
        format!("{RECORDS}\n[[functions]]\nsignature = \"{signature}\"\n{extra}\n")
    }

    fn only_function(toml: &str, abi: GuestAbi) -> Result<FunctionPlan> {
        Ok(plan(toml, abi)?.functions.remove(0))
    }

    #[test]
    fn arities_match_runtime() {
        assert_eq!(SUPPORTED_CALLBACK_ARITIES, thunk_runtime::SUPPORTED_CALLBACK_ARITIES);
    }

    #[test]
    fn scalar_and_record_params() {
        let f = only_function(&with_function("int f(int x, Same s, Reordered r)", ""), GuestAbi::X86_64).unwrap();
        assert!(f.params.iter().all(|p| p.kind == ParamKind::Convert));
        assert_eq!(f.params[2].ident, "a2");
    }

    #[test]
    fn incompatible_by_value_is_rejected() {
        let err = only_function(&with_function("void f(Renamed r)", ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedParameter { index: 0, .. }));
        assert!(err.to_string().contains("unsupported parameter type"));
    }

    #[test]
    fn incompatible_by_pointer_is_rejected_unless_annotated() {
        let err = only_function(&with_function("void f(Renamed* r)", ""), GuestAbi::X86_64).unwrap_err();
        assert!(err.to_string().contains("unsupported parameter type"));

        let f = only_function(
            &with_function("void f(Renamed* r)", "param-annotations = { 0 = [\"ptr_passthrough\"] }"),
            GuestAbi::X86_64,
        )
        .unwrap();
        assert_eq!(f.params[0].kind, ParamKind::Convert);
    }

    #[test]
    fn repackable_pointee_is_repacked() {
        let f = only_function(&with_function("void f(Reordered* r, const Reordered* c)", ""), GuestAbi::X86_64)
            .unwrap();
        assert_eq!(
            f.params[0].kind,
            ParamKind::RepackedPointer {
                record: "Reordered".into(),
                is_const: false
            }
        );
        assert_eq!(
            f.params[1].kind,
            ParamKind::RepackedPointer {
                record: "Reordered".into(),
                is_const: true
            }
        );
    }

    #[test]
    fn incomplete_pointee_always_fails() {
        for extra in ["", "param-annotations = { 0 = [\"ptr_passthrough\"] }"] {
            let err = only_function(&with_function("void f(Opaque* o)", extra), GuestAbi::X86_64).unwrap_err();
            assert!(err.to_string().contains("incomplete type"), "{err}");
        }
        let err = only_function(&with_function("void f(Undeclared** o)", ""), GuestAbi::X86_64).unwrap_err();
        assert!(err.to_string().contains("incomplete type"));
    }

    #[test]
    fn void_pointer_is_accepted_on_both_widths() {
        for abi in [GuestAbi::X86_32, GuestAbi::X86_64] {
            let f = only_function(&with_function("void f(void* p)", ""), abi).unwrap();
            assert_eq!(f.params[0].kind, ParamKind::Convert);
        }
    }

    #[test]
    fn pointer_to_pointer_depends_on_width() {
        assert!(only_function(&with_function("void f(char** argv)", ""), GuestAbi::X86_64).is_ok());
        assert!(only_function(&with_function("void f(char** argv)", ""), GuestAbi::X86_32).is_err());
    }

    #[test]
    fn passthrough_requires_custom_host_impl() {
        let err = only_function(
            &with_function("void f(Renamed r)", "param-annotations = { r = [\"passthrough\"] }"),
            GuestAbi::X86_64,
        )
        .unwrap_err();
        assert!(matches!(err, GenError::MalformedAnnotation { .. }));

        let f = only_function(
            &with_function(
                "void f(Renamed r)",
                "annotations = [\"custom_host_impl\"]\nparam-annotations = { r = [\"passthrough\"] }",
            ),
            GuestAbi::X86_64,
        )
        .unwrap();
        assert_eq!(f.params[0].kind, ParamKind::Passthrough);
        assert!(f.uses_external_host_impl());
    }

    #[test]
    fn variadic_requires_uniform_type() {
        let err = only_function(&with_function("int f(int n, ...)", ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::VariadicWithoutUniformType { .. }));

        let f = only_function(
            &with_function("int f(int n, ...)", "annotations = [\"uniform_va_type = char\"]"),
            GuestAbi::X86_64,
        )
        .unwrap();
        assert_eq!(f.variadic, Some(CType::Char));
        assert_eq!(f.packer_name(), "pack_f_internal");
        assert!(f.uses_external_host_impl());
    }

    #[test]
    fn variadic_elements_must_be_identical() {
        let err = only_function(
            &with_function("int f(int n, ...)", "annotations = [\"uniform_va_type = long\"]"),
            GuestAbi::X86_32,
        )
        .unwrap_err();
        assert!(matches!(err, GenError::UnsupportedParameter { index: 1, .. }));
    }

    #[test]
    fn function_pointer_return_needs_annotation() {
        let sig = "void (*get(int id))(char, char)";
        let err = only_function(&with_function(sig, ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::FunctionPointerReturn { .. }));
        assert!(only_function(&with_function(sig, "annotations = [\"returns_guest_pointer\"]"), GuestAbi::X86_64).is_ok());
    }

    #[test]
    fn callbacks_are_registered_once() {
        let toml = format!(
            "{}\n[[functions]]\nsignature = \"void g(int (*other)(char, char))\"\n\n[[callbacks]]\nsignature = \"void (int)\"\n",
            with_function("void f(int (*cb)(char, char))", "")
        );
        let plan = plan(&toml, GuestAbi::X86_64).unwrap();
        assert_eq!(plan.functions[0].params[0].kind, ParamKind::Callback);
        assert_eq!(plan.callbacks.len(), 2);
        assert_eq!(plan.export_count(), 5);
    }

    #[test]
    fn callback_stub_skips_export() {
        let f = plan(
            &with_function("void f(int (*cb)(char, char))", "param-annotations = { cb = [\"callback_stub\"] }"),
            GuestAbi::X86_64,
        )
        .unwrap();
        assert_eq!(f.functions[0].params[0].kind, ParamKind::CallbackStub);
        assert!(f.callbacks.is_empty());

        let err = only_function(
            &with_function("void f(int x)", "param-annotations = { x = [\"callback_stub\"] }"),
            GuestAbi::X86_64,
        )
        .unwrap_err();
        assert!(matches!(err, GenError::MalformedAnnotation { .. }));
    }

    #[test]
    fn callback_pointer_to_differing_record_is_rejected() {
        let err = only_function(&with_function("void g(void (*cb)(Reordered* r))", ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedParameter { index: 0, .. }));
        assert!(err.to_string().contains("layout differs"), "{err}");

        let err = only_function(&with_function("void g(void (*cb)(const Renamed* r))", ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedParameter { .. }));

        assert!(only_function(&with_function("void g(void (*cb)(Same* s))", ""), GuestAbi::X86_64).is_ok());

        let err = only_function(&with_function("void g(Reordered* (*cb)(void))", ""), GuestAbi::X86_64).unwrap_err();
        assert!(matches!(err, GenError::UnsupportedReturn { .. }));
    }

    #[test]
    fn declared_callback_pointer_can_pass_through() {
        let rejected = format!("{RECORDS}\n[[callbacks]]\nsignature = \"void (Reordered*)\"\n");
        assert!(plan(&rejected, GuestAbi::X86_64).is_err());

        let annotated = format!(
            "{RECORDS}\n[[callbacks]]\nsignature = \"void (Reordered*)\"\nparam-annotations = {{ 0 = [\"passthrough\"] }}\n"
        );
        assert_eq!(plan(&annotated, GuestAbi::X86_64).unwrap().callbacks.len(), 1);
    }

    #[test]
    fn unsupported_callback_arity() {
        let params = vec!["int"; 19].join(", ");
        let err = only_function(&with_function(&format!("void f(void (*cb)({params}))"), ""), GuestAbi::X86_64)
            .unwrap_err();
        assert!(matches!(err, GenError::UnsupportedCallbackArity { arity: 19, .. }));

        let params = vec!["int"; 23].join(", ");
        assert!(only_function(&with_function(&format!("void f(void (*cb)({params}))"), ""), GuestAbi::X86_64).is_ok());
    }

    #[test]
    fn wrappers_follow_classification() {
        let plan = plan(RECORDS, GuestAbi::X86_64).unwrap();
        let names: Vec<_> = plan.wrappers.iter().map(WrapperPlan::name).collect();
        assert_eq!(names, ["Renamed", "Reordered", "Same"]);
        assert!(matches!(plan.wrappers[0], WrapperPlan::Omitted { .. }));
        let WrapperPlan::Repack { fields, .. } = &plan.wrappers[1] else {
            panic!("Reordered should be repacked");
        };
        let order: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
        assert!(matches!(plan.wrappers[2], WrapperPlan::Identical { .. }));
    }

    #[test]
    fn forced_wrappers_for_matching_names() {
        let toml = r#"
[library]
name = "libtest"

[[types]]
name = "Holder"
fields = ["int* p"]
annotations = ["emit_layout_wrappers"]
"#;
        let plan = plan(toml, GuestAbi::X86_64).unwrap();
        assert!(matches!(&plan.wrappers[0], WrapperPlan::Repack { name, .. } if name == "Holder"));
    }
}
