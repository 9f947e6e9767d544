//! `thunkgen analyze`: layout classes and the checked thunk plan.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use thunk_gen::{ParamKind, Planner, ThunkPlan, WrapperPlan};
use thunk_interface::Interface;
use thunk_layout::{GuestAbi, LayoutAnalysis, LayoutAnalyzer};

use crate::Format;

pub fn run(interface_path: &Path, abi: GuestAbi, format: Format) -> Result<()> {
    if !interface_path.is_file() {
        bail!("interface declaration not found: {}", interface_path.display());
    }
    let interface = Interface::load(interface_path)
        .with_context(|| format!("loading {}", interface_path.display()))?;
    let (analysis, plan) = analyze(&interface, abi)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&to_json(&analysis, &plan))?),
        Format::Text => print!("{}", render_text(&analysis, &plan)),
    }
    Ok(())
}

fn analyze(interface: &Interface, abi: GuestAbi) -> Result<(LayoutAnalysis, ThunkPlan)> {
    let analysis = LayoutAnalyzer::new(&interface.records, abi)
        .analyze()
        .context("layout analysis")?;
    let plan = Planner::new(interface, abi)
        .plan()
        .with_context(|| format!("checking {}", interface.library.name))?;
    Ok((analysis, plan))
}

fn to_json(analysis: &LayoutAnalysis, plan: &ThunkPlan) -> serde_json::Value {
    let records: Vec<_> = analysis
        .classes()
        .map(|(name, class)| {
            serde_json::json!({
                "name": name,
                "layout": class,
                "guest": analysis.guest_layout(name),
                "host": analysis.host_layout(name),
            })
        })
        .collect();
    serde_json::json!({
        "records": records,
        "plan": plan,
    })
}

fn param_kind_label(kind: &ParamKind) -> String {
    match kind {
        ParamKind::Convert => "convert".to_string(),
        ParamKind::Passthrough => "passthrough".to_string(),
        ParamKind::Callback => "callback".to_string(),
        ParamKind::CallbackStub => "callback-stub".to_string(),
        ParamKind::RepackedPointer { record, is_const: true } => format!("repack const {record}"),
        ParamKind::RepackedPointer { record, is_const: false } => format!("repack {record}"),
    }
}

fn render_text(analysis: &LayoutAnalysis, plan: &ThunkPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} guest, loads {})", plan.library, plan.abi, plan.shared_object);

    let _ = writeln!(out, "\nRecords:");
    for (name, class) in analysis.classes() {
        let sizes = match (analysis.guest_layout(name), analysis.host_layout(name)) {
            (Some(g), Some(h)) => format!("guest {}/{}, host {}/{}", g.size, g.alignment, h.size, h.alignment),
            _ => String::new(),
        };
        let wrappers = plan
            .wrappers
            .iter()
            .find(|w| w.name() == name)
            .map(|w| match w {
                WrapperPlan::Identical { .. } => "identity wrappers",
                WrapperPlan::Repack { .. } => "repacking wrappers",
                WrapperPlan::EnumCast { .. } => "integer cast",
                WrapperPlan::Omitted { .. } => "no wrappers",
            })
            .unwrap_or("");
        let _ = writeln!(out, "  {name:<24} {:<12} {sizes:<28} {wrappers}", class.name());
    }

    let _ = writeln!(out, "\nFunctions:");
    for func in &plan.functions {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|p| format!("{}: {}", p.ident, param_kind_label(&p.kind)))
            .collect();
        let mut notes = Vec::new();
        if let Some(element) = &func.variadic {
            notes.push(format!("variadic {element}"));
        }
        if func.uses_external_host_impl() {
            notes.push("external host impl".to_string());
        }
        let _ = writeln!(
            out,
            "  {:<24} {}  [{}]{}",
            func.name,
            func.id.short(),
            params.join(", "),
            if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join(", "))
            }
        );
    }

    let _ = writeln!(out, "\nCallbacks:");
    for callback in &plan.callbacks {
        let _ = writeln!(
            out,
            "  {:<24} {}",
            thunk_gen::callback_text(&callback.function_type),
            callback.id.short()
        );
    }
    let _ = writeln!(out, "\n{} export entries", plan.export_count() - 1);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACE: &str = r#"
[library]
name = "libtest"
annotations = ["version = 2"]

[[types]]
name = "Pair"
guest-fields = ["int b", "long a"]
host-fields = ["long a", "int b"]

[[functions]]
signature = "void fill(Pair* p)"

[[functions]]
signature = "int apply(int (*cb)(char, char), void* data)"
annotations = ["custom_host_impl"]
"#;

    fn load(contents: &str) -> Interface {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libtest.thunks.toml");
        std::fs::write(&path, contents).unwrap();
        Interface::load(&path).unwrap()
    }

    #[test]
    fn text_report() {
        let (analysis, plan) = analyze(&load(INTERFACE), GuestAbi::X86_32).unwrap();
        let text = render_text(&analysis, &plan);
        assert!(text.starts_with("libtest (x86-32 guest, loads libtest.so.2)"));
        assert!(text.contains("Pair"));
        assert!(text.contains("repackable"));
        assert!(text.contains("[a0: repack Pair]"));
        assert!(text.contains("int (char, char)"));
        assert!(text.contains("3 export entries"));
    }

    #[test]
    fn json_report() {
        let (analysis, plan) = analyze(&load(INTERFACE), GuestAbi::X86_64).unwrap();
        let json = to_json(&analysis, &plan);
        assert_eq!(json["plan"]["library"], "libtest");
        assert_eq!(json["plan"]["abi"], "x86-64");
        let fill = &json["plan"]["functions"][0];
        assert_eq!(fill["name"], "fill");
        assert_eq!(fill["id"].as_str().unwrap().len(), 64);
        assert_eq!(json["records"][0]["name"], "Pair");
    }

    #[test]
    fn width_dependent_enum_is_cast() {
        let iface = load(
            r#"
[library]
name = "libtest"

[[types]]
name = "Mode"
kind = "enum"
underlying = "long"

[[functions]]
signature = "void set_mode(Mode m)"
"#,
        );
        let (analysis, plan) = analyze(&iface, GuestAbi::X86_32).unwrap();
        let text = render_text(&analysis, &plan);
        assert!(text.contains("repackable"));
        assert!(text.contains("integer cast"));
    }

    #[test]
    fn incomplete_pointee_is_reported() {
        let err = analyze(
            &load(
                r#"
[library]
name = "libtest"

[[functions]]
signature = "void f(Missing* m)"
"#,
            ),
            GuestAbi::X86_64,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("incomplete type 'Missing'"));
    }
}
