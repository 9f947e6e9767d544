//! Rust source rendering for the two thunk halves.

pub mod guest;
pub mod host;

use std::fmt::Write as _;

use thunk_layout::PointerWidth;

use crate::model::ThunkPlan;

/// Indentation-aware line buffer.
#[derive(Debug, Default)]
pub(crate) struct SourceWriter {
    buf: String,
    indent: usize,
}

impl SourceWriter {
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.buf.push('\n');
            return;
        }
        let _ = writeln!(self.buf, "{}{text}", "    ".repeat(self.indent));
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Write `header {` and indent.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.push_block(format!("{} {{", header.as_ref()));
    }

    /// Dedent and write `}` followed by `suffix`.
    pub fn close(&mut self, suffix: &str) {
        self.pop_block(format!("}}{suffix}"));
    }

    /// Write `text` and indent what follows.
    pub fn push_block(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.indent += 1;
    }

    /// Dedent and write `text`.
    pub fn pop_block(&mut self, text: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Banner, module wrapper and allow list shared by both halves.
pub(crate) fn open_module(out: &mut SourceWriter, plan: &ThunkPlan, side: &str) {
    out.line(format!(
        "// {side} thunks for {} ({} guest). Generated by thunkgen, do not edit.",
        plan.library, plan.abi
    ));
    out.blank();
    out.open(format!("pub mod {}_{side}_thunks", plan.library_ident));
    out.line("#![allow(non_snake_case, non_camel_case_types, non_upper_case_globals, dead_code, unused_imports)]");
    out.line("#![allow(clippy::all)]");
    out.blank();
    out.line("use super::*;");
}

/// `repr` attribute for records the host reads in guest layout.
pub(crate) fn guest_record_repr(width: PointerWidth) -> &'static str {
    match width {
        PointerWidth::W32 => "#[repr(C, packed(4))]",
        PointerWidth::W64 => "#[repr(C)]",
    }
}

pub(crate) fn id_const(name: &str) -> String {
    format!("THUNK_ID_{name}")
}

pub(crate) fn callback_id_const(short: &str) -> String {
    format!("CALLBACK_THUNK_ID_{short}")
}
