//! Export tables: the id-keyed handoff from guest to host.
//!
//! Each host thunk library exposes one terminated array of
//! `(id, function)` entries. The emulator resolves a guest's request for an
//! id by walking that array.

use std::ffi::c_void;

/// 256-bit thunk identifier (SHA-256 of the normalized signature).
pub type ThunkId = [u8; 32];

/// Entry point receiving a pointer to a packed argument record.
pub type ExportFn = unsafe extern "C" fn(*mut c_void);

/// One export table entry. The terminator has a null `id`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExportEntry {
    pub id: *const ThunkId,
    pub func: Option<ExportFn>,
}

impl ExportEntry {
    /// Marks the end of an export table.
    pub const TERMINATOR: ExportEntry = ExportEntry {
        id: std::ptr::null(),
        func: None,
    };

    pub const fn new(id: &'static ThunkId, func: ExportFn) -> Self {
        Self {
            id: id as *const ThunkId,
            func: Some(func),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.id.is_null()
    }
}

/// A fixed-size export table, last entry [`ExportEntry::TERMINATOR`].
#[repr(transparent)]
pub struct ExportTable<const N: usize>([ExportEntry; N]);

// Entries only reference 'static ids and functions and are never mutated
unsafe impl<const N: usize> Sync for ExportTable<N> {}

impl<const N: usize> ExportTable<N> {
    pub const fn new(entries: [ExportEntry; N]) -> Self {
        Self(entries)
    }

    /// Pointer to the first entry, as handed to the emulator.
    pub fn as_ptr(&self) -> *const ExportEntry {
        self.0.as_ptr()
    }

    /// Entries before the terminator.
    pub fn entries(&self) -> &[ExportEntry] {
        let len = self.0.iter().position(ExportEntry::is_terminator).unwrap_or(N);
        &self.0[..len]
    }

    pub fn lookup(&self, id: &ThunkId) -> Option<ExportFn> {
        // SAFETY: every non-terminator entry points at a 'static id
        self.entries()
            .iter()
            .find(|e| unsafe { &*e.id } == id)
            .and_then(|e| e.func)
    }
}

/// Find an id in a terminated export array.
///
/// # Safety
/// `table` must point to a terminated array of valid entries.
pub unsafe fn lookup_export(table: *const ExportEntry, id: &ThunkId) -> Option<ExportFn> {
    if table.is_null() {
        return None;
    }
    let mut cursor = table;
    while !(*cursor).is_terminator() {
        if &*(*cursor).id == id {
            return (*cursor).func;
        }
        cursor = cursor.add(1);
    }
    None
}

/// Lowercase hex rendering of an id, for diagnostics.
pub fn id_hex(id: &ThunkId) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static ID_A: ThunkId = [0xaa; 32];
    static ID_B: ThunkId = [0xbb; 32];

    unsafe extern "C" fn count(_args: *mut c_void) {
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    static TABLE: ExportTable<2> =
        ExportTable::new([ExportEntry::new(&ID_A, count), ExportEntry::TERMINATOR]);

    #[test]
    fn lookup_by_id() {
        assert_eq!(TABLE.entries().len(), 1);
        let f = TABLE.lookup(&ID_A).unwrap();
        unsafe { f(std::ptr::null_mut()) };
        assert!(CALLS.load(Ordering::SeqCst) >= 1);
        assert!(TABLE.lookup(&ID_B).is_none());
    }

    #[test]
    fn walk_terminated_array() {
        assert!(unsafe { lookup_export(TABLE.as_ptr(), &ID_A) }.is_some());
        assert!(unsafe { lookup_export(TABLE.as_ptr(), &ID_B) }.is_none());
        assert!(unsafe { lookup_export(std::ptr::null(), &ID_A) }.is_none());
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(id_hex(&ID_A).len(), 64);
        assert!(id_hex(&ID_B).starts_with("bbbb"));
    }
}
