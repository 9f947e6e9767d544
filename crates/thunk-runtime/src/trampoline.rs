//! Host-callable trampolines for guest function pointers.
//!
//! When a guest function pointer is handed to native host code, the guest
//! thunk asks the emulator to allocate a trampoline bound to the guest
//! target and its unpacker. The host thunk then finalizes the trampoline
//! with the host packer matching the pointer's signature. Native code calls
//! the trampoline like any other function.
//!
//! The emulator supplies the allocator through
//! [`install_trampoline_allocator`].

use std::sync::OnceLock;

use crate::callback::HostToGuestCallback;
use crate::error::{Result, RuntimeError};
use crate::guest::GuestCallback;
use crate::layout::{function_address, function_from_address, GuestLayout, GuestRepr, HostLayout};

pub trait TrampolineAllocator: Send + Sync {
    /// Guest side: reserve a trampoline for `guest_target`, dispatched
    /// through `guest_unpacker`. Returns the trampoline address.
    fn allocate(&self, guest_target: usize, guest_unpacker: usize) -> usize;

    /// Host side: bind a reserved trampoline to its host packer.
    fn finalize(&self, trampoline: usize, host_packer: usize);
}

static TRAMPOLINE_ALLOCATOR: OnceLock<&'static dyn TrampolineAllocator> = OnceLock::new();

/// Install the process-wide trampoline allocator. Only the first call wins.
pub fn install_trampoline_allocator(allocator: &'static dyn TrampolineAllocator) -> Result<()> {
    TRAMPOLINE_ALLOCATOR
        .set(allocator)
        .map_err(|_| RuntimeError::AlreadyInstalled {
            capability: "trampoline allocator",
        })
}

pub fn trampoline_allocator() -> Option<&'static dyn TrampolineAllocator> {
    TRAMPOLINE_ALLOCATOR.get().copied()
}

/// Guest side: replace a guest function pointer with a host-callable
/// trampoline. Null stays null.
pub fn allocate_host_trampoline_for_guest_function<F: GuestCallback>(target: Option<F>) -> Option<F> {
    let address = function_address(target);
    if address == 0 {
        return None;
    }
    match trampoline_allocator() {
        Some(allocator) => {
            let trampoline = allocator.allocate(address, F::guest_unpacker());
            // SAFETY: the trampoline has the calling convention of F
            unsafe { function_from_address(trampoline) }
        }
        None => {
            log::warn!("no trampoline allocator installed, passing guest function pointer {address:#x} unchanged");
            target
        }
    }
}

/// Host side: finalize the trampoline a guest passed in place of a function
/// pointer and return it as a native function pointer. Null stays null.
pub fn finalize_host_trampoline_for_guest_function<F>(guest: GuestLayout<Option<F>>) -> Option<F>
where
    F: HostToGuestCallback,
    Option<F>: GuestRepr,
{
    let target = HostLayout::from_guest(guest).data;
    let address = function_address(target);
    if address == 0 {
        return None;
    }
    match trampoline_allocator() {
        Some(allocator) => allocator.finalize(address, F::host_packer()),
        None => log::warn!("no trampoline allocator installed, trampoline {address:#x} left unfinalized"),
    }
    target
}

#[cfg(all(test, not(feature = "guest-32bit")))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type CompareFn = unsafe extern "C" fn(i8, i8) -> i32;

    const TRAMPOLINE_OFFSET: usize = 0x10_0000;

    #[derive(Default)]
    struct Recorder {
        allocated: Mutex<Vec<(usize, usize)>>,
        finalized: Mutex<Vec<(usize, usize)>>,
    }

    impl TrampolineAllocator for Recorder {
        fn allocate(&self, guest_target: usize, guest_unpacker: usize) -> usize {
            self.allocated.lock().unwrap().push((guest_target, guest_unpacker));
            guest_target + TRAMPOLINE_OFFSET
        }

        fn finalize(&self, trampoline: usize, host_packer: usize) {
            self.finalized.lock().unwrap().push((trampoline, host_packer));
        }
    }

    fn recorder() -> &'static Recorder {
        static RECORDER: OnceLock<Recorder> = OnceLock::new();
        let recorder = RECORDER.get_or_init(Recorder::default);
        let _ = install_trampoline_allocator(recorder);
        recorder
    }

    unsafe extern "C" fn compare(a: i8, b: i8) -> i32 {
        i32::from(a) - i32::from(b)
    }

    #[test]
    fn guest_allocation_records_unpacker() {
        let recorder = recorder();
        let trampoline = allocate_host_trampoline_for_guest_function(Some(compare as CompareFn)).unwrap();
        let target = compare as usize;
        assert_eq!(function_address(Some(trampoline)), target + TRAMPOLINE_OFFSET);
        assert!(recorder
            .allocated
            .lock()
            .unwrap()
            .contains(&(target, <CompareFn as GuestCallback>::guest_unpacker())));
    }

    #[test]
    fn host_finalization_records_packer() {
        let recorder = recorder();
        let guest = GuestLayout::<Option<CompareFn>>::from_host(&Some(compare as CompareFn));
        let host = finalize_host_trampoline_for_guest_function(guest).unwrap();
        assert_eq!(function_address(Some(host)), compare as usize);
        assert!(recorder
            .finalized
            .lock()
            .unwrap()
            .contains(&(compare as usize, <CompareFn as HostToGuestCallback>::host_packer())));
    }

    #[test]
    fn null_pointers_pass_through() {
        recorder();
        assert!(allocate_host_trampoline_for_guest_function::<CompareFn>(None).is_none());
        let guest = GuestLayout::<Option<CompareFn>>::new(0);
        assert!(finalize_host_trampoline_for_guest_function(guest).is_none());
    }

    #[test]
    fn second_install_is_rejected() {
        recorder();
        static OTHER: OnceLock<Recorder> = OnceLock::new();
        let err = install_trampoline_allocator(OTHER.get_or_init(Recorder::default)).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyInstalled { .. }));
    }
}
