//! Out-of-band call context for host-to-guest callbacks.
//!
//! A finalized trampoline loads the address of its [`GuestcallInfo`] into a
//! scratch register that the C calling convention leaves free (`r11` on
//! x86-64, `x11` on AArch64) and then jumps to the host packer. The host
//! packer reads that register through [`guestcall_info`] before touching
//! its arguments.

use std::ffi::c_void;

/// Per-trampoline call information.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GuestcallInfo {
    /// Host function that packs native arguments (the trampoline target).
    pub host_packer: usize,
    /// Emulator entry that runs `guest_unpacker(guest_target, args)` on the guest.
    pub call_callback: unsafe extern "C" fn(usize, usize, *mut c_void),
    /// Guest function that unpacks the argument record and calls the target.
    pub guest_unpacker: usize,
    /// The guest function pointer being wrapped.
    pub guest_target: usize,
}

/// Read the [`GuestcallInfo`] pointer placed by the trampoline.
///
/// # Safety
/// Must be the first thing a host packer does, and only when it was entered
/// through a trampoline.
#[inline(always)]
#[cfg(target_arch = "x86_64")]
pub unsafe fn guestcall_info() -> *const GuestcallInfo {
    let info: *const GuestcallInfo;
    std::arch::asm!("mov {}, r11", out(reg) info, options(nomem, nostack, preserves_flags));
    info
}

/// Read the [`GuestcallInfo`] pointer placed by the trampoline.
///
/// # Safety
/// Must be the first thing a host packer does, and only when it was entered
/// through a trampoline.
#[inline(always)]
#[cfg(target_arch = "aarch64")]
pub unsafe fn guestcall_info() -> *const GuestcallInfo {
    let info: *const GuestcallInfo;
    std::arch::asm!("mov {}, x11", out(reg) info, options(nomem, nostack, preserves_flags));
    info
}

/// Guest builds (e.g. i686) never run host packers.
///
/// # Safety
/// Always returns null.
#[inline(always)]
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub unsafe fn guestcall_info() -> *const GuestcallInfo {
    std::ptr::null()
}

/// Run the guest side of a callback: hand the packed record to the emulator,
/// which calls the guest unpacker with the guest target.
///
/// # Safety
/// `info` must point to a live [`GuestcallInfo`] and `packed` to the argument
/// record layout the guest unpacker expects.
pub unsafe fn dispatch_to_guest(info: *const GuestcallInfo, packed: *mut c_void) {
    let info = &*info;
    (info.call_callback)(info.guest_unpacker, info.guest_target, packed);
}
