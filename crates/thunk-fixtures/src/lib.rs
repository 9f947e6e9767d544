//! Generated thunks compiled against `thunk-runtime`.
//!
//! The build script renders both halves of `interfaces/libc.thunks.toml`.
//! [`guest`] includes the guest half next to guest-layout bindings and
//! [`host`] includes the host half next to host-layout bindings and the
//! custom host implementations. Both live in one process, so a dispatcher
//! that looks ids up in the host export table stands in for the emulator.

#[cfg(target_pointer_width = "64")]
pub mod guest;
#[cfg(target_pointer_width = "64")]
pub mod host;
