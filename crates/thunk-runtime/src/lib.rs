//! Runtime support for generated guest/host thunks.
//!
//! The code generator emits guest and host thunk source that is `include!`d
//! into a guest crate and a host crate, both of which depend on this crate.
//! Build both with the `guest-32bit` feature for 32-bit guests.
//!
//! ## Modules
//!
//! - [`layout`]: Guest/host representation wrappers and repacking
//! - [`packed`]: Argument records for callbacks
//! - [`export`]: Host export tables keyed by thunk id
//! - [`callback`]: Host side of callbacks in both directions
//! - [`guest`]: Guest-to-host dispatch and guest callback unpacking
//! - [`trampoline`]: Host-callable trampolines for guest function pointers
//! - [`context`]: Trampoline call context
//! - [`loader`]: Host library loading

pub mod callback;
pub mod context;
pub mod error;
pub mod export;
pub mod guest;
pub mod layout;
pub mod loader;
pub mod packed;
pub mod trampoline;

pub use callback::{CallbackStub, CallbackUnpack, GuestWrapperForHostFunction, HostToGuestCallback};
pub use context::GuestcallInfo;
pub use error::{Result, RuntimeError};
pub use export::{id_hex, lookup_export, ExportEntry, ExportFn, ExportTable, ThunkId};
pub use guest::{
    install_host_dispatcher, invoke_host, CallHostFunction, GuestCallback, GuestCallbackUnpack,
    HostDispatcher,
};
pub use layout::{
    function_address, function_from_address, to_guest, GuestLayout, GuestPtr, GuestRepr, HostLayout,
    RepackedPointer, GUEST_POINTER_BITS,
};
pub use loader::HostLibrary;
pub use packed::{is_supported_callback_arity, SUPPORTED_CALLBACK_ARITIES};
pub use trampoline::{
    allocate_host_trampoline_for_guest_function, finalize_host_trampoline_for_guest_function,
    install_trampoline_allocator, trampoline_allocator, TrampolineAllocator,
};

/// Re-exported for generated host code.
pub use log;
