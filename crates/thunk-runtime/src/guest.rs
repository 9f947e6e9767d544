//! Guest-side runtime.
//!
//! Guest thunks pack their arguments into a record and hand it, together
//! with the function's 32-byte id, to the installed [`HostDispatcher`]. In
//! the other direction, [`GuestCallbackUnpack`] runs a guest callback from a
//! record packed by the host.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::OnceLock;

use crate::error::{Result, RuntimeError};
use crate::export::{id_hex, ThunkId};
use crate::layout::{function_address, function_from_address, GuestPtr};
use crate::packed::*;

/// Transfer of control from guest to host, supplied by the emulator.
pub trait HostDispatcher: Send + Sync {
    /// Run the host export `id` on the packed record at `args`.
    ///
    /// # Safety
    /// `args` must point to the record layout the export expects.
    unsafe fn invoke(&self, id: &ThunkId, args: *mut c_void);
}

static HOST_DISPATCHER: OnceLock<&'static dyn HostDispatcher> = OnceLock::new();

/// Install the process-wide host dispatcher. Only the first call wins.
pub fn install_host_dispatcher(dispatcher: &'static dyn HostDispatcher) -> Result<()> {
    HOST_DISPATCHER
        .set(dispatcher)
        .map_err(|_| RuntimeError::AlreadyInstalled {
            capability: "host dispatcher",
        })
}

/// Call the host export `id` with a packed record.
///
/// Aborts when no dispatcher is installed: the return slot would otherwise
/// be read uninitialized.
///
/// # Safety
/// `args` must point to the record layout the export expects.
pub unsafe fn invoke_host(id: &ThunkId, args: *mut c_void) {
    match HOST_DISPATCHER.get() {
        Some(dispatcher) => dispatcher.invoke(id, args),
        None => {
            log::error!("no host dispatcher installed, cannot call thunk {}", id_hex(id));
            std::process::abort()
        }
    }
}

/// Function pointer types the host can call back on the guest.
pub trait GuestCallback: Copy {
    /// Address of the guest unpacker for this signature.
    fn guest_unpacker() -> usize;
}

pub struct GuestCallbackUnpack<F>(PhantomData<F>);

pub struct CallHostFunction<F>(PhantomData<F>);

macro_rules! guest_callback_impls {
    ($packed:ident, $hostcall:ident; $($a:ident : $A:ident),*) => {
        impl<R: Copy, $($A: Copy),*> GuestCallbackUnpack<unsafe extern "C" fn($($A),*) -> R> {
            /// Unpack a host-built record and call the guest function at
            /// `target`. Aborts on a null `target`.
            ///
            /// # Safety
            /// `target` must have this signature and `argsv` must point to
            /// its packed record.
            pub unsafe extern "C" fn unpack(target: usize, argsv: *mut c_void) {
                let args = argsv.cast::<$packed<$($A,)* R>>();
                let Some(callback) = function_from_address::<unsafe extern "C" fn($($A),*) -> R>(target) else {
                    log::error!("host called a null guest function pointer");
                    std::process::abort()
                };
                let rv = callback($((*args).$a),*);
                (*args).rv = MaybeUninit::new(rv);
            }
        }

        impl<R: Copy, $($A: Copy),*> GuestCallback for unsafe extern "C" fn($($A),*) -> R {
            fn guest_unpacker() -> usize {
                GuestCallbackUnpack::<Self>::unpack as usize
            }
        }

        impl<R: Copy, $($A: Copy),*> CallHostFunction<unsafe extern "C" fn($($A),*) -> R> {
            /// Call a host function pointer the guest received earlier,
            /// through the host export `id`.
            ///
            /// # Safety
            /// `host_fn` must be a host function of this signature.
            #[allow(clippy::too_many_arguments)]
            pub unsafe fn call(id: &ThunkId, host_fn: unsafe extern "C" fn($($A),*) -> R, $($a: $A),*) -> R {
                let mut args = $hostcall::<$($A,)* R>::new($($a,)* function_address(Some(host_fn)) as GuestPtr);
                invoke_host(id, std::ptr::addr_of_mut!(args).cast());
                let rv = args.rv;
                rv.assume_init()
            }
        }
    };
}

for_each_callback_arity!(guest_callback_impls);
