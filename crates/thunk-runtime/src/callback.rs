//! Host-side callback support.
//!
//! - [`CallbackUnpack`]: host-callable packer a trampoline jumps to when
//!   native code calls a guest function pointer.
//! - [`GuestWrapperForHostFunction`]: export entry through which the guest
//!   calls a host function pointer.
//! - [`CallbackStub`]: replacement for callbacks annotated `callback_stub`.
//!
//! Implemented for `unsafe extern "C" fn` types of every supported arity.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::MaybeUninit;

use crate::context::{dispatch_to_guest, guestcall_info, GuestcallInfo};
use crate::layout::{function_from_address, GuestLayout, GuestRepr, HostLayout};
use crate::packed::*;

/// Function pointer types that can be called back into the guest.
pub trait HostToGuestCallback: Copy {
    /// Address of the host packer a trampoline for this type jumps to.
    fn host_packer() -> usize;
}

pub struct CallbackUnpack<F>(PhantomData<F>);

pub struct GuestWrapperForHostFunction<F>(PhantomData<F>);

pub struct CallbackStub<F>(PhantomData<F>);

macro_rules! host_callback_impls {
    ($packed:ident, $hostcall:ident; $($a:ident : $A:ident),*) => {
        impl<R: GuestRepr, $($A: GuestRepr),*> CallbackUnpack<unsafe extern "C" fn($($A),*) -> R> {
            /// Trampoline target: forwards the native call to the guest.
            ///
            /// # Safety
            /// Only reachable through a finalized trampoline.
            #[allow(clippy::too_many_arguments)]
            pub unsafe extern "C" fn call_guest_ptr($($a: $A),*) -> R {
                let info = guestcall_info();
                Self::call_with_info(info, $($a),*)
            }

            /// Pack the arguments in guest layout, run the guest callback and
            /// convert its result.
            ///
            /// # Safety
            /// `info` must describe a guest function of this signature.
            #[allow(clippy::too_many_arguments)]
            pub unsafe fn call_with_info(info: *const GuestcallInfo, $($a: $A),*) -> R {
                let mut packed = $packed::<$(GuestLayout<$A>,)* GuestLayout<R>>::new(
                    $(GuestLayout::from_host(&$a)),*
                );
                dispatch_to_guest(info, std::ptr::addr_of_mut!(packed).cast());
                let rv = packed.rv;
                HostLayout::from_guest(rv.assume_init()).data
            }
        }

        impl<R: GuestRepr, $($A: GuestRepr),*> HostToGuestCallback for unsafe extern "C" fn($($A),*) -> R {
            fn host_packer() -> usize {
                CallbackUnpack::<Self>::call_guest_ptr as usize
            }
        }

        impl<R: GuestRepr, $($A: GuestRepr),*> GuestWrapperForHostFunction<unsafe extern "C" fn($($A),*) -> R> {
            /// Export entry: calls the host function in the record's `cb`
            /// slot with the converted arguments.
            ///
            /// Aborts on a null `cb`: the guest reads the return slot
            /// unconditionally.
            ///
            /// # Safety
            /// `argsv` must point to a guest-built record of this signature.
            pub unsafe extern "C" fn call(argsv: *mut c_void) {
                let args = argsv.cast::<$hostcall<$(GuestLayout<$A>,)* GuestLayout<R>>>();
                let cb = (*args).cb;
                let Some(host_fn) = function_from_address::<unsafe extern "C" fn($($A),*) -> R>(cb as usize) else {
                    log::error!("guest called a null host function pointer");
                    std::process::abort()
                };
                let rv = host_fn($(HostLayout::<$A>::from_guest((*args).$a).data),*);
                (*args).rv = MaybeUninit::new(GuestLayout::from_host(&rv));
            }
        }

        impl<R, $($A),*> CallbackStub<unsafe extern "C" fn($($A),*) -> R> {
            /// Aborts: the callback was declared as never called.
            ///
            /// # Safety
            /// Never returns.
            #[allow(clippy::too_many_arguments)]
            pub unsafe extern "C" fn abort_stub($(_: $A),*) -> R {
                log::error!("stubbed callback was invoked by the host library");
                std::process::abort()
            }
        }
    };
}

for_each_callback_arity!(host_callback_impls);

#[cfg(all(test, not(feature = "guest-32bit")))]
mod tests {
    use super::*;
    use crate::guest::GuestCallback;
    use crate::layout::{function_address, GuestPtr};

    type AddFn = unsafe extern "C" fn(i32, i32) -> i32;
    type NotifyFn = unsafe extern "C" fn(u64);

    unsafe extern "C" fn loopback_call_callback(unpacker: usize, target: usize, args: *mut c_void) {
        let unpack: unsafe extern "C" fn(usize, *mut c_void) = std::mem::transmute(unpacker);
        unpack(target, args)
    }

    unsafe extern "C" fn guest_add(a: i32, b: i32) -> i32 {
        a + b
    }

    static LAST_NOTIFIED: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

    unsafe extern "C" fn guest_notify(value: u64) {
        LAST_NOTIFIED.store(value, std::sync::atomic::Ordering::SeqCst);
    }

    fn info_for(target: usize, unpacker: usize, packer: usize) -> GuestcallInfo {
        GuestcallInfo {
            host_packer: packer,
            call_callback: loopback_call_callback,
            guest_unpacker: unpacker,
            guest_target: target,
        }
    }

    #[test]
    fn host_calls_guest_callback() {
        let info = info_for(
            guest_add as usize,
            <AddFn as GuestCallback>::guest_unpacker(),
            <AddFn as HostToGuestCallback>::host_packer(),
        );
        let rv = unsafe { CallbackUnpack::<AddFn>::call_with_info(&info, 2, 40) };
        assert_eq!(rv, 42);
    }

    #[test]
    fn void_callback() {
        let info = info_for(
            guest_notify as usize,
            <NotifyFn as GuestCallback>::guest_unpacker(),
            <NotifyFn as HostToGuestCallback>::host_packer(),
        );
        unsafe { CallbackUnpack::<NotifyFn>::call_with_info(&info, 77) };
        assert_eq!(LAST_NOTIFIED.load(std::sync::atomic::Ordering::SeqCst), 77);
    }

    #[test]
    fn guest_calls_host_function_pointer() {
        unsafe extern "C" fn host_mul(a: i32, b: i32) -> i32 {
            a * b
        }
        let cb = function_address(Some(host_mul as AddFn)) as GuestPtr;
        let mut args = HostcallArgs2::<i32, i32, i32>::new(6, 7, cb);
        unsafe { GuestWrapperForHostFunction::<AddFn>::call(std::ptr::addr_of_mut!(args).cast()) };
        let rv = args.rv;
        assert_eq!(unsafe { rv.assume_init() }, 42);
    }

    const ABORT_CHILD_VAR: &str = "THUNK_RUNTIME_NULL_HOST_FN_CHILD";

    #[test]
    fn null_host_function_pointer_aborts() {
        if std::env::var_os(ABORT_CHILD_VAR).is_some() {
            let mut args = HostcallArgs1::<u64, ()>::new(1, 0);
            unsafe { GuestWrapperForHostFunction::<NotifyFn>::call(std::ptr::addr_of_mut!(args).cast()) };
            // Reaching this line means the call returned
            std::process::exit(0);
        }
        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .args(["--exact", "callback::tests::null_host_function_pointer_aborts", "--test-threads=1"])
            .env(ABORT_CHILD_VAR, "1")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap();
        assert!(!status.success(), "call returned after a null host function pointer");
    }

    #[test]
    fn distinct_packers_per_signature() {
        assert_ne!(
            <AddFn as HostToGuestCallback>::host_packer(),
            <NotifyFn as HostToGuestCallback>::host_packer()
        );
        let stub: Option<AddFn> = Some(CallbackStub::<AddFn>::abort_stub);
        assert!(stub.is_some());
    }
}
