//! Packed argument records.
//!
//! Arguments cross the boundary as a pointer to a plain `#[repr(C)]` record
//! with one slot per parameter followed by the return slot. Records used by
//! host-to-guest callbacks are `PackedArgsN`. Records for guest calls into
//! host function pointers are `HostcallArgsN`, which carry the host function
//! address in a `cb` slot between the arguments and the return slot.
//!
//! With `guest-32bit`, records are packed to 4-byte alignment so that 8-byte
//! members land where the i386 ABI puts them.

use std::mem::MaybeUninit;

use crate::layout::GuestPtr;

/// Callback arities with runtime support.
pub const SUPPORTED_CALLBACK_ARITIES: &[usize] = &[
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 23,
];

pub fn is_supported_callback_arity(arity: usize) -> bool {
    SUPPORTED_CALLBACK_ARITIES.contains(&arity)
}

/// Invoke `$m!(PackedArgsN, HostcallArgsN; a0: A0, ...)` once per supported
/// callback arity.
macro_rules! for_each_callback_arity {
    ($m:ident) => {
        $m!(PackedArgs0, HostcallArgs0;);
        $m!(PackedArgs1, HostcallArgs1; a0: A0);
        $m!(PackedArgs2, HostcallArgs2; a0: A0, a1: A1);
        $m!(PackedArgs3, HostcallArgs3; a0: A0, a1: A1, a2: A2);
        $m!(PackedArgs4, HostcallArgs4; a0: A0, a1: A1, a2: A2, a3: A3);
        $m!(PackedArgs5, HostcallArgs5; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4);
        $m!(PackedArgs6, HostcallArgs6; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5);
        $m!(PackedArgs7, HostcallArgs7; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6);
        $m!(PackedArgs8, HostcallArgs8; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7);
        $m!(PackedArgs9, HostcallArgs9; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8);
        $m!(PackedArgs10, HostcallArgs10; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9);
        $m!(PackedArgs11, HostcallArgs11; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10);
        $m!(PackedArgs12, HostcallArgs12; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11);
        $m!(PackedArgs13, HostcallArgs13; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12);
        $m!(PackedArgs14, HostcallArgs14; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13);
        $m!(PackedArgs15, HostcallArgs15; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13, a14: A14);
        $m!(PackedArgs16, HostcallArgs16; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13, a14: A14, a15: A15);
        $m!(PackedArgs17, HostcallArgs17; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13, a14: A14, a15: A15, a16: A16);
        $m!(PackedArgs18, HostcallArgs18; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13, a14: A14, a15: A15, a16: A16, a17: A17);
        $m!(PackedArgs23, HostcallArgs23; a0: A0, a1: A1, a2: A2, a3: A3, a4: A4, a5: A5, a6: A6, a7: A7, a8: A8, a9: A9, a10: A10, a11: A11, a12: A12, a13: A13, a14: A14, a15: A15, a16: A16, a17: A17, a18: A18, a19: A19, a20: A20, a21: A21, a22: A22);
    };
}
pub(crate) use for_each_callback_arity;

macro_rules! packed_records {
    ($packed:ident, $hostcall:ident; $($a:ident : $A:ident),*) => {
        #[cfg_attr(feature = "guest-32bit", repr(C, packed(4)))]
        #[cfg_attr(not(feature = "guest-32bit"), repr(C))]
        pub struct $packed<$($A,)* R> {
            $(pub $a: $A,)*
            pub rv: MaybeUninit<R>,
        }

        impl<$($A,)* R> $packed<$($A,)* R> {
            #[allow(clippy::too_many_arguments)]
            pub fn new($($a: $A),*) -> Self {
                Self {
                    $($a,)*
                    rv: MaybeUninit::uninit(),
                }
            }
        }

        #[cfg_attr(feature = "guest-32bit", repr(C, packed(4)))]
        #[cfg_attr(not(feature = "guest-32bit"), repr(C))]
        pub struct $hostcall<$($A,)* R> {
            $(pub $a: $A,)*
            pub cb: GuestPtr,
            pub rv: MaybeUninit<R>,
        }

        impl<$($A,)* R> $hostcall<$($A,)* R> {
            #[allow(clippy::too_many_arguments)]
            pub fn new($($a: $A,)* cb: GuestPtr) -> Self {
                Self {
                    $($a,)*
                    cb,
                    rv: MaybeUninit::uninit(),
                }
            }
        }
    };
}

for_each_callback_arity!(packed_records);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn return_slot_follows_arguments() {
        assert_eq!(offset_of!(PackedArgs2<u8, u32, u16>, rv), 8);
        assert_eq!(size_of::<PackedArgs0<()>>(), 0);
        assert_eq!(
            offset_of!(HostcallArgs1<u32, u64>, cb),
            if cfg!(feature = "guest-32bit") { 4 } else { 8 }
        );
    }

    #[test]
    #[cfg(not(feature = "guest-32bit"))]
    fn natural_alignment_for_64_bit_guests() {
        assert_eq!(offset_of!(PackedArgs2<u32, f64, ()>, a1), 8);
    }

    #[test]
    #[cfg(feature = "guest-32bit")]
    fn i386_alignment_for_32_bit_guests() {
        assert_eq!(offset_of!(PackedArgs2<u32, f64, ()>, a1), 4);
    }

    #[test]
    fn supported_arities() {
        assert!(is_supported_callback_arity(0));
        assert!(is_supported_callback_arity(18));
        assert!(!is_supported_callback_arity(19));
        assert!(!is_supported_callback_arity(22));
        assert!(is_supported_callback_arity(23));
        assert!(!is_supported_callback_arity(24));
    }
}
