//! Guest half with bindings in guest layout.

use core::ffi::c_int;

/// `Pair` as the guest declares it: `b` first.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub b: c_int,
    pub a: isize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: c_int,
    pub y: c_int,
}

/// Enum with a `long` underlying type.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(pub isize);

include!(concat!(env!("OUT_DIR"), "/libc_guest.rs"));
