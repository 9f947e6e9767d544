//! Host half with bindings in host layout and the custom host
//! implementations it calls.

use core::ffi::c_int;
use std::sync::Mutex;

use thunk_runtime::GuestLayout;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub a: isize,
    pub b: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: c_int,
    pub y: c_int,
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(pub isize);

/// Last point handed over by `fixture_record_point`.
pub static RECORDED_POINT: Mutex<Option<Point>> = Mutex::new(None);

/// Stores `a + b` in `a` and returns it.
unsafe fn impl_libc_fixture_pair_sum(p: *mut Pair) -> isize {
    let Some(pair) = p.as_mut() else {
        return -1;
    };
    pair.a += pair.b as isize;
    pair.a
}

unsafe fn impl_libc_fixture_pair_peek(p: *const Pair) -> isize {
    p.as_ref().map_or(-1, |pair| pair.a - pair.b as isize)
}

unsafe fn impl_libc_fixture_point_dot(a: Point, b: Point) -> c_int {
    a.x * b.x + a.y * b.y
}

unsafe fn impl_libc_fixture_next_mode(m: Mode) -> Mode {
    Mode(m.0 + 1)
}

unsafe fn impl_libc_fixture_apply(cb: Option<unsafe extern "C" fn(c_int, c_int) -> c_int>, x: c_int) -> c_int {
    match cb {
        Some(cb) => cb(x, x + 1),
        None => -1,
    }
}

unsafe fn impl_libc_fixture_has_callback(cb: Option<unsafe extern "C" fn()>) -> c_int {
    c_int::from(cb.is_some())
}

unsafe fn impl_libc_fixture_record_point(p: GuestLayout<Point>) {
    if let Ok(mut recorded) = RECORDED_POINT.lock() {
        *recorded = Some(p.data);
    }
}

/// `n` plus every variadic value.
unsafe fn impl_libc_fixture_sum(n: c_int, count: usize, va: *const c_int) -> c_int {
    if count == 0 || va.is_null() {
        return n;
    }
    std::slice::from_raw_parts(va, count).iter().fold(n, |acc, v| acc + v)
}

include!(concat!(env!("OUT_DIR"), "/libc_host.rs"));
