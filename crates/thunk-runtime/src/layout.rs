//! Guest and host layout wrappers.
//!
//! A [`GuestLayout<T>`] holds a value of type `T` in the representation the
//! guest uses for it; a [`HostLayout<T>`] holds the native host value. Every
//! conversion between the two is an explicit call in one direction.

/// Integer type of a guest pointer.
#[cfg(feature = "guest-32bit")]
pub type GuestPtr = u32;
/// Integer type of a guest pointer.
#[cfg(not(feature = "guest-32bit"))]
pub type GuestPtr = u64;

/// Guest pointer width this runtime was built for.
pub const GUEST_POINTER_BITS: u32 = GuestPtr::BITS;

/// Types with a known guest representation.
///
/// `Guest` is the value as the guest stores it (same size and bit pattern as
/// the guest's C type). `from_guest` and `to_guest` convert between that
/// and the native host value.
pub trait GuestRepr: Sized {
    type Guest: Copy;

    fn from_guest(guest: Self::Guest) -> Self;

    fn to_guest(&self) -> Self::Guest;
}

/// A value in guest representation.
#[repr(transparent)]
pub struct GuestLayout<T: GuestRepr> {
    pub data: T::Guest,
}

impl<T: GuestRepr> Clone for GuestLayout<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: GuestRepr> Copy for GuestLayout<T> {}

impl<T: GuestRepr> std::fmt::Debug for GuestLayout<T>
where
    T::Guest: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestLayout").field("data", &self.data).finish()
    }
}

impl<T: GuestRepr> GuestLayout<T> {
    pub const fn new(data: T::Guest) -> Self {
        Self { data }
    }

    /// Convert a host value to guest representation.
    pub fn from_host(value: &T) -> Self {
        Self {
            data: value.to_guest(),
        }
    }
}

/// Values already in guest layout pass through unchanged. This is how
/// `passthrough` arguments are expressed in callback signatures.
impl<T: GuestRepr> GuestRepr for GuestLayout<T> {
    type Guest = GuestLayout<T>;

    fn from_guest(guest: Self::Guest) -> Self {
        guest
    }

    fn to_guest(&self) -> Self::Guest {
        *self
    }
}

/// A value converted to host representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLayout<T> {
    pub data: T,
}

impl<T: GuestRepr> HostLayout<T> {
    /// Convert a guest-layout value to host layout.
    pub fn from_guest(guest: GuestLayout<T>) -> Self {
        Self {
            data: T::from_guest(guest.data),
        }
    }
}

/// Convert a host-layout value back to guest layout.
pub fn to_guest<T: GuestRepr>(host: &HostLayout<T>) -> GuestLayout<T> {
    GuestLayout::from_host(&host.data)
}

/// Implement [`GuestRepr`] as the identity for types whose guest and host
/// layouts are bit-identical.
#[macro_export]
macro_rules! identical_layout {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::GuestRepr for $ty {
                type Guest = $ty;

                fn from_guest(guest: Self::Guest) -> Self {
                    guest
                }

                fn to_guest(&self) -> Self::Guest {
                    *self
                }
            }
        )+
    };
}

identical_layout!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, bool, ());

// size_t and friends follow the guest pointer width
impl GuestRepr for usize {
    type Guest = GuestPtr;

    fn from_guest(guest: GuestPtr) -> Self {
        guest as usize
    }

    fn to_guest(&self) -> GuestPtr {
        *self as GuestPtr
    }
}

impl GuestRepr for isize {
    #[cfg(feature = "guest-32bit")]
    type Guest = i32;
    #[cfg(not(feature = "guest-32bit"))]
    type Guest = i64;

    fn from_guest(guest: Self::Guest) -> Self {
        guest as isize
    }

    fn to_guest(&self) -> Self::Guest {
        *self as Self::Guest
    }
}

impl<T> GuestRepr for *mut T {
    type Guest = GuestPtr;

    fn from_guest(guest: GuestPtr) -> Self {
        guest as usize as *mut T
    }

    fn to_guest(&self) -> GuestPtr {
        *self as usize as GuestPtr
    }
}

impl<T> GuestRepr for *const T {
    type Guest = GuestPtr;

    fn from_guest(guest: GuestPtr) -> Self {
        guest as usize as *const T
    }

    fn to_guest(&self) -> GuestPtr {
        *self as usize as GuestPtr
    }
}

// Fixed-size record members convert element by element
impl<T: GuestRepr, const N: usize> GuestRepr for [T; N] {
    type Guest = [T::Guest; N];

    fn from_guest(guest: Self::Guest) -> Self {
        guest.map(T::from_guest)
    }

    fn to_guest(&self) -> Self::Guest {
        std::array::from_fn(|i| self[i].to_guest())
    }
}

/// Reinterpret an address as a nullable function pointer.
///
/// # Safety
/// `F` must be a function pointer type and `address` either zero or the
/// address of a function with that signature.
pub unsafe fn function_from_address<F: Copy>(address: usize) -> Option<F> {
    debug_assert_eq!(std::mem::size_of::<Option<F>>(), std::mem::size_of::<usize>());
    std::mem::transmute_copy::<usize, Option<F>>(&address)
}

/// Address of a nullable function pointer.
pub fn function_address<F: Copy>(f: Option<F>) -> usize {
    debug_assert_eq!(std::mem::size_of::<Option<F>>(), std::mem::size_of::<usize>());
    // SAFETY: `Option<F>` of a function pointer has the size and niche of a usize
    unsafe { std::mem::transmute_copy::<Option<F>, usize>(&f) }
}

macro_rules! function_pointer_repr {
    ($($A:ident),*) => {
        impl<R, $($A),*> GuestRepr for Option<unsafe extern "C" fn($($A),*) -> R> {
            type Guest = GuestPtr;

            fn from_guest(guest: GuestPtr) -> Self {
                // SAFETY: the guest hands over either null or the address of a
                // host-callable function (a finalized trampoline or a host
                // function it previously received)
                unsafe { function_from_address(guest as usize) }
            }

            fn to_guest(&self) -> GuestPtr {
                function_address(*self) as GuestPtr
            }
        }
    };
}

function_pointer_repr!();
function_pointer_repr!(A0);
function_pointer_repr!(A0, A1);
function_pointer_repr!(A0, A1, A2);
function_pointer_repr!(A0, A1, A2, A3);
function_pointer_repr!(A0, A1, A2, A3, A4);
function_pointer_repr!(A0, A1, A2, A3, A4, A5);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15, A16);
function_pointer_repr!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15, A16, A17);
function_pointer_repr!(
    A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15, A16, A17, A18, A19, A20,
    A21, A22
);

/// Host view of a guest object reached through a pointer to a repackable
/// type.
///
/// The guest object is converted into a host-layout temporary on creation.
/// On drop the temporary is converted back and written to the guest object,
/// unless the pointee is `const`.
pub struct RepackedPointer<T: GuestRepr> {
    guest: *mut GuestLayout<T>,
    host: Option<T>,
    write_back: bool,
}

impl<T: GuestRepr> RepackedPointer<T> {
    /// # Safety
    /// `guest` must be null or point to a valid guest object that outlives
    /// the returned value.
    pub unsafe fn new(guest: GuestLayout<*mut T>) -> Self {
        let guest = <*mut T>::from_guest(guest.data) as *mut GuestLayout<T>;
        let host = (!guest.is_null()).then(|| T::from_guest(guest.read_unaligned().data));
        Self {
            guest,
            host,
            write_back: true,
        }
    }

    /// Like [`RepackedPointer::new`] for `const` pointees: nothing is written back.
    ///
    /// # Safety
    /// Same as [`RepackedPointer::new`].
    pub unsafe fn new_const(guest: GuestLayout<*const T>) -> Self {
        let guest = <*const T>::from_guest(guest.data) as *mut GuestLayout<T>;
        let host = (!guest.is_null()).then(|| T::from_guest(guest.read_unaligned().data));
        Self {
            guest,
            host,
            write_back: false,
        }
    }

    /// Pointer to the host-layout temporary (null if the guest passed null).
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.host
            .as_mut()
            .map_or(std::ptr::null_mut(), |h| h as *mut T)
    }

    pub fn as_ptr(&self) -> *const T {
        self.host.as_ref().map_or(std::ptr::null(), |h| h as *const T)
    }
}

impl<T: GuestRepr> Drop for RepackedPointer<T> {
    fn drop(&mut self) {
        if !self.write_back {
            return;
        }
        if let Some(host) = &self.host {
            // SAFETY: non-null per `new`'s contract whenever `host` is set
            unsafe { self.guest.write_unaligned(GuestLayout::from_host(host)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(C)]
    struct Point {
        x: i32,
        y: i32,
    }

    crate::identical_layout!(Point);

    // Host declares (b, a); guest declares (a, b) with a 32-bit `long`.
    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(C)]
    struct Pair {
        b: i64,
        a: u8,
    }

    #[derive(Clone, Copy)]
    #[repr(C)]
    struct GuestPair {
        a: GuestLayout<u8>,
        b: GuestLayout<i32>,
    }

    impl GuestRepr for Pair {
        type Guest = GuestPair;

        fn from_guest(g: GuestPair) -> Self {
            Pair {
                a: HostLayout::<u8>::from_guest(g.a).data,
                b: HostLayout::<i32>::from_guest(g.b).data as i64,
            }
        }

        fn to_guest(&self) -> GuestPair {
            GuestPair {
                a: GuestLayout::from_host(&self.a),
                b: GuestLayout::from_host(&(self.b as i32)),
            }
        }
    }

    #[test]
    fn identical_round_trip() {
        let p = Point { x: 3, y: -4 };
        let guest = GuestLayout::from_host(&p);
        assert_eq!(guest.data, p);
        assert_eq!(HostLayout::from_guest(guest).data, p);
        assert_eq!(to_guest(&HostLayout { data: p }).data, p);
    }

    #[test]
    fn repacked_record_converts_each_field() {
        let guest = GuestLayout::<Pair>::new(GuestPair {
            a: GuestLayout::new(7),
            b: GuestLayout::new(-2),
        });
        let host = HostLayout::from_guest(guest).data;
        assert_eq!(host, Pair { b: -2, a: 7 });
        assert_eq!(std::mem::size_of::<GuestLayout<Pair>>(), 8);
    }

    #[test]
    fn pointers_use_guest_width() {
        assert_eq!(
            std::mem::size_of::<GuestLayout<*mut u8>>(),
            (GUEST_POINTER_BITS / 8) as usize
        );
        let p = 0x1000usize as *mut u8;
        let g = GuestLayout::from_host(&p);
        assert_eq!(g.data, 0x1000);
        assert_eq!(HostLayout::<*mut u8>::from_guest(g).data, p);
    }

    #[test]
    #[cfg(not(feature = "guest-32bit"))]
    fn function_pointers_round_trip() {
        unsafe extern "C" fn add(a: i32, b: i32) -> i32 {
            a + b
        }
        type AddFn = unsafe extern "C" fn(i32, i32) -> i32;
        let f: Option<AddFn> = Some(add);
        let g = GuestLayout::from_host(&f);
        let back = HostLayout::<Option<AddFn>>::from_guest(g).data.unwrap();
        assert_eq!(unsafe { back(2, 3) }, 5);

        let null = HostLayout::<Option<AddFn>>::from_guest(GuestLayout::new(0)).data;
        assert!(null.is_none());
    }

    #[test]
    fn arrays_convert_per_element() {
        let host: [usize; 3] = [1, 2, 3];
        let guest = GuestLayout::from_host(&host);
        assert_eq!(guest.data, [1 as GuestPtr, 2, 3]);
        assert_eq!(HostLayout::<[usize; 3]>::from_guest(guest).data, host);
    }

    #[test]
    fn passthrough_is_identity() {
        let g = GuestLayout::<u32>::new(9);
        let outer = GuestLayout::<GuestLayout<u32>>::from_host(&g);
        assert_eq!(HostLayout::from_guest(outer).data.data, 9);
    }

    #[test]
    #[cfg(not(feature = "guest-32bit"))]
    fn repacked_pointer_writes_back() {
        let mut guest_obj = GuestLayout::<Pair>::new(GuestPair {
            a: GuestLayout::new(1),
            b: GuestLayout::new(10),
        });
        let ptr = &mut guest_obj as *mut GuestLayout<Pair> as *mut Pair;
        {
            let mut repacked = unsafe { RepackedPointer::new(GuestLayout::from_host(&ptr)) };
            let host = unsafe { &mut *repacked.as_mut_ptr() };
            assert_eq!(host.b, 10);
            host.b = 20;
        }
        assert_eq!(guest_obj.data.b.data, 20);

        let cptr = ptr as *const Pair;
        {
            let repacked = unsafe { RepackedPointer::new_const(GuestLayout::from_host(&cptr)) };
            assert_eq!(unsafe { (*repacked.as_ptr()).a }, 1);
        }
    }

    #[test]
    fn repacked_null_pointer() {
        let null: *mut Pair = std::ptr::null_mut();
        let mut repacked = unsafe { RepackedPointer::new(GuestLayout::from_host(&null)) };
        assert!(repacked.as_mut_ptr().is_null());
    }
}
