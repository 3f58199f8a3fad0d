use core::ffi::{c_char, CStr};
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Raw `kind` values used by the instrumentation.
pub const KIND_INTEGER: u16 = 0x0000;
pub const KIND_FLOAT: u16 = 0x0001;
pub const KIND_UNKNOWN: u16 = 0xffff;

/// Header of a compiler-emitted type descriptor.
///
/// The NUL-terminated type name immediately follows `info`; `name` marks
/// where it starts and has no size of its own.
#[repr(C)]
#[derive(Debug)]
pub struct TypeDescriptor {
    pub kind: u16,
    pub info: u16,
    name: [c_char; 0],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    Float,
    /// Either the explicit unknown marker or a value this runtime does not
    /// understand. Carries the raw discriminant.
    Unknown(u16),
}

impl TypeKind {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            KIND_INTEGER => Self::Integer,
            KIND_FLOAT => Self::Float,
            other => Self::Unknown(other),
        }
    }
}

/// Borrowed view of a [`TypeDescriptor`] living in compiler-emitted data.
///
/// Holds a raw pointer rather than `&TypeDescriptor` so the trailing name
/// stays inside the borrowed provenance.
#[derive(Clone, Copy)]
pub struct TypeRef<'a> {
    ptr: NonNull<TypeDescriptor>,
    _marker: PhantomData<&'a TypeDescriptor>,
}

impl<'a> TypeRef<'a> {
    /// # Safety
    /// `ptr` must be null or point at a descriptor (header plus
    /// NUL-terminated name) valid for `'a`.
    pub unsafe fn from_ptr(ptr: *const TypeDescriptor) -> Option<Self> {
        NonNull::new(ptr as *mut TypeDescriptor).map(|ptr| Self {
            ptr,
            _marker: PhantomData,
        })
    }

    pub fn kind(&self) -> TypeKind {
        TypeKind::from_raw(self.raw_kind())
    }

    pub fn raw_kind(&self) -> u16 {
        unsafe { (*self.ptr.as_ptr()).kind }
    }

    pub fn info(&self) -> u16 {
        unsafe { (*self.ptr.as_ptr()).info }
    }

    /// Signedness bit of an integer descriptor.
    pub fn is_signed(&self) -> bool {
        self.info() & 1 != 0
    }

    /// Width of an integer type in bits, `None` if `info` encodes a shift
    /// wider than a `u32` can hold.
    pub fn integer_width(&self) -> Option<u32> {
        1u32.checked_shl(u32::from(self.info() >> 1))
    }

    /// Width of a floating type in bits.
    pub fn float_width(&self) -> u16 {
        self.info()
    }

    pub fn name(&self) -> &'a CStr {
        unsafe {
            let name = core::ptr::addr_of!((*self.ptr.as_ptr()).name) as *const c_char;
            CStr::from_ptr(name)
        }
    }
}

impl core::fmt::Debug for TypeRef<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeRef")
            .field("kind", &self.kind())
            .field("info", &self.info())
            .field("name", &self.name())
            .finish()
    }
}

/// Owned, statically allocatable descriptor with an inline name of `N`
/// bytes (including the terminating NUL).
#[repr(C)]
#[derive(Debug)]
pub struct TypeDescriptorStorage<const N: usize> {
    kind: u16,
    info: u16,
    name: [u8; N],
}

impl<const N: usize> TypeDescriptorStorage<N> {
    pub const fn new(kind: u16, info: u16, name: [u8; N]) -> Self {
        assert!(N > 0 && name[N - 1] == 0, "type name must be NUL-terminated");
        Self { kind, info, name }
    }

    /// Integer descriptor; `width` must be a power of two.
    pub const fn integer(signed: bool, width: u16, name: [u8; N]) -> Self {
        assert!(width.is_power_of_two(), "integer width must be a power of two");
        let info = ((width.trailing_zeros() as u16) << 1) | signed as u16;
        Self::new(KIND_INTEGER, info, name)
    }

    pub const fn float(width: u16, name: [u8; N]) -> Self {
        Self::new(KIND_FLOAT, width, name)
    }

    pub const fn unknown(name: [u8; N]) -> Self {
        Self::new(KIND_UNKNOWN, 0, name)
    }

    pub const fn as_ptr(&self) -> *const TypeDescriptor {
        self as *const Self as *const TypeDescriptor
    }

    pub fn as_type_ref(&self) -> TypeRef<'_> {
        TypeRef {
            ptr: NonNull::from(self).cast(),
            _marker: PhantomData,
        }
    }
}
