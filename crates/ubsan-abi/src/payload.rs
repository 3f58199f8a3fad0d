//! Per-check payload records.
//!
//! Field order and widths follow the instrumentation; descriptor references
//! (C++ `const TypeDescriptor &`) are plain pointers. All records are
//! `Sync` so they can sit in `static`s: after emission the only mutation is
//! the atomic reported flag inside [`SourceLocation`].

use core::ffi::c_void;

use crate::descriptor::{TypeDescriptor, TypeDescriptorStorage};
use crate::location::SourceLocation;

macro_rules! static_payload {
    ($($ty:ident),* $(,)?) => {
        $(
            unsafe impl Sync for $ty {}
            unsafe impl Send for $ty {}
        )*
    };
}

/// add / sub / mul / divrem / negate.
#[repr(C)]
#[derive(Debug)]
pub struct OverflowData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
}

impl OverflowData {
    pub const fn new<const N: usize>(loc: SourceLocation, ty: &'static TypeDescriptorStorage<N>) -> Self {
        Self { loc, ty: ty.as_ptr() }
    }
}

/// `__builtin_unreachable()` and falling off a value-returning function.
#[repr(C)]
#[derive(Debug)]
pub struct UnreachableData {
    pub loc: SourceLocation,
}

#[repr(C)]
#[derive(Debug)]
pub struct CfiCheckFailData {
    pub check_kind: u8,
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
}

#[repr(C)]
#[derive(Debug)]
pub struct DynamicTypeCacheMissData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
    pub type_info: *const c_void,
    pub type_check_kind: u8,
}

#[repr(C)]
#[derive(Debug)]
pub struct FloatCastOverflowData {
    pub loc: SourceLocation,
    pub from_ty: *const TypeDescriptor,
    pub to_ty: *const TypeDescriptor,
}

#[repr(C)]
#[derive(Debug)]
pub struct FunctionTypeMismatchData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
}

#[repr(C)]
#[derive(Debug)]
pub struct ImplicitConversionData {
    pub loc: SourceLocation,
    pub from_ty: *const TypeDescriptor,
    pub to_ty: *const TypeDescriptor,
    pub kind: u8,
}

#[repr(C)]
#[derive(Debug)]
pub struct InvalidBuiltinData {
    pub loc: SourceLocation,
    pub kind: u8,
}

/// `-fsanitize=bool` / `-fsanitize=enum` loads.
#[repr(C)]
#[derive(Debug)]
pub struct InvalidValueData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
}

/// Shared by `nonnull_arg` and `nullability_arg`.
#[repr(C)]
#[derive(Debug)]
pub struct NonNullArgData {
    pub loc: SourceLocation,
    pub attr_loc: SourceLocation,
    pub arg_index: i32,
}

/// Shared by `nonnull_return_v1` and `nullability_return_v1`; the check
/// location travels as a separate argument.
#[repr(C)]
#[derive(Debug)]
pub struct NonNullReturnData {
    pub attr_loc: SourceLocation,
}

#[repr(C)]
#[derive(Debug)]
pub struct OutOfBoundsData {
    pub loc: SourceLocation,
    pub array_ty: *const TypeDescriptor,
    pub index_ty: *const TypeDescriptor,
}

#[repr(C)]
#[derive(Debug)]
pub struct PointerOverflowData {
    pub loc: SourceLocation,
}

#[repr(C)]
#[derive(Debug)]
pub struct ShiftOutOfBoundsData {
    pub loc: SourceLocation,
    pub lhs_ty: *const TypeDescriptor,
    pub rhs_ty: *const TypeDescriptor,
}

/// Original `type_mismatch` record with a full-width alignment.
#[repr(C)]
#[derive(Debug)]
pub struct TypeMismatchData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
    pub alignment: usize,
    pub type_check_kind: u8,
}

/// `type_mismatch_v1`: alignment is stored as its log2.
#[repr(C)]
#[derive(Debug)]
pub struct TypeMismatchDataV1 {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
    pub log_alignment: u8,
    pub type_check_kind: u8,
}

#[repr(C)]
#[derive(Debug)]
pub struct VlaBoundData {
    pub loc: SourceLocation,
    pub ty: *const TypeDescriptor,
}

static_payload!(
    OverflowData,
    UnreachableData,
    CfiCheckFailData,
    DynamicTypeCacheMissData,
    FloatCastOverflowData,
    FunctionTypeMismatchData,
    ImplicitConversionData,
    InvalidBuiltinData,
    InvalidValueData,
    NonNullArgData,
    NonNullReturnData,
    OutOfBoundsData,
    PointerOverflowData,
    ShiftOutOfBoundsData,
    TypeMismatchData,
    TypeMismatchDataV1,
    VlaBoundData,
);

/// What the checked access was doing when the type check failed.
pub fn type_check_kind_name(kind: u8) -> &'static str {
    match kind {
        0 => "load of",
        1 => "store to",
        2 => "reference binding to",
        3 => "member access within",
        4 => "member call on",
        5 => "constructor call on",
        6 | 7 => "downcast of",
        8 => "upcast of",
        9 => "cast to virtual base of",
        10 => "_Nonnull binding to",
        11 => "dynamic operation on",
        _ => "<unknown>",
    }
}

pub fn cfi_check_kind_name(kind: u8) -> &'static str {
    match kind {
        0 => "virtual call",
        1 => "non-virtual call",
        2 => "base-to-derived cast",
        3 => "cast to unrelated type",
        4 => "indirect function call",
        5 => "non-virtual pointer to member function call",
        6 => "virtual pointer to member function call",
        _ => "<unknown>",
    }
}

pub fn builtin_check_kind_name(kind: u8) -> &'static str {
    match kind {
        0 => "ctz()",
        1 => "clz()",
        _ => "<unknown>",
    }
}
