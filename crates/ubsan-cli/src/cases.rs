//! Synthetic check failures.
//!
//! Each case owns a static payload laid out exactly as `-fsanitize=undefined`
//! would emit it, so firing a case exercises the same path as a real
//! instrumented program. Payloads are process-wide: repeated or concurrent
//! firings of one case hit one source location.

use clap::ValueEnum;
use ubsan_abi::{
    FloatCastOverflowData, ImplicitConversionData, InvalidBuiltinData, InvalidValueData,
    NonNullArgData, OutOfBoundsData, OverflowData, PointerOverflowData, ShiftOutOfBoundsData,
    SourceLocation, TypeDescriptorStorage, TypeMismatchDataV1, UnreachableData, VlaBoundData,
};
use ubsan_rt::handlers::exports::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Case {
    /// INT_MAX + 1
    Add,
    /// INT_MIN - 1
    Sub,
    /// 65536 * 65536
    Mul,
    /// 1 / 0
    Divrem,
    /// -INT_MIN
    Negate,
    /// UINT_MAX + 1
    UnsignedAdd,
    /// 1 << 32 on int
    Shift,
    /// int[10] indexed at 10
    OutOfBounds,
    /// 0x1000 + offset wrapping to null
    PointerOverflow,
    /// bool holding 2
    LoadInvalidValue,
    /// 1e10f converted to int
    FloatCastOverflow,
    /// int load from 0x1001
    TypeMismatch,
    /// int[-5]
    VlaBound,
    /// null passed to a nonnull parameter
    NonnullArg,
    /// __builtin_ctz(0)
    InvalidBuiltin,
    /// int -1 narrowed to unsigned char
    ImplicitConversion,
    /// Operand descriptor with an unrecognised kind
    UnknownType,
    /// __builtin_unreachable() reached
    BuiltinUnreachable,
    /// Fell off the end of a value-returning function
    MissingReturn,
}

static INT: TypeDescriptorStorage<4> = TypeDescriptorStorage::integer(true, 32, *b"int\0");
static UINT: TypeDescriptorStorage<13> =
    TypeDescriptorStorage::integer(false, 32, *b"unsigned int\0");
static UCHAR: TypeDescriptorStorage<14> =
    TypeDescriptorStorage::integer(false, 8, *b"unsigned char\0");
static BOOL: TypeDescriptorStorage<5> = TypeDescriptorStorage::integer(false, 8, *b"bool\0");
static FLOAT: TypeDescriptorStorage<6> = TypeDescriptorStorage::float(32, *b"float\0");
static INT_ARRAY: TypeDescriptorStorage<8> = TypeDescriptorStorage::unknown(*b"int[10]\0");
static MYSTERY: TypeDescriptorStorage<8> = TypeDescriptorStorage::unknown(*b"mystery\0");

const fn at(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new(c"prog.c", line, column)
}

static ADD: OverflowData = OverflowData::new(at(10, 5), &INT);
static SUB: OverflowData = OverflowData::new(at(11, 5), &INT);
static MUL: OverflowData = OverflowData::new(at(12, 5), &INT);
static DIVREM: OverflowData = OverflowData::new(at(13, 5), &INT);
static UNSIGNED_ADD: OverflowData = OverflowData::new(at(14, 5), &UINT);
static NEGATE: OverflowData = OverflowData::new(at(20, 3), &INT);
static UNKNOWN_TYPE: OverflowData = OverflowData::new(at(25, 1), &MYSTERY);

static SHIFT: ShiftOutOfBoundsData = ShiftOutOfBoundsData {
    loc: at(30, 9),
    lhs_ty: INT.as_ptr(),
    rhs_ty: INT.as_ptr(),
};
static OUT_OF_BOUNDS: OutOfBoundsData = OutOfBoundsData {
    loc: at(40, 12),
    array_ty: INT_ARRAY.as_ptr(),
    index_ty: INT.as_ptr(),
};
static POINTER_OVERFLOW: PointerOverflowData = PointerOverflowData { loc: at(50, 7) };
static LOAD_INVALID_VALUE: InvalidValueData = InvalidValueData {
    loc: at(60, 3),
    ty: BOOL.as_ptr(),
};
static FLOAT_CAST_OVERFLOW: FloatCastOverflowData = FloatCastOverflowData {
    loc: at(70, 3),
    from_ty: FLOAT.as_ptr(),
    to_ty: INT.as_ptr(),
};
static TYPE_MISMATCH: TypeMismatchDataV1 = TypeMismatchDataV1 {
    loc: at(80, 4),
    ty: INT.as_ptr(),
    log_alignment: 2,
    type_check_kind: 0,
};
static VLA_BOUND: VlaBoundData = VlaBoundData {
    loc: at(90, 8),
    ty: INT.as_ptr(),
};
static NONNULL_ARG: NonNullArgData = NonNullArgData {
    loc: at(100, 6),
    attr_loc: at(3, 20),
    arg_index: 1,
};
static INVALID_BUILTIN: InvalidBuiltinData = InvalidBuiltinData {
    loc: at(110, 3),
    kind: 0,
};
static IMPLICIT_CONVERSION: ImplicitConversionData = ImplicitConversionData {
    loc: at(115, 3),
    from_ty: INT.as_ptr(),
    to_ty: UCHAR.as_ptr(),
    kind: 1,
};
static UNREACHABLE: UnreachableData = UnreachableData { loc: at(130, 1) };
static MISSING_RETURN: UnreachableData = UnreachableData { loc: at(131, 1) };

const fn word(v: i32) -> usize {
    v as u32 as usize
}

/// Hit the handler for `case` once, through its continue or abort entry.
pub fn fire(case: Case, abort: bool) {
    // Safety: every payload is a well-formed static and every operand fits
    // in a machine word.
    unsafe {
        match (case, abort) {
            (Case::Add, false) => __ubsan_handle_add_overflow(&ADD, word(i32::MAX), 1),
            (Case::Add, true) => __ubsan_handle_add_overflow_abort(&ADD, word(i32::MAX), 1),
            (Case::Sub, false) => __ubsan_handle_sub_overflow(&SUB, word(i32::MIN), 1),
            (Case::Sub, true) => __ubsan_handle_sub_overflow_abort(&SUB, word(i32::MIN), 1),
            (Case::Mul, false) => __ubsan_handle_mul_overflow(&MUL, 65536, 65536),
            (Case::Mul, true) => __ubsan_handle_mul_overflow_abort(&MUL, 65536, 65536),
            (Case::Divrem, false) => __ubsan_handle_divrem_overflow(&DIVREM, 1, 0),
            (Case::Divrem, true) => __ubsan_handle_divrem_overflow_abort(&DIVREM, 1, 0),
            (Case::Negate, false) => __ubsan_handle_negate_overflow(&NEGATE, word(i32::MIN)),
            (Case::Negate, true) => {
                __ubsan_handle_negate_overflow_abort(&NEGATE, word(i32::MIN))
            }
            (Case::UnsignedAdd, false) => {
                __ubsan_handle_add_overflow(&UNSIGNED_ADD, u32::MAX as usize, 1)
            }
            (Case::UnsignedAdd, true) => {
                __ubsan_handle_add_overflow_abort(&UNSIGNED_ADD, u32::MAX as usize, 1)
            }
            (Case::Shift, false) => __ubsan_handle_shift_out_of_bounds(&SHIFT, 1, 32),
            (Case::Shift, true) => __ubsan_handle_shift_out_of_bounds_abort(&SHIFT, 1, 32),
            (Case::OutOfBounds, false) => __ubsan_handle_out_of_bounds(&OUT_OF_BOUNDS, 10),
            (Case::OutOfBounds, true) => {
                __ubsan_handle_out_of_bounds_abort(&OUT_OF_BOUNDS, 10)
            }
            (Case::PointerOverflow, false) => {
                __ubsan_handle_pointer_overflow(&POINTER_OVERFLOW, 0x1000, 0)
            }
            (Case::PointerOverflow, true) => {
                __ubsan_handle_pointer_overflow_abort(&POINTER_OVERFLOW, 0x1000, 0)
            }
            (Case::LoadInvalidValue, false) => {
                __ubsan_handle_load_invalid_value(&LOAD_INVALID_VALUE, 2)
            }
            (Case::LoadInvalidValue, true) => {
                __ubsan_handle_load_invalid_value_abort(&LOAD_INVALID_VALUE, 2)
            }
            (Case::FloatCastOverflow, false) => __ubsan_handle_float_cast_overflow(
                &FLOAT_CAST_OVERFLOW,
                1e10f32.to_bits() as usize,
            ),
            (Case::FloatCastOverflow, true) => __ubsan_handle_float_cast_overflow_abort(
                &FLOAT_CAST_OVERFLOW,
                1e10f32.to_bits() as usize,
            ),
            (Case::TypeMismatch, false) => __ubsan_handle_type_mismatch_v1(&TYPE_MISMATCH, 0x1001),
            (Case::TypeMismatch, true) => {
                __ubsan_handle_type_mismatch_v1_abort(&TYPE_MISMATCH, 0x1001)
            }
            (Case::VlaBound, false) => __ubsan_handle_vla_bound_not_positive(&VLA_BOUND, word(-5)),
            (Case::VlaBound, true) => {
                __ubsan_handle_vla_bound_not_positive_abort(&VLA_BOUND, word(-5))
            }
            (Case::NonnullArg, false) => __ubsan_handle_nonnull_arg(&NONNULL_ARG),
            (Case::NonnullArg, true) => __ubsan_handle_nonnull_arg_abort(&NONNULL_ARG),
            (Case::InvalidBuiltin, false) => __ubsan_handle_invalid_builtin(&INVALID_BUILTIN),
            (Case::InvalidBuiltin, true) => {
                __ubsan_handle_invalid_builtin_abort(&INVALID_BUILTIN)
            }
            (Case::ImplicitConversion, false) => {
                __ubsan_handle_implicit_conversion(&IMPLICIT_CONVERSION, word(-1), 255)
            }
            (Case::ImplicitConversion, true) => {
                __ubsan_handle_implicit_conversion_abort(&IMPLICIT_CONVERSION, word(-1), 255)
            }
            (Case::UnknownType, false) => __ubsan_handle_add_overflow(&UNKNOWN_TYPE, 1, 1),
            (Case::UnknownType, true) => __ubsan_handle_add_overflow_abort(&UNKNOWN_TYPE, 1, 1),
            (Case::BuiltinUnreachable, _) => __ubsan_handle_builtin_unreachable(&UNREACHABLE),
            (Case::MissingReturn, _) => __ubsan_handle_missing_return(&MISSING_RETURN),
        }
    }
}

/// Whether the runtime always terminates on this case, whatever the policy.
pub fn always_fatal(case: Case) -> bool {
    matches!(
        case,
        Case::UnknownType | Case::BuiltinUnreachable | Case::MissingReturn
    )
}
