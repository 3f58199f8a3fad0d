//! The `__ubsan_handle_*` symbols.
//!
//! Recoverable checks get a pair: the plain symbol reports and returns, the
//! `_abort` symbol reports and never returns. Both call the same category
//! handler with a different `fatal` flag.

use ubsan_abi::{
    CfiCheckFailData, DynamicTypeCacheMissData, FloatCastOverflowData, FunctionTypeMismatchData,
    ImplicitConversionData, InvalidBuiltinData, InvalidValueData, NonNullArgData,
    NonNullReturnData, OutOfBoundsData, OverflowData, PointerOverflowData, ShiftOutOfBoundsData,
    SourceLocation, TypeMismatchData, TypeMismatchDataV1, UnreachableData, ValueHandle,
    VlaBoundData,
};

use super::Operator;
use crate::sink;

macro_rules! recoverable {
    ($(
        $name:ident, $abort:ident => $handler:ident($data:ty $(, $arg:ident: $arg_ty:ty)*) [$($extra:expr),*];
    )*) => {
        $(
            #[no_mangle]
            pub unsafe extern "C" fn $name(data: *const $data $(, $arg: $arg_ty)*) {
                super::$handler(false, data $(, $arg)* $(, $extra)*);
            }

            #[no_mangle]
            pub unsafe extern "C" fn $abort(data: *const $data $(, $arg: $arg_ty)*) -> ! {
                super::$handler(true, data $(, $arg)* $(, $extra)*);
                sink::terminate()
            }
        )*
    };
}

recoverable! {
    __ubsan_handle_add_overflow, __ubsan_handle_add_overflow_abort
        => overflow(OverflowData, lhs: ValueHandle, rhs: ValueHandle) [Operator::Add];
    __ubsan_handle_sub_overflow, __ubsan_handle_sub_overflow_abort
        => overflow(OverflowData, lhs: ValueHandle, rhs: ValueHandle) [Operator::Sub];
    __ubsan_handle_mul_overflow, __ubsan_handle_mul_overflow_abort
        => overflow(OverflowData, lhs: ValueHandle, rhs: ValueHandle) [Operator::Mul];
    __ubsan_handle_divrem_overflow, __ubsan_handle_divrem_overflow_abort
        => overflow(OverflowData, lhs: ValueHandle, rhs: ValueHandle) [Operator::DivRem];
    __ubsan_handle_negate_overflow, __ubsan_handle_negate_overflow_abort
        => negate(OverflowData, old: ValueHandle) [];
    __ubsan_handle_cfi_check_fail, __ubsan_handle_cfi_check_fail_abort
        => cfi_check_fail(CfiCheckFailData, value: ValueHandle, valid_vtable: ValueHandle) [];
    __ubsan_handle_dynamic_type_cache_miss, __ubsan_handle_dynamic_type_cache_miss_abort
        => dynamic_type_cache_miss(DynamicTypeCacheMissData, pointer: ValueHandle, hash: ValueHandle) [];
    __ubsan_handle_float_cast_overflow, __ubsan_handle_float_cast_overflow_abort
        => float_cast_overflow(FloatCastOverflowData, from: ValueHandle) [];
    __ubsan_handle_function_type_mismatch, __ubsan_handle_function_type_mismatch_abort
        => function_type_mismatch(FunctionTypeMismatchData, function: ValueHandle) [];
    __ubsan_handle_implicit_conversion, __ubsan_handle_implicit_conversion_abort
        => implicit_conversion(ImplicitConversionData, src: ValueHandle, dst: ValueHandle) [];
    __ubsan_handle_invalid_builtin, __ubsan_handle_invalid_builtin_abort
        => invalid_builtin(InvalidBuiltinData) [];
    __ubsan_handle_load_invalid_value, __ubsan_handle_load_invalid_value_abort
        => load_invalid_value(InvalidValueData, value: ValueHandle) [];
    __ubsan_handle_nonnull_arg, __ubsan_handle_nonnull_arg_abort
        => nonnull_arg(NonNullArgData) [false];
    __ubsan_handle_nullability_arg, __ubsan_handle_nullability_arg_abort
        => nonnull_arg(NonNullArgData) [true];
    __ubsan_handle_nonnull_return_v1, __ubsan_handle_nonnull_return_v1_abort
        => nonnull_return(NonNullReturnData, loc: *const SourceLocation) [false];
    __ubsan_handle_nullability_return_v1, __ubsan_handle_nullability_return_v1_abort
        => nonnull_return(NonNullReturnData, loc: *const SourceLocation) [true];
    __ubsan_handle_out_of_bounds, __ubsan_handle_out_of_bounds_abort
        => out_of_bounds(OutOfBoundsData, index: ValueHandle) [];
    __ubsan_handle_pointer_overflow, __ubsan_handle_pointer_overflow_abort
        => pointer_overflow(PointerOverflowData, base: ValueHandle, result: ValueHandle) [];
    __ubsan_handle_shift_out_of_bounds, __ubsan_handle_shift_out_of_bounds_abort
        => shift_out_of_bounds(ShiftOutOfBoundsData, lhs: ValueHandle, rhs: ValueHandle) [];
    __ubsan_handle_type_mismatch, __ubsan_handle_type_mismatch_abort
        => type_mismatch(TypeMismatchData, pointer: ValueHandle) [];
    __ubsan_handle_type_mismatch_v1, __ubsan_handle_type_mismatch_v1_abort
        => type_mismatch_v1(TypeMismatchDataV1, pointer: ValueHandle) [];
    __ubsan_handle_vla_bound_not_positive, __ubsan_handle_vla_bound_not_positive_abort
        => vla_bound_not_positive(VlaBoundData, bound: ValueHandle) [];
}

#[no_mangle]
pub unsafe extern "C" fn __ubsan_handle_builtin_unreachable(data: *const UnreachableData) -> ! {
    super::builtin_unreachable(data)
}

#[no_mangle]
pub unsafe extern "C" fn __ubsan_handle_missing_return(data: *const UnreachableData) -> ! {
    super::missing_return(data)
}

/// CFI slow path; whether it returns is decided by the caller.
#[no_mangle]
pub unsafe extern "C" fn __ubsan_handle_cfi_bad_type(
    data: *const CfiCheckFailData,
    vtable: ValueHandle,
    valid_vtable: bool,
    from_unrecoverable_handler: bool,
    program_counter: ValueHandle,
    frame_pointer: ValueHandle,
) {
    super::cfi_bad_type(
        data,
        vtable,
        valid_vtable,
        from_unrecoverable_handler,
        program_counter,
        frame_pointer,
    );
    if from_unrecoverable_handler {
        sink::terminate();
    }
}
