//! Category handlers.
//!
//! Each function here implements one check category for both exported
//! entry points; `fatal` is true for the `_abort` variant. Payload pointers
//! come straight from generated code and are only borrowed for the call.
//!
//! Every handler follows the same sequence: claim the location, decode the
//! operands, format, emit. An undecodable operand is an internal error and
//! always terminates.

pub mod exports;

use core::fmt;

use ubsan_abi::{
    builtin_check_kind_name, cfi_check_kind_name, type_check_kind_name, CfiCheckFailData,
    DynamicTypeCacheMissData, FloatCastOverflowData, FunctionTypeMismatchData,
    ImplicitConversionData, InvalidBuiltinData, InvalidValueData, NonNullArgData,
    NonNullReturnData, OutOfBoundsData, OverflowData, PointerOverflowData, ShiftOutOfBoundsData,
    SourceLocation, TypeDescriptor, TypeMismatchData, TypeMismatchDataV1, TypeRef,
    UnreachableData, ValueHandle, VlaBoundData,
};

use crate::macros::{CStrDisplay, LocationDisplay, StackWriter};
use crate::report::{self, ReportKind};
use crate::sink;
use crate::value::{self, DecodeError, Scalar};
use crate::MESSAGE_MAX;

/// Only the overflow family reports in minimal builds.
const FULL_DIAGNOSTICS: bool = cfg!(feature = "full-diagnostics");

/// CFI check kind of an indirect function call.
const CFI_ICALL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    DivRem,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::DivRem => '/',
        }
    }
}

/// `Some` if this call should go on to report; keep the guard until the
/// report has been emitted.
///
/// Losers of the claim return quietly, except abort variants: generated code
/// treats those calls as non-returning, so they terminate instead, but only
/// after the winner's report has reached the sinks.
fn first_report(fatal: bool, loc: &SourceLocation) -> Option<sink::Reporting> {
    let reporting = sink::Reporting::begin();
    if loc.claim() {
        drop(reporting);
        if fatal {
            sink::terminate_after_reports();
        }
        return None;
    }
    Some(reporting)
}

/// `true` if the category is compiled out; abort variants still terminate.
fn inert(fatal: bool) -> bool {
    if FULL_DIAGNOSTICS {
        return false;
    }
    if fatal {
        sink::terminate();
    }
    true
}

fn internal_error(loc: &SourceLocation, err: DecodeError) -> ! {
    use core::fmt::Write;

    let mut buf = [0u8; MESSAGE_MAX];
    let mut writer = StackWriter::new(&mut buf);
    let _ = write!(writer, "UBSan: {} in {}", err, LocationDisplay(loc));
    report::record(ReportKind::InternalError, loc, writer.as_str());
    writer.end_line();
    sink::emit_fatal(&writer)
}

unsafe fn type_ref<'a>(loc: &SourceLocation, ty: *const TypeDescriptor) -> TypeRef<'a> {
    match TypeRef::from_ptr(ty) {
        Some(ty) => ty,
        None => internal_error(loc, DecodeError::MissingDescriptor),
    }
}

unsafe fn operand(loc: &SourceLocation, ty: TypeRef<'_>, handle: ValueHandle) -> Scalar {
    match value::decode(ty, handle) {
        Ok(v) => v,
        Err(err) => internal_error(loc, err),
    }
}

fn name<'a>(ty: &TypeRef<'a>) -> CStrDisplay<'a> {
    CStrDisplay(ty.name())
}

fn signedness(ty: &TypeRef<'_>) -> &'static str {
    if ty.is_signed() {
        "signed"
    } else {
        "unsigned"
    }
}

fn overflow_kind(ty: &TypeRef<'_>) -> ReportKind {
    if ty.is_signed() {
        ReportKind::SignedIntegerOverflow
    } else {
        ReportKind::UnsignedIntegerOverflow
    }
}

/// `; <attribute> attribute specified in <loc>` when the attribute site is
/// known, nothing otherwise.
struct AttributeSite<'a> {
    loc: &'a SourceLocation,
    attribute: &'static str,
}

impl fmt::Display for AttributeSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.loc.filename.is_null() {
            return Ok(());
        }
        write!(
            f,
            "; {} attribute specified in {}",
            self.attribute,
            LocationDisplay(self.loc)
        )
    }
}

pub(crate) unsafe fn overflow(
    fatal: bool,
    data: *const OverflowData,
    lhs: ValueHandle,
    rhs: ValueHandle,
    op: Operator,
) {
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    let lhs = operand(&data.loc, ty, lhs);
    let rhs = operand(&data.loc, ty, rhs);

    if op == Operator::DivRem && rhs.is_zero() {
        ubsan_report!(fatal, ReportKind::IntegerDivideByZero, &data.loc, "division by zero");
        return;
    }
    ubsan_report!(
        fatal,
        overflow_kind(&ty),
        &data.loc,
        "{} integer overflow: {} {} {} cannot be represented in type {}",
        signedness(&ty),
        lhs,
        op.symbol(),
        rhs,
        name(&ty)
    );
}

pub(crate) unsafe fn negate(fatal: bool, data: *const OverflowData, old: ValueHandle) {
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    let old = operand(&data.loc, ty, old);
    ubsan_report!(
        fatal,
        overflow_kind(&ty),
        &data.loc,
        "negation of {} cannot be represented in type {}",
        old,
        name(&ty)
    );
}

/// `__builtin_unreachable()` reached. Generated code traps right after
/// this call, so it terminates even in minimal builds.
pub(crate) unsafe fn builtin_unreachable(data: *const UnreachableData) -> ! {
    let data = &*data;
    if let Some(_reporting) = first_report(true, &data.loc) {
        ubsan_report!(
            true,
            ReportKind::UnreachableCall,
            &data.loc,
            "calling __builtin_unreachable()"
        );
    }
    sink::terminate()
}

pub(crate) unsafe fn missing_return(data: *const UnreachableData) -> ! {
    let data = &*data;
    if let Some(_reporting) = first_report(true, &data.loc) {
        ubsan_report!(
            true,
            ReportKind::MissingReturn,
            &data.loc,
            "execution reached the end of a value-returning function without returning a value"
        );
    }
    sink::terminate()
}

pub(crate) unsafe fn cfi_check_fail(
    fatal: bool,
    data: *const CfiCheckFailData,
    value: ValueHandle,
    valid_vtable: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    if data.check_kind == CFI_ICALL {
        ubsan_report!(
            fatal,
            ReportKind::CfiBadType,
            &data.loc,
            "control flow integrity check for type {} failed during {} (target address {:#x})",
            name(&ty),
            cfi_check_kind_name(data.check_kind),
            value
        );
    } else {
        ubsan_report!(
            fatal,
            ReportKind::CfiBadType,
            &data.loc,
            "control flow integrity check for type {} failed during {} (vtable address {:#x}{})",
            name(&ty),
            cfi_check_kind_name(data.check_kind),
            value,
            if valid_vtable == 0 { "; invalid vtable" } else { "" }
        );
    }
}

pub(crate) unsafe fn cfi_bad_type(
    data: *const CfiCheckFailData,
    vtable: ValueHandle,
    valid_vtable: bool,
    from_unrecoverable_handler: bool,
    program_counter: ValueHandle,
    frame_pointer: ValueHandle,
) {
    let fatal = from_unrecoverable_handler;
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    ubsan_report!(
        fatal,
        ReportKind::CfiBadType,
        &data.loc,
        "control flow integrity check for type {} failed during {} (vtable address {:#x}; {} vtable; from {} handler; Program Counter {:#x}; Frame Pointer {:#x})",
        name(&ty),
        cfi_check_kind_name(data.check_kind),
        vtable,
        if valid_vtable { "valid" } else { "invalid" },
        if from_unrecoverable_handler { "unrecoverable" } else { "recoverable" },
        program_counter,
        frame_pointer
    );
}

/// The instrumentation only calls this after its own type-hash cache missed;
/// without C++ RTTI to consult, every miss is reported as a possible
/// dynamic type mismatch.
pub(crate) unsafe fn dynamic_type_cache_miss(
    fatal: bool,
    data: *const DynamicTypeCacheMissData,
    pointer: ValueHandle,
    _hash: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    ubsan_report!(
        fatal,
        ReportKind::DynamicTypeMismatch,
        &data.loc,
        "{} address {:#x} which might not point to an object of type {}",
        type_check_kind_name(data.type_check_kind),
        pointer,
        name(&ty)
    );
}

pub(crate) unsafe fn float_cast_overflow(
    fatal: bool,
    data: *const FloatCastOverflowData,
    from: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let from_ty = type_ref(&data.loc, data.from_ty);
    let to_ty = type_ref(&data.loc, data.to_ty);
    let value = operand(&data.loc, from_ty, from);
    ubsan_report!(
        fatal,
        ReportKind::FloatCastOverflow,
        &data.loc,
        "{} (of type {}) is outside the range of representable values of type {}",
        value,
        name(&from_ty),
        name(&to_ty)
    );
}

pub(crate) unsafe fn function_type_mismatch(
    fatal: bool,
    data: *const FunctionTypeMismatchData,
    function: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    ubsan_report!(
        fatal,
        ReportKind::FunctionTypeMismatch,
        &data.loc,
        "call to function {:#x} through pointer to incorrect function type {}",
        function,
        name(&ty)
    );
}

pub(crate) unsafe fn implicit_conversion(
    fatal: bool,
    data: *const ImplicitConversionData,
    src: ValueHandle,
    dst: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let from_ty = type_ref(&data.loc, data.from_ty);
    let to_ty = type_ref(&data.loc, data.to_ty);
    let src = operand(&data.loc, from_ty, src);
    let dst = operand(&data.loc, to_ty, dst);
    ubsan_report!(
        fatal,
        ReportKind::ImplicitConversion,
        &data.loc,
        "implicit conversion from type {} of value {} ({}-bit, {}) to type {} changed the value to {} ({}-bit, {})",
        name(&from_ty),
        src,
        from_ty.integer_width().unwrap_or(0),
        signedness(&from_ty),
        name(&to_ty),
        dst,
        to_ty.integer_width().unwrap_or(0),
        signedness(&to_ty)
    );
}

pub(crate) unsafe fn invalid_builtin(fatal: bool, data: *const InvalidBuiltinData) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    ubsan_report!(
        fatal,
        ReportKind::InvalidBuiltinUse,
        &data.loc,
        "passing zero to {}, which is not a valid argument",
        builtin_check_kind_name(data.kind)
    );
}

pub(crate) unsafe fn load_invalid_value(
    fatal: bool,
    data: *const InvalidValueData,
    value: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    let value = operand(&data.loc, ty, value);
    ubsan_report!(
        fatal,
        ReportKind::InvalidValueLoad,
        &data.loc,
        "load of value {} is not a valid value for type {}",
        value,
        name(&ty)
    );
}

pub(crate) unsafe fn nonnull_arg(fatal: bool, data: *const NonNullArgData, nullability: bool) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let (kind, attribute) = if nullability {
        (ReportKind::NullabilityArg, "_Nonnull")
    } else {
        (ReportKind::NonnullArg, "nonnull")
    };
    ubsan_report!(
        fatal,
        kind,
        &data.loc,
        "null pointer passed as argument {}, which is declared to never be null{}",
        data.arg_index,
        AttributeSite {
            loc: &data.attr_loc,
            attribute
        }
    );
}

pub(crate) unsafe fn nonnull_return(
    fatal: bool,
    data: *const NonNullReturnData,
    loc: *const SourceLocation,
    nullability: bool,
) {
    if inert(fatal) {
        return;
    }
    // No check site: nothing to attribute the report to.
    let Some(loc) = loc.as_ref() else {
        if fatal {
            sink::terminate();
        }
        return;
    };
    let data = &*data;
    let Some(_reporting) = first_report(fatal, loc) else {
        return;
    };
    let (kind, attribute) = if nullability {
        (ReportKind::NullabilityReturn, "_Nonnull return type")
    } else {
        (ReportKind::NonnullReturn, "returns_nonnull")
    };
    ubsan_report!(
        fatal,
        kind,
        loc,
        "null pointer returned from function declared to never return null{}",
        AttributeSite {
            loc: &data.attr_loc,
            attribute
        }
    );
}

pub(crate) unsafe fn out_of_bounds(fatal: bool, data: *const OutOfBoundsData, index: ValueHandle) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let array_ty = type_ref(&data.loc, data.array_ty);
    let index_ty = type_ref(&data.loc, data.index_ty);
    let index = operand(&data.loc, index_ty, index);
    ubsan_report!(
        fatal,
        ReportKind::OutOfBounds,
        &data.loc,
        "index {} is out of range for type {}",
        index,
        name(&array_ty)
    );
}

pub(crate) unsafe fn pointer_overflow(
    fatal: bool,
    data: *const PointerOverflowData,
    base: ValueHandle,
    result: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let kind = ReportKind::PointerOverflow;
    match (base, result) {
        (0, 0) => ubsan_report!(fatal, kind, &data.loc, "applying zero offset to null pointer"),
        (0, result) => ubsan_report!(
            fatal,
            kind,
            &data.loc,
            "applying non-zero offset {:#x} to null pointer",
            result
        ),
        (base, 0) => ubsan_report!(
            fatal,
            kind,
            &data.loc,
            "applying non-zero offset to non-null pointer {:#x} produced null pointer",
            base
        ),
        (base, result) if (base as isize >= 0) == (result as isize >= 0) => {
            if base > result {
                ubsan_report!(
                    fatal,
                    kind,
                    &data.loc,
                    "addition of unsigned offset to {:#x} overflowed to {:#x}",
                    base,
                    result
                );
            } else {
                ubsan_report!(
                    fatal,
                    kind,
                    &data.loc,
                    "subtraction of unsigned offset from {:#x} overflowed to {:#x}",
                    base,
                    result
                );
            }
        }
        (base, result) => ubsan_report!(
            fatal,
            kind,
            &data.loc,
            "pointer index expression with base {:#x} overflowed to {:#x}",
            base,
            result
        ),
    }
}

pub(crate) unsafe fn shift_out_of_bounds(
    fatal: bool,
    data: *const ShiftOutOfBoundsData,
    lhs: ValueHandle,
    rhs: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let lhs_ty = type_ref(&data.loc, data.lhs_ty);
    let rhs_ty = type_ref(&data.loc, data.rhs_ty);
    let lhs = operand(&data.loc, lhs_ty, lhs);
    let rhs = operand(&data.loc, rhs_ty, rhs);
    let width = lhs_ty.integer_width().unwrap_or(0);
    let kind = ReportKind::ShiftOutOfBounds;

    if rhs.is_negative() {
        ubsan_report!(fatal, kind, &data.loc, "shift exponent {} is negative", rhs);
    } else if rhs.as_unsigned().map_or(true, |r| r >= u128::from(width)) {
        ubsan_report!(
            fatal,
            kind,
            &data.loc,
            "shift exponent {} is too large for {}-bit type {}",
            rhs,
            width,
            name(&lhs_ty)
        );
    } else if lhs.is_negative() {
        ubsan_report!(fatal, kind, &data.loc, "left shift of negative value {}", lhs);
    } else {
        ubsan_report!(
            fatal,
            kind,
            &data.loc,
            "left shift of {} by {} places cannot be represented in type {}",
            lhs,
            rhs,
            name(&lhs_ty)
        );
    }
}

unsafe fn type_mismatch_common(
    fatal: bool,
    loc: &SourceLocation,
    ty: *const TypeDescriptor,
    alignment: usize,
    type_check_kind: u8,
    pointer: ValueHandle,
) {
    let Some(_reporting) = first_report(fatal, loc) else {
        return;
    };
    let ty = type_ref(loc, ty);
    let action = type_check_kind_name(type_check_kind);

    if pointer == 0 {
        ubsan_report!(
            fatal,
            ReportKind::NullPointerUse,
            loc,
            "{} null pointer of type {}",
            action,
            name(&ty)
        );
    } else if alignment != 0 && pointer & (alignment - 1) != 0 {
        ubsan_report!(
            fatal,
            ReportKind::MisalignedPointerUse,
            loc,
            "{} misaligned address {:#x} for type {} which requires {} byte alignment",
            action,
            pointer,
            name(&ty),
            alignment
        );
    } else {
        ubsan_report!(
            fatal,
            ReportKind::InsufficientObjectSize,
            loc,
            "{} address {:#x} with insufficient space for an object of type {}",
            action,
            pointer,
            name(&ty)
        );
    }
}

pub(crate) unsafe fn type_mismatch(
    fatal: bool,
    data: *const TypeMismatchData,
    pointer: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    type_mismatch_common(
        fatal,
        &data.loc,
        data.ty,
        data.alignment,
        data.type_check_kind,
        pointer,
    );
}

pub(crate) unsafe fn type_mismatch_v1(
    fatal: bool,
    data: *const TypeMismatchDataV1,
    pointer: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let alignment = 1usize
        .checked_shl(u32::from(data.log_alignment))
        .unwrap_or(0);
    type_mismatch_common(
        fatal,
        &data.loc,
        data.ty,
        alignment,
        data.type_check_kind,
        pointer,
    );
}

pub(crate) unsafe fn vla_bound_not_positive(
    fatal: bool,
    data: *const VlaBoundData,
    bound: ValueHandle,
) {
    if inert(fatal) {
        return;
    }
    let data = &*data;
    let Some(_reporting) = first_report(fatal, &data.loc) else {
        return;
    };
    let ty = type_ref(&data.loc, data.ty);
    let bound = operand(&data.loc, ty, bound);
    ubsan_report!(
        fatal,
        ReportKind::VlaBoundNotPositive,
        &data.loc,
        "variable length array bound value {} <= 0",
        bound
    );
}

#[cfg(all(test, feature = "std"))]
mod tests;
