//! Handler behaviour through the exported symbols.
//!
//! Only continue variants are called here: anything fatal would take the
//! test binary down. Every case gets its own static payload since a claimed
//! location stays claimed for the life of the process.

use core::ptr;

use ubsan_abi::*;

use super::exports::*;
use crate::report::{last_report, reports_emitted};
use crate::test_support;

static INT: TypeDescriptorStorage<4> = TypeDescriptorStorage::integer(true, 32, *b"int\0");
static UINT: TypeDescriptorStorage<13> =
    TypeDescriptorStorage::integer(false, 32, *b"unsigned int\0");

const fn site(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new(c"prog.c", line, column)
}

/// Body of the most recent report, asserting it came from `line`.
fn last_message(line: u32) -> String {
    let last = last_report().expect("a report was recorded");
    assert_eq!(last.filename, "prog.c");
    assert_eq!(last.line, line);
    last.message
}

fn last_kind() -> String {
    last_report().expect("a report was recorded").kind
}

#[test]
fn test_add_overflow_message() {
    let _guard = test_support::lock();
    static DATA: OverflowData = OverflowData::new(site(10, 5), &INT);

    unsafe { __ubsan_handle_add_overflow(&DATA, i32::MAX as usize, 1) };

    let last = last_report().unwrap();
    assert_eq!(last.kind, "signed-integer-overflow");
    assert_eq!(
        last.message,
        "signed integer overflow: 2147483647 + 1 cannot be represented in type int"
    );
    assert_eq!((last.line, last.column), (10, 5));
    assert!(DATA.loc.is_reported());
    assert_eq!(DATA.loc.line(), 10);
}

#[test]
fn test_negate_overflow_message() {
    let _guard = test_support::lock();
    static DATA: OverflowData = OverflowData::new(site(20, 3), &INT);

    unsafe { __ubsan_handle_negate_overflow(&DATA, i32::MIN as u32 as usize) };

    assert_eq!(
        last_message(20),
        "negation of -2147483648 cannot be represented in type int"
    );
}

#[test]
fn test_unsigned_and_operator_symbols() {
    let _guard = test_support::lock();
    static ADD: OverflowData = OverflowData::new(site(30, 1), &UINT);
    static SUB: OverflowData = OverflowData::new(site(31, 1), &UINT);
    static MUL: OverflowData = OverflowData::new(site(32, 1), &INT);

    unsafe { __ubsan_handle_add_overflow(&ADD, u32::MAX as usize, 1) };
    assert_eq!(last_kind(), "unsigned-integer-overflow");
    assert_eq!(
        last_message(30),
        "unsigned integer overflow: 4294967295 + 1 cannot be represented in type unsigned int"
    );

    unsafe { __ubsan_handle_sub_overflow(&SUB, 0, 1) };
    assert_eq!(
        last_message(31),
        "unsigned integer overflow: 0 - 1 cannot be represented in type unsigned int"
    );

    unsafe { __ubsan_handle_mul_overflow(&MUL, 65536, 65536) };
    assert_eq!(
        last_message(32),
        "signed integer overflow: 65536 * 65536 cannot be represented in type int"
    );
}

#[test]
fn test_divrem_zero_and_overflow() {
    let _guard = test_support::lock();
    static BY_ZERO: OverflowData = OverflowData::new(site(40, 7), &INT);
    static MIN_BY_MINUS_ONE: OverflowData = OverflowData::new(site(41, 7), &INT);

    unsafe { __ubsan_handle_divrem_overflow(&BY_ZERO, 5, 0) };
    assert_eq!(last_kind(), "integer-divide-by-zero");
    assert_eq!(last_message(40), "division by zero");

    unsafe {
        __ubsan_handle_divrem_overflow(
            &MIN_BY_MINUS_ONE,
            i32::MIN as u32 as usize,
            -1i32 as u32 as usize,
        )
    };
    assert_eq!(
        last_message(41),
        "signed integer overflow: -2147483648 / -1 cannot be represented in type int"
    );
}

#[test]
fn test_second_hit_is_silent() {
    let _guard = test_support::lock();
    static DATA: OverflowData = OverflowData::new(site(50, 2), &INT);

    let before = reports_emitted();
    for _ in 0..5 {
        unsafe { __ubsan_handle_add_overflow(&DATA, i32::MAX as usize, 1) };
    }
    assert_eq!(reports_emitted(), before + 1);
}

#[test]
fn test_concurrent_hits_report_once() {
    let _guard = test_support::lock();
    static DATA: OverflowData = OverflowData::new(site(51, 2), &INT);

    let before = reports_emitted();
    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                for _ in 0..100 {
                    unsafe { __ubsan_handle_mul_overflow(&DATA, 65536, 65536) };
                }
            });
        }
    });
    assert_eq!(reports_emitted(), before + 1);
    assert_eq!(
        last_message(51),
        "signed integer overflow: 65536 * 65536 cannot be represented in type int"
    );
}

#[test]
fn test_long_file_name_keeps_whole_report() {
    let _guard = test_support::lock();
    let name: &'static std::ffi::CStr = Box::leak(
        std::ffi::CString::new("a".repeat(3000))
            .unwrap()
            .into_boxed_c_str(),
    );
    let data: &'static OverflowData =
        Box::leak(Box::new(OverflowData::new(SourceLocation::new(name, 1, 1), &INT)));

    unsafe { __ubsan_handle_sub_overflow(data, i32::MIN as u32 as usize, 1) };

    let last = last_report().unwrap();
    assert_eq!(last.filename.len(), 3000);
    assert_eq!(
        last.message,
        "signed integer overflow: -2147483648 - 1 cannot be represented in type int"
    );
}

#[cfg(feature = "full-diagnostics")]
mod full {
    use super::*;

    static UCHAR: TypeDescriptorStorage<14> =
        TypeDescriptorStorage::integer(false, 8, *b"unsigned char\0");
    static BOOL: TypeDescriptorStorage<5> = TypeDescriptorStorage::integer(false, 8, *b"bool\0");
    static FLOAT: TypeDescriptorStorage<6> = TypeDescriptorStorage::float(32, *b"float\0");
    static ARRAY: TypeDescriptorStorage<8> = TypeDescriptorStorage::unknown(*b"int[10]\0");
    static FN_TY: TypeDescriptorStorage<14> = TypeDescriptorStorage::unknown(*b"void (*)(int)\0");
    static CLASS: TypeDescriptorStorage<7> = TypeDescriptorStorage::unknown(*b"Widget\0");

    macro_rules! shift {
        ($line:expr) => {
            ShiftOutOfBoundsData {
                loc: site($line, 9),
                lhs_ty: INT.as_ptr(),
                rhs_ty: INT.as_ptr(),
            }
        };
    }

    #[test]
    fn test_shift_messages() {
        let _guard = test_support::lock();
        static NEGATIVE: ShiftOutOfBoundsData = shift!(60);
        static TOO_LARGE: ShiftOutOfBoundsData = shift!(61);
        static NEGATIVE_LHS: ShiftOutOfBoundsData = shift!(62);
        static UNREPRESENTABLE: ShiftOutOfBoundsData = shift!(63);

        unsafe { __ubsan_handle_shift_out_of_bounds(&NEGATIVE, 1, -1i32 as u32 as usize) };
        assert_eq!(last_kind(), "shift-out-of-bounds");
        assert_eq!(last_message(60), "shift exponent -1 is negative");

        unsafe { __ubsan_handle_shift_out_of_bounds(&TOO_LARGE, 1, 32) };
        assert_eq!(
            last_message(61),
            "shift exponent 32 is too large for 32-bit type int"
        );

        unsafe { __ubsan_handle_shift_out_of_bounds(&NEGATIVE_LHS, -1i32 as u32 as usize, 1) };
        assert_eq!(last_message(62), "left shift of negative value -1");

        unsafe { __ubsan_handle_shift_out_of_bounds(&UNREPRESENTABLE, 0x4000_0000, 2) };
        assert_eq!(
            last_message(63),
            "left shift of 1073741824 by 2 places cannot be represented in type int"
        );
    }

    #[test]
    fn test_pointer_overflow_messages() {
        let _guard = test_support::lock();
        static SITES: [PointerOverflowData; 6] = [
            PointerOverflowData { loc: site(70, 1) },
            PointerOverflowData { loc: site(71, 1) },
            PointerOverflowData { loc: site(72, 1) },
            PointerOverflowData { loc: site(73, 1) },
            PointerOverflowData { loc: site(74, 1) },
            PointerOverflowData { loc: site(75, 1) },
        ];
        let high = isize::MIN as usize;
        let low = isize::MAX as usize;
        let cases = [
            (0, 0, "applying zero offset to null pointer".to_string()),
            (0, 0x10, "applying non-zero offset 0x10 to null pointer".to_string()),
            (
                0x1000,
                0,
                "applying non-zero offset to non-null pointer 0x1000 produced null pointer"
                    .to_string(),
            ),
            (
                0x2000,
                0x1000,
                "addition of unsigned offset to 0x2000 overflowed to 0x1000".to_string(),
            ),
            (
                0x1000,
                0x2000,
                "subtraction of unsigned offset from 0x1000 overflowed to 0x2000".to_string(),
            ),
            (
                low,
                high,
                format!("pointer index expression with base {low:#x} overflowed to {high:#x}"),
            ),
        ];

        for (i, (base, result, expected)) in cases.iter().enumerate() {
            unsafe { __ubsan_handle_pointer_overflow(&SITES[i], *base, *result) };
            assert_eq!(last_kind(), "pointer-overflow");
            assert_eq!(&last_message(70 + i as u32), expected);
        }
    }

    #[test]
    fn test_type_mismatch_messages() {
        let _guard = test_support::lock();
        static NULL: TypeMismatchDataV1 = TypeMismatchDataV1 {
            loc: site(80, 4),
            ty: INT.as_ptr(),
            log_alignment: 2,
            type_check_kind: 0,
        };
        static MISALIGNED: TypeMismatchDataV1 = TypeMismatchDataV1 {
            loc: site(81, 4),
            ty: INT.as_ptr(),
            log_alignment: 2,
            type_check_kind: 1,
        };
        static TOO_SMALL: TypeMismatchData = TypeMismatchData {
            loc: site(82, 4),
            ty: INT.as_ptr(),
            alignment: 4,
            type_check_kind: 3,
        };

        unsafe { __ubsan_handle_type_mismatch_v1(&NULL, 0) };
        assert_eq!(last_kind(), "null-pointer-use");
        assert_eq!(last_message(80), "load of null pointer of type int");

        unsafe { __ubsan_handle_type_mismatch_v1(&MISALIGNED, 0x1001) };
        assert_eq!(last_kind(), "misaligned-pointer-use");
        assert_eq!(
            last_message(81),
            "store to misaligned address 0x1001 for type int which requires 4 byte alignment"
        );

        unsafe { __ubsan_handle_type_mismatch(&TOO_SMALL, 0x1000) };
        assert_eq!(last_kind(), "insufficient-object-size");
        assert_eq!(
            last_message(82),
            "member access within address 0x1000 with insufficient space for an object of type int"
        );
    }

    #[test]
    fn test_out_of_bounds_and_vla() {
        let _guard = test_support::lock();
        static OOB: OutOfBoundsData = OutOfBoundsData {
            loc: site(90, 12),
            array_ty: ARRAY.as_ptr(),
            index_ty: INT.as_ptr(),
        };
        static VLA: VlaBoundData = VlaBoundData {
            loc: site(91, 8),
            ty: INT.as_ptr(),
        };

        unsafe { __ubsan_handle_out_of_bounds(&OOB, 10) };
        assert_eq!(last_kind(), "out-of-bounds");
        assert_eq!(last_message(90), "index 10 is out of range for type int[10]");

        unsafe { __ubsan_handle_vla_bound_not_positive(&VLA, -5i32 as u32 as usize) };
        assert_eq!(last_kind(), "vla-bound-not-positive");
        assert_eq!(last_message(91), "variable length array bound value -5 <= 0");
    }

    #[test]
    fn test_value_checks() {
        let _guard = test_support::lock();
        static LOAD: InvalidValueData = InvalidValueData {
            loc: site(100, 3),
            ty: BOOL.as_ptr(),
        };
        static CAST: FloatCastOverflowData = FloatCastOverflowData {
            loc: site(101, 3),
            from_ty: FLOAT.as_ptr(),
            to_ty: INT.as_ptr(),
        };
        static CONVERT: ImplicitConversionData = ImplicitConversionData {
            loc: site(102, 3),
            from_ty: INT.as_ptr(),
            to_ty: UCHAR.as_ptr(),
            kind: 1,
        };
        static CLZ: InvalidBuiltinData = InvalidBuiltinData {
            loc: site(103, 3),
            kind: 1,
        };

        unsafe { __ubsan_handle_load_invalid_value(&LOAD, 2) };
        assert_eq!(last_kind(), "invalid-value-load");
        assert_eq!(
            last_message(100),
            "load of value 2 is not a valid value for type bool"
        );

        unsafe { __ubsan_handle_float_cast_overflow(&CAST, 1e10f32.to_bits() as usize) };
        assert_eq!(last_kind(), "float-cast-overflow");
        assert_eq!(
            last_message(101),
            "1e+10 (of type float) is outside the range of representable values of type int"
        );

        unsafe { __ubsan_handle_implicit_conversion(&CONVERT, -1i32 as u32 as usize, 255) };
        assert_eq!(last_kind(), "implicit-conversion");
        assert_eq!(
            last_message(102),
            "implicit conversion from type int of value -1 (32-bit, signed) to type unsigned char changed the value to 255 (8-bit, unsigned)"
        );

        unsafe { __ubsan_handle_invalid_builtin(&CLZ) };
        assert_eq!(last_kind(), "invalid-builtin-use");
        assert_eq!(
            last_message(103),
            "passing zero to clz(), which is not a valid argument"
        );
    }

    #[test]
    fn test_nonnull_messages() {
        let _guard = test_support::lock();
        static WITH_ATTR: NonNullArgData = NonNullArgData {
            loc: site(110, 6),
            attr_loc: site(3, 20),
            arg_index: 1,
        };
        static WITHOUT_ATTR: NonNullArgData = NonNullArgData {
            loc: site(111, 6),
            attr_loc: SourceLocation::unknown(),
            arg_index: 2,
        };
        static RETURN: NonNullReturnData = NonNullReturnData {
            attr_loc: site(4, 1),
        };
        static RETURN_SITE: SourceLocation = site(112, 6);

        unsafe { __ubsan_handle_nonnull_arg(&WITH_ATTR) };
        assert_eq!(last_kind(), "nonnull-arg");
        assert_eq!(
            last_message(110),
            "null pointer passed as argument 1, which is declared to never be null; nonnull attribute specified in prog.c:3:20"
        );

        unsafe { __ubsan_handle_nullability_arg(&WITHOUT_ATTR) };
        assert_eq!(last_kind(), "nullability-arg");
        assert_eq!(
            last_message(111),
            "null pointer passed as argument 2, which is declared to never be null"
        );

        unsafe { __ubsan_handle_nullability_return_v1(&RETURN, &RETURN_SITE) };
        assert_eq!(last_kind(), "nullability-return");
        assert_eq!(
            last_message(112),
            "null pointer returned from function declared to never return null; _Nonnull return type attribute specified in prog.c:4:1"
        );
    }

    #[test]
    fn test_return_without_site_is_ignored() {
        let _guard = test_support::lock();
        static RETURN: NonNullReturnData = NonNullReturnData {
            attr_loc: site(5, 1),
        };

        let before = reports_emitted();
        unsafe { __ubsan_handle_nonnull_return_v1(&RETURN, ptr::null()) };
        assert_eq!(reports_emitted(), before);
    }

    #[test]
    fn test_indirect_call_checks() {
        let _guard = test_support::lock();
        static ICALL: FunctionTypeMismatchData = FunctionTypeMismatchData {
            loc: site(120, 2),
            ty: FN_TY.as_ptr(),
        };
        static VCALL: CfiCheckFailData = CfiCheckFailData {
            check_kind: 0,
            loc: site(121, 2),
            ty: CLASS.as_ptr(),
        };
        static TARGET: CfiCheckFailData = CfiCheckFailData {
            check_kind: 4,
            loc: site(122, 2),
            ty: FN_TY.as_ptr(),
        };
        static BAD_TYPE: CfiCheckFailData = CfiCheckFailData {
            check_kind: 2,
            loc: site(123, 2),
            ty: CLASS.as_ptr(),
        };

        unsafe { __ubsan_handle_function_type_mismatch(&ICALL, 0xdead) };
        assert_eq!(last_kind(), "function-type-mismatch");
        assert_eq!(
            last_message(120),
            "call to function 0xdead through pointer to incorrect function type void (*)(int)"
        );

        unsafe { __ubsan_handle_cfi_check_fail(&VCALL, 0x4000, 0) };
        assert_eq!(last_kind(), "cfi-bad-type");
        assert_eq!(
            last_message(121),
            "control flow integrity check for type Widget failed during virtual call (vtable address 0x4000; invalid vtable)"
        );

        unsafe { __ubsan_handle_cfi_check_fail(&TARGET, 0x5000, 1) };
        assert_eq!(
            last_message(122),
            "control flow integrity check for type void (*)(int) failed during indirect function call (target address 0x5000)"
        );

        unsafe { __ubsan_handle_cfi_bad_type(&BAD_TYPE, 0x6000, true, false, 0x10, 0x20) };
        assert_eq!(
            last_message(123),
            "control flow integrity check for type Widget failed during base-to-derived cast (vtable address 0x6000; valid vtable; from recoverable handler; Program Counter 0x10; Frame Pointer 0x20)"
        );
    }

    #[test]
    fn test_dynamic_type_cache_miss() {
        let _guard = test_support::lock();
        static DATA: DynamicTypeCacheMissData = DynamicTypeCacheMissData {
            loc: site(130, 5),
            ty: CLASS.as_ptr(),
            type_info: ptr::null(),
            type_check_kind: 4,
        };

        unsafe { __ubsan_handle_dynamic_type_cache_miss(&DATA, 0x7000, 0xabcd) };
        assert_eq!(last_kind(), "dynamic-type-mismatch");
        assert_eq!(
            last_message(130),
            "member call on address 0x7000 which might not point to an object of type Widget"
        );
    }
}

#[cfg(not(feature = "full-diagnostics"))]
#[test]
fn test_minimal_build_ignores_other_categories() {
    let _guard = test_support::lock();
    static OOB: OutOfBoundsData = OutOfBoundsData {
        loc: site(140, 1),
        array_ty: INT.as_ptr(),
        index_ty: INT.as_ptr(),
    };

    let before = reports_emitted();
    unsafe { __ubsan_handle_out_of_bounds(&OOB, 10) };
    assert_eq!(reports_emitted(), before);
    assert!(!OOB.loc.is_reported());
}
