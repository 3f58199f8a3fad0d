//! Last-report bookkeeping behind `__ubsan_get_current_report_data`.
//!
//! A single static slot holds the most recent report. Writers take it with a
//! try-lock and skip recording if another report is mid-write; nothing on
//! the report path ever waits.

use core::cell::UnsafeCell;
use core::ffi::{c_char, CStr};
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};

use ubsan_abi::SourceLocation;

use crate::MESSAGE_MAX;

/// Check category of a report, as exposed through the accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    SignedIntegerOverflow,
    UnsignedIntegerOverflow,
    IntegerDivideByZero,
    UnreachableCall,
    MissingReturn,
    CfiBadType,
    DynamicTypeMismatch,
    FloatCastOverflow,
    FunctionTypeMismatch,
    ImplicitConversion,
    InvalidBuiltinUse,
    InvalidValueLoad,
    NonnullArg,
    NullabilityArg,
    NonnullReturn,
    NullabilityReturn,
    OutOfBounds,
    PointerOverflow,
    ShiftOutOfBounds,
    NullPointerUse,
    MisalignedPointerUse,
    InsufficientObjectSize,
    VlaBoundNotPositive,
    /// The instrumentation handed us something undecodable.
    InternalError,
}

impl ReportKind {
    pub const fn as_c_str(self) -> &'static CStr {
        match self {
            Self::SignedIntegerOverflow => c"signed-integer-overflow",
            Self::UnsignedIntegerOverflow => c"unsigned-integer-overflow",
            Self::IntegerDivideByZero => c"integer-divide-by-zero",
            Self::UnreachableCall => c"unreachable-call",
            Self::MissingReturn => c"missing-return",
            Self::CfiBadType => c"cfi-bad-type",
            Self::DynamicTypeMismatch => c"dynamic-type-mismatch",
            Self::FloatCastOverflow => c"float-cast-overflow",
            Self::FunctionTypeMismatch => c"function-type-mismatch",
            Self::ImplicitConversion => c"implicit-conversion",
            Self::InvalidBuiltinUse => c"invalid-builtin-use",
            Self::InvalidValueLoad => c"invalid-value-load",
            Self::NonnullArg => c"nonnull-arg",
            Self::NullabilityArg => c"nullability-arg",
            Self::NonnullReturn => c"nonnull-return",
            Self::NullabilityReturn => c"nullability-return",
            Self::OutOfBounds => c"out-of-bounds",
            Self::PointerOverflow => c"pointer-overflow",
            Self::ShiftOutOfBounds => c"shift-out-of-bounds",
            Self::NullPointerUse => c"null-pointer-use",
            Self::MisalignedPointerUse => c"misaligned-pointer-use",
            Self::InsufficientObjectSize => c"insufficient-object-size",
            Self::VlaBoundNotPositive => c"vla-bound-not-positive",
            Self::InternalError => c"internal-error",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.as_c_str().to_str().unwrap_or("")
    }
}

struct ReportSlot {
    busy: AtomicBool,
    kind: AtomicPtr<c_char>,
    filename: AtomicPtr<c_char>,
    line: AtomicU32,
    column: AtomicU32,
    message: UnsafeCell<[u8; MESSAGE_MAX]>,
}

// Safety: `message` is only written while `busy` is held.
unsafe impl Sync for ReportSlot {}

static LAST_REPORT: ReportSlot = ReportSlot {
    busy: AtomicBool::new(false),
    kind: AtomicPtr::new(ptr::null_mut()),
    filename: AtomicPtr::new(ptr::null_mut()),
    line: AtomicU32::new(0),
    column: AtomicU32::new(0),
    message: UnsafeCell::new([0; MESSAGE_MAX]),
};

static REPORTS_EMITTED: AtomicUsize = AtomicUsize::new(0);

/// Number of reports produced since startup.
pub fn reports_emitted() -> usize {
    REPORTS_EMITTED.load(Ordering::Relaxed)
}

/// Store `message` (the text after the location prefix) as the last report.
pub fn record(kind: ReportKind, loc: &SourceLocation, message: &str) {
    REPORTS_EMITTED.fetch_add(1, Ordering::Relaxed);

    if LAST_REPORT
        .busy
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    unsafe {
        let buf = &mut *LAST_REPORT.message.get();
        let len = message.len().min(MESSAGE_MAX - 1);
        buf[..len].copy_from_slice(&message.as_bytes()[..len]);
        buf[len] = 0;
    }
    LAST_REPORT
        .filename
        .store(loc.filename as *mut c_char, Ordering::Relaxed);
    LAST_REPORT.line.store(loc.line(), Ordering::Relaxed);
    LAST_REPORT.column.store(loc.column, Ordering::Relaxed);
    LAST_REPORT
        .kind
        .store(kind.as_c_str().as_ptr() as *mut c_char, Ordering::Release);

    LAST_REPORT.busy.store(false, Ordering::Release);
}

/// Most recent report: kind, message, file, line and column.
///
/// Every out-pointer may be null. `memory_addr` is always set to null; this
/// runtime does not track faulting addresses. The strings stay valid until
/// the next report overwrites the slot; a reader racing a writer may see a
/// mix of both.
#[no_mangle]
pub unsafe extern "C" fn __ubsan_get_current_report_data(
    out_kind: *mut *const c_char,
    out_message: *mut *const c_char,
    out_filename: *mut *const c_char,
    out_line: *mut u32,
    out_column: *mut u32,
    out_memory_addr: *mut *mut c_char,
) {
    let kind = LAST_REPORT.kind.load(Ordering::Acquire);
    if !out_kind.is_null() {
        *out_kind = if kind.is_null() { c"".as_ptr() } else { kind };
    }
    if !out_message.is_null() {
        *out_message = LAST_REPORT.message.get() as *const c_char;
    }
    if !out_filename.is_null() {
        let filename = LAST_REPORT.filename.load(Ordering::Relaxed);
        *out_filename = if filename.is_null() {
            c"<unknown>".as_ptr()
        } else {
            filename
        };
    }
    if !out_line.is_null() {
        *out_line = LAST_REPORT.line.load(Ordering::Relaxed);
    }
    if !out_column.is_null() {
        *out_column = LAST_REPORT.column.load(Ordering::Relaxed);
    }
    if !out_memory_addr.is_null() {
        *out_memory_addr = ptr::null_mut();
    }
}

/// Safe snapshot of the last report, for Rust callers.
#[cfg(feature = "std")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastReport {
    pub kind: std::string::String,
    pub message: std::string::String,
    pub filename: std::string::String,
    pub line: u32,
    pub column: u32,
}

/// Copy of the last report, taken under the slot lock.
///
/// `None` when nothing has been recorded yet or a report is being written
/// right now.
#[cfg(feature = "std")]
pub fn last_report() -> Option<LastReport> {
    if LAST_REPORT
        .busy
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        return None;
    }

    let kind = LAST_REPORT.kind.load(Ordering::Acquire);
    let snapshot = if kind.is_null() {
        None
    } else {
        let filename = LAST_REPORT.filename.load(Ordering::Relaxed);
        // Safety: `busy` is held, so no writer touches `message` until we
        // release it. `kind` and `filename` point at static C strings.
        unsafe {
            let message = &*LAST_REPORT.message.get();
            Some(LastReport {
                kind: CStr::from_ptr(kind).to_string_lossy().into_owned(),
                message: CStr::from_bytes_until_nul(message)
                    .map(|m| m.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                filename: if filename.is_null() {
                    "<unknown>".into()
                } else {
                    CStr::from_ptr(filename).to_string_lossy().into_owned()
                },
                line: LAST_REPORT.line.load(Ordering::Relaxed),
                column: LAST_REPORT.column.load(Ordering::Relaxed),
            })
        }
    };

    LAST_REPORT.busy.store(false, Ordering::Release);
    snapshot
}
