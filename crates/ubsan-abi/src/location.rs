use core::ffi::{c_char, CStr};
use core::sync::atomic::{AtomicU32, Ordering};

/// Top bit of [`SourceLocation::line`], set once the site has been reported.
pub const REPORTED_BIT: u32 = 1 << 31;

/// `file:line:column` of an instrumented check.
///
/// Layout matches the compiler's `{ const char *, u32, u32 }`. The line is
/// held as an [`AtomicU32`] because the runtime flips [`REPORTED_BIT`] in
/// place; nothing else about the record is ever written.
#[repr(C)]
#[derive(Debug)]
pub struct SourceLocation {
    pub filename: *const c_char,
    line: AtomicU32,
    pub column: u32,
}

// Filename points at an immutable, interned string in the object's rodata.
unsafe impl Sync for SourceLocation {}
unsafe impl Send for SourceLocation {}

impl SourceLocation {
    pub const fn new(filename: &'static CStr, line: u32, column: u32) -> Self {
        Self {
            filename: filename.as_ptr(),
            line: AtomicU32::new(line),
            column,
        }
    }

    /// Location with no file attached, as emitted for absent attribute sites.
    pub const fn unknown() -> Self {
        Self {
            filename: core::ptr::null(),
            line: AtomicU32::new(0),
            column: 0,
        }
    }

    /// Mark this site as reported.
    ///
    /// Returns `true` if some earlier caller (on any thread) already claimed
    /// it; exactly one caller ever sees `false`.
    #[inline]
    pub fn claim(&self) -> bool {
        let previous = match self.line.fetch_update(Ordering::AcqRel, Ordering::Acquire, |line| {
            Some(line | REPORTED_BIT)
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        previous & REPORTED_BIT != 0
    }

    #[inline]
    pub fn is_reported(&self) -> bool {
        self.line.load(Ordering::Acquire) & REPORTED_BIT != 0
    }

    /// Source line with the reported flag masked off.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line.load(Ordering::Relaxed) & !REPORTED_BIT
    }

    /// Source file, if the compiler recorded one.
    ///
    /// # Safety
    /// `filename` must be null or point at a NUL-terminated string that
    /// outlives the returned borrow.
    #[inline]
    pub unsafe fn filename(&self) -> Option<&CStr> {
        if self.filename.is_null() {
            None
        } else {
            Some(CStr::from_ptr(self.filename))
        }
    }
}
