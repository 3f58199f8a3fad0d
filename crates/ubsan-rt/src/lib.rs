//! # ubsan-rt
//!
//! Report runtime for code built with `-fsanitize=undefined`.
//! Zero-allocation, lock-free, and usable before the host runtime is up.
//!
//! The compiler turns each failed check into a call to one of the
//! `__ubsan_handle_*` symbols exported from [`handlers`]. A handler claims
//! the check's source location (each site reports once), decodes the
//! operands through [`value`], formats the diagnostic on the stack and hands
//! it to [`sink`], which writes it out and terminates if asked to.
//!
//! Two sinks exist:
//! - `std` (default): user space. Policy comes from `LIBC_UBSAN`; output to
//!   stdout / stderr / syslog; termination by `SIGABRT`.
//! - `kernel`: freestanding. The embedding kernel provides `printf` and
//!   `panic`; policy is fixed at compile time.
//!
//! `kernel` wins when both are enabled.

#![cfg_attr(not(feature = "std"), no_std)]
// Allow unsafe FFI functions without safety docs - these are inherently unsafe C ABI
#![allow(clippy::missing_safety_doc)]

#[cfg(not(any(feature = "std", feature = "kernel")))]
compile_error!("ubsan-rt needs either the `std` or the `kernel` feature");

// Macros must be defined before modules that use them
#[macro_use]
pub mod macros;

pub mod handlers;
pub mod report;
pub mod sink;
pub mod value;

pub use report::{reports_emitted, ReportKind};
pub use value::{decode, DecodeError, Scalar};

/// Longest file name a location is expected to carry.
#[cfg(feature = "std")]
pub const PATH_MAX: usize = libc::PATH_MAX as usize;
#[cfg(not(feature = "std"))]
pub const PATH_MAX: usize = 1024;

/// Scratch space for one formatted report, NUL included.
pub const MESSAGE_MAX: usize = PATH_MAX + 1024;

// Freestanding staticlib: the kernel panics on our behalf.
#[cfg(all(not(feature = "std"), not(test)))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo<'_>) -> ! {
    sink::terminate()
}
