//! # ubsan-config
//!
//! Report policy for the UBSan runtime.
//!
//! Policy comes from one of two places:
//! 1. `LIBC_UBSAN` in the environment (hosted builds), parsed once on the
//!    first report
//! 2. [`KERNEL_POLICY`], fixed at compile time (kernel builds)
//!
//! The decoded policy is a small bitmask so the crash path can read it with
//! a single atomic load and no allocation.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
pub mod logging;
pub mod policy;

pub use policy::{PolicyCell, SinkPolicy, ENV_VAR, KERNEL_POLICY};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown LIBC_UBSAN flag {flag:?} at position {position}")]
    UnknownFlag { flag: char, position: usize },
}

/// Printable form of [`ENV_VAR`].
pub const ENV_VAR_NAME: &str = "LIBC_UBSAN";
