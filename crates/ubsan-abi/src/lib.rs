//! # ubsan-abi
//!
//! Binary layouts shared with `-fsanitize=undefined` instrumentation.
//!
//! Everything in this crate mirrors a structure the compiler places in the
//! data section of an instrumented object: source locations, type
//! descriptors and the per-check payload records handed to the
//! `__ubsan_handle_*` hooks. The runtime only ever borrows these for the
//! duration of one hook call.
//!
//! The const constructors exist so Rust code can lay down the same static
//! data the compiler would, which is how the trigger tool and the tests
//! drive the handlers.

#![no_std]

pub mod descriptor;
pub mod location;
pub mod payload;

pub use descriptor::{TypeDescriptor, TypeDescriptorStorage, TypeKind, TypeRef};
pub use location::{SourceLocation, REPORTED_BIT};
pub use payload::*;

/// A raw operand as passed by generated code: the value itself when it fits
/// in a machine word, otherwise a pointer to it.
pub type ValueHandle = usize;
