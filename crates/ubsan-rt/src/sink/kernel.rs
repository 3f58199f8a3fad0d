use core::ffi::{c_char, c_int};

use ubsan_config::{SinkPolicy, KERNEL_POLICY};

use crate::macros::StackWriter;

// Provided by the kernel this runtime is linked into.
extern "C" {
    fn printf(fmt: *const c_char, ...) -> c_int;
    #[link_name = "panic"]
    fn kernel_panic(fmt: *const c_char, ...) -> !;
}

pub(super) fn policy() -> SinkPolicy {
    KERNEL_POLICY
}

pub(super) fn deliver(policy: SinkPolicy, fatal: bool, message: &StackWriter<'_>) {
    let text = message.as_c_str().as_ptr();
    if fatal || policy.aborts() {
        unsafe { kernel_panic(c"%s".as_ptr(), text) }
    }
    if policy.contains(SinkPolicy::STDOUT) {
        unsafe {
            printf(c"%s".as_ptr(), text);
        }
    }
}

pub(super) fn terminate() -> ! {
    unsafe { kernel_panic(c"UBSan: unrecoverable report\n".as_ptr()) }
}
