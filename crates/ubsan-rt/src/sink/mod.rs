//! Where reports go, and whether the process survives them.
//!
//! One backend is compiled in: `kernel` (console + panic) or `hosted`
//! (stdout / stderr / syslog + SIGABRT). Both see the same [`SinkPolicy`]
//! bitmask and the same NUL-terminated message.

use core::sync::atomic::{AtomicUsize, Ordering};

use ubsan_config::SinkPolicy;

use crate::macros::StackWriter;

#[cfg(all(feature = "std", not(feature = "kernel")))]
mod hosted;
#[cfg(all(feature = "std", not(feature = "kernel")))]
use hosted as backend;

#[cfg(feature = "kernel")]
mod kernel;
#[cfg(feature = "kernel")]
use kernel as backend;

#[cfg(all(feature = "std", not(feature = "kernel")))]
pub use hosted::policy_from_env_value;

/// Handlers that may still be producing a report.
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Held by a handler from before its location claim until it returns.
///
/// Never released by a handler that terminates, which keeps
/// [`terminate_after_reports`] waiting for the process to go down.
pub(crate) struct Reporting(());

impl Reporting {
    pub(crate) fn begin() -> Self {
        IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        Reporting(())
    }
}

impl Drop for Reporting {
    fn drop(&mut self) {
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Active policy; hosted builds read the environment on first use.
pub(crate) fn policy() -> SinkPolicy {
    backend::policy()
}

/// Write `message` to every enabled sink, then terminate if `fatal` or the
/// policy requests it.
pub fn emit(fatal: bool, message: &StackWriter<'_>) {
    let policy = policy();
    backend::deliver(policy, fatal, message);
    if fatal || policy.aborts() {
        backend::terminate();
    }
}

/// Emit and never return, whatever the policy says.
pub fn emit_fatal(message: &StackWriter<'_>) -> ! {
    emit(true, message);
    backend::terminate()
}

/// Terminate without writing anything.
pub fn terminate() -> ! {
    backend::terminate()
}

/// Terminate once no other handler holds a [`Reporting`] guard.
pub(crate) fn terminate_after_reports() -> ! {
    while reports_in_flight() != 0 {
        core::hint::spin_loop();
    }
    backend::terminate()
}

fn reports_in_flight() -> usize {
    IN_FLIGHT.load(Ordering::SeqCst)
}
