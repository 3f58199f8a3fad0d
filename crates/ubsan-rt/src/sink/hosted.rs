use std::ffi::CStr;

use nix::errno::Errno;
use nix::sys::signal::{
    pthread_sigmask, raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use ubsan_config::{log_rt_debug, PolicyCell, SinkPolicy, ENV_VAR};

use crate::macros::StackWriter;

static POLICY: PolicyCell = PolicyCell::new();

/// Exit status used if SIGABRT somehow fails to kill us.
const FALLBACK_EXIT: libc::c_int = 127;

pub(super) fn policy() -> SinkPolicy {
    POLICY.get_or_init(|| {
        // getenv does not allocate; safe to call before the host runtime is up.
        let raw = unsafe { libc::getenv(ENV_VAR.as_ptr()) };
        let value = if raw.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(raw) })
        };
        let policy = policy_from_env_value(value);
        log_rt_debug!("report policy initialised", policy = policy.bits());
        policy
    })
}

/// Policy for a given `LIBC_UBSAN` value (`None` when unset).
pub fn policy_from_env_value(value: Option<&CStr>) -> SinkPolicy {
    match value {
        Some(flags) => SinkPolicy::parse(flags.to_bytes()),
        None => SinkPolicy::DEFAULT,
    }
}

pub(super) fn deliver(policy: SinkPolicy, fatal: bool, message: &StackWriter<'_>) {
    if policy.contains(SinkPolicy::STDOUT) {
        write_all(libc::STDOUT_FILENO, message.as_bytes());
    }
    if policy.contains(SinkPolicy::STDERR) {
        write_all(libc::STDERR_FILENO, message.as_bytes());
    }
    if policy.contains(SinkPolicy::SYSLOG) {
        let priority = if fatal || policy.aborts() {
            libc::LOG_ERR
        } else {
            libc::LOG_WARNING
        };
        unsafe {
            libc::syslog(
                priority | libc::LOG_USER,
                c"%s".as_ptr(),
                message.as_c_str().as_ptr(),
            );
        }
    }
}

/// Unbuffered write of the whole slice; gives up silently on error.
pub(super) fn write_all(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if n < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Raise SIGABRT with its default disposition and nothing able to block
/// or catch it.
pub(super) fn terminate() -> ! {
    let mut others = SigSet::all();
    others.remove(Signal::SIGABRT);
    let _ = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&others), None);

    let mut abort = SigSet::empty();
    abort.add(Signal::SIGABRT);
    let _ = pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&abort), None);

    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let _ = unsafe { sigaction(Signal::SIGABRT, &default) };
    let _ = raise(Signal::SIGABRT);

    unsafe { libc::_exit(FALLBACK_EXIT) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn pipe() -> (libc::c_int, libc::c_int) {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    fn read_to_end(fd: libc::c_int) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = unsafe { libc::read(fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len()) };
            if n <= 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n as usize]);
        }
        out
    }

    #[test]
    fn test_write_all_delivers_every_byte() {
        let (rx, tx) = pipe();
        let payload = vec![b'x'; 3000];
        write_all(tx, &payload);
        unsafe { libc::close(tx) };
        assert_eq!(read_to_end(rx), payload);
        unsafe { libc::close(rx) };
    }

    #[test]
    fn test_write_all_to_bad_fd_gives_up() {
        write_all(-1, b"dropped");
    }

    #[test]
    fn test_env_value_mapping() {
        assert_eq!(policy_from_env_value(None), SinkPolicy::STDERR);
        assert_eq!(policy_from_env_value(Some(c"")), SinkPolicy::STDERR);
        assert_eq!(
            policy_from_env_value(Some(c"aeo")),
            SinkPolicy::ABORT
                .union(SinkPolicy::STDERR)
                .union(SinkPolicy::STDOUT)
        );
        assert_eq!(policy_from_env_value(Some(c"E")), SinkPolicy::NONE);
    }

    #[test]
    fn test_deliver_with_no_sinks_is_silent() {
        let mut buf = [0u8; 32];
        let mut w = StackWriter::new(&mut buf);
        w.write_str("UBSan: quiet\n").unwrap();
        deliver(SinkPolicy::NONE, false, &w);
    }
}
