use core::ffi::CStr;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::ConfigError;

/// Environment variable consulted by hosted builds.
pub const ENV_VAR: &CStr = c"LIBC_UBSAN";

/// Enabled sinks plus the abort action.
///
/// Each `LIBC_UBSAN` character toggles one bit: lowercase sets it, uppercase
/// clears it. Parsing starts from [`SinkPolicy::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkPolicy(u32);

impl SinkPolicy {
    pub const ABORT: Self = Self(1 << 0);
    pub const STDOUT: Self = Self(1 << 1);
    pub const STDERR: Self = Self(1 << 2);
    pub const SYSLOG: Self = Self(1 << 3);

    pub const NONE: Self = Self(0);
    /// Stderr only, keep running.
    pub const DEFAULT: Self = Self::STDERR;

    const ALL: u32 = Self::ABORT.0 | Self::STDOUT.0 | Self::STDERR.0 | Self::SYSLOG.0;

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Unknown bits are dropped.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn aborts(self) -> bool {
        self.contains(Self::ABORT)
    }

    /// Map one policy character to `(bit, enable)`.
    const fn toggle(flag: u8) -> Option<(Self, bool)> {
        match flag {
            b'a' => Some((Self::ABORT, true)),
            b'A' => Some((Self::ABORT, false)),
            b'e' => Some((Self::STDERR, true)),
            b'E' => Some((Self::STDERR, false)),
            b'l' => Some((Self::SYSLOG, true)),
            b'L' => Some((Self::SYSLOG, false)),
            b'o' => Some((Self::STDOUT, true)),
            b'O' => Some((Self::STDOUT, false)),
            _ => None,
        }
    }

    /// Lenient parse used on the report path: unknown characters are
    /// ignored.
    pub fn parse(flags: &[u8]) -> Self {
        flags.iter().fold(Self::DEFAULT, |policy, &flag| match Self::toggle(flag) {
            Some((bit, true)) => policy.union(bit),
            Some((bit, false)) => policy.difference(bit),
            None => policy,
        })
    }

    /// Like [`SinkPolicy::parse`], but rejects the first character outside
    /// the alphabet.
    pub fn parse_strict(flags: &str) -> Result<Self, ConfigError> {
        if let Some((position, flag)) = flags
            .char_indices()
            .find(|&(_, c)| !c.is_ascii() || Self::toggle(c as u8).is_none())
        {
            return Err(ConfigError::UnknownFlag { flag, position });
        }
        Ok(Self::parse(flags.as_bytes()))
    }
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for SinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::STDOUT, "stdout"),
            (Self::STDERR, "stderr"),
            (Self::SYSLOG, "syslog"),
            (Self::ABORT, "abort"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Compile-time policy for kernel builds: console output, and a panic on
/// every report when `kernel-halt` is enabled.
#[cfg(feature = "kernel-halt")]
pub const KERNEL_POLICY: SinkPolicy = SinkPolicy::STDOUT.union(SinkPolicy::ABORT);
#[cfg(not(feature = "kernel-halt"))]
pub const KERNEL_POLICY: SinkPolicy = SinkPolicy::STDOUT;

const UNSET: u32 = u32::MAX;

/// Lazily initialised, lock-free policy slot.
///
/// Initialisation is a benign race: every thread derives the same value from
/// the same input, so concurrent first callers may each store it.
pub struct PolicyCell {
    bits: AtomicU32,
}

impl PolicyCell {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(UNSET),
        }
    }

    pub fn get(&self) -> Option<SinkPolicy> {
        match self.bits.load(Ordering::Relaxed) {
            UNSET => None,
            bits => Some(SinkPolicy::from_bits_truncate(bits)),
        }
    }

    /// Return the policy, computing it with `init` on first use.
    ///
    /// `init` must be deterministic; it may run more than once under
    /// contention.
    pub fn get_or_init(&self, init: impl FnOnce() -> SinkPolicy) -> SinkPolicy {
        if let Some(policy) = self.get() {
            return policy;
        }
        let policy = init();
        self.bits.store(policy.bits(), Ordering::Relaxed);
        policy
    }
}

impl Default for PolicyCell {
    fn default() -> Self {
        Self::new()
    }
}
