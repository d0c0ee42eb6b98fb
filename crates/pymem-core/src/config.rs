//! Runtime configuration.
//!
//! Read from the environment once and cached:
//! - `PYMEM_LOG`: lifecycle log level, one of `off` (default), `error`,
//!   `info`, `debug`, `trace`.
//! - `PYMEM_LOG_CAPACITY`: maximum number of lifecycle records retained
//!   (default 4096).
//!
//! Nothing is ever written to stdout/stderr regardless of level; the level
//! only controls what the in-memory [`LifecycleLog`](crate::LifecycleLog) keeps.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use serde::Serialize;

/// Environment variable selecting the lifecycle log level.
pub const LOG_ENV: &str = "PYMEM_LOG";
/// Environment variable bounding the lifecycle ring.
pub const LOG_CAPACITY_ENV: &str = "PYMEM_LOG_CAPACITY";
/// Default lifecycle ring capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// Lifecycle log level. Ordered from quietest to most verbose.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Off,
    /// Allocator exhaustion.
    Error,
    /// Oversized and overflowing requests.
    Info,
    /// Null releases.
    Debug,
    /// Every successful call.
    Trace,
}

impl LogLevel {
    /// Parse from string (case-insensitive). Unknown values are `Off`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "err" => Self::Error,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" | "all" | "verbose" => Self::Trace,
            _ => Self::Off,
        }
    }

    /// Whether a record at `level` passes this threshold.
    #[must_use]
    pub fn enables(self, level: Self) -> bool {
        level != Self::Off && level <= self
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Shim configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShimConfig {
    pub log_level: LogLevel,
    pub log_capacity: usize,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Off,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl ShimConfig {
    /// Config with lifecycle logging at `level` and the default capacity.
    #[must_use]
    pub fn with_log_level(level: LogLevel) -> Self {
        Self {
            log_level: level,
            ..Self::default()
        }
    }

    /// Reads the process configuration (cached after the first call).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: log_level(),
            log_capacity: log_capacity(),
        }
    }
}

fn parse_capacity(raw: &str) -> usize {
    raw.trim()
        .parse::<usize>()
        .map_or(DEFAULT_LOG_CAPACITY, |n| n.max(1))
}

// Atomic cache: 0=unresolved, 1..=5 = level + 1, 255=resolving.
// Resolution runs on first use inside the exported entry points and never
// blocks: a caller that races the resolving thread gets `Off` for that call.
// Capacity 0 means unresolved; resolved values are at least 1.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(0);
static CACHED_CAPACITY: AtomicUsize = AtomicUsize::new(0);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_RESOLVING: u8 = 255;

fn level_to_u8(level: LogLevel) -> u8 {
    match level {
        LogLevel::Off => 1,
        LogLevel::Error => 2,
        LogLevel::Info => 3,
        LogLevel::Debug => 4,
        LogLevel::Trace => 5,
    }
}

fn u8_to_level(v: u8) -> LogLevel {
    match v {
        2 => LogLevel::Error,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        5 => LogLevel::Trace,
        _ => LogLevel::Off,
    }
}

/// Configured lifecycle log level (reads `PYMEM_LOG` on first call).
#[must_use]
pub fn log_level() -> LogLevel {
    let cached = CACHED_LEVEL.load(Ordering::Relaxed);
    if cached != LEVEL_UNRESOLVED && cached != LEVEL_RESOLVING {
        return u8_to_level(cached);
    }
    if cached == LEVEL_RESOLVING {
        return LogLevel::Off;
    }

    if CACHED_LEVEL
        .compare_exchange(
            LEVEL_UNRESOLVED,
            LEVEL_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_LEVEL.load(Ordering::Relaxed);
        return if v != LEVEL_UNRESOLVED && v != LEVEL_RESOLVING {
            u8_to_level(v)
        } else {
            LogLevel::Off
        };
    }

    let level = std::env::var(LOG_ENV)
        .map(|v| LogLevel::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
    level
}

/// Configured lifecycle ring capacity (reads `PYMEM_LOG_CAPACITY` on first call).
#[must_use]
pub fn log_capacity() -> usize {
    let cached = CACHED_CAPACITY.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    let capacity = std::env::var(LOG_CAPACITY_ENV)
        .map(|v| parse_capacity(&v))
        .unwrap_or(DEFAULT_LOG_CAPACITY);
    // Racing resolvers compute the same value; last store wins.
    CACHED_CAPACITY.store(capacity, Ordering::Release);
    capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_levels() {
        assert_eq!(LogLevel::from_str_loose("trace"), LogLevel::Trace);
        assert_eq!(LogLevel::from_str_loose("TRACE"), LogLevel::Trace);
        assert_eq!(LogLevel::from_str_loose("verbose"), LogLevel::Trace);
        assert_eq!(LogLevel::from_str_loose(" debug "), LogLevel::Debug);
        assert_eq!(LogLevel::from_str_loose("info"), LogLevel::Info);
        assert_eq!(LogLevel::from_str_loose("err"), LogLevel::Error);
        assert_eq!(LogLevel::from_str_loose("off"), LogLevel::Off);
        assert_eq!(LogLevel::from_str_loose("none"), LogLevel::Off);
        assert_eq!(LogLevel::from_str_loose("garbage"), LogLevel::Off);
        assert_eq!(LogLevel::from_str_loose(""), LogLevel::Off);
    }

    #[test]
    fn thresholds() {
        assert!(LogLevel::Trace.enables(LogLevel::Error));
        assert!(LogLevel::Trace.enables(LogLevel::Trace));
        assert!(LogLevel::Error.enables(LogLevel::Error));
        assert!(!LogLevel::Error.enables(LogLevel::Trace));
        assert!(!LogLevel::Off.enables(LogLevel::Error));
        assert!(!LogLevel::Trace.enables(LogLevel::Off));
    }

    #[test]
    fn level_cache_encoding_round_trips() {
        for level in [
            LogLevel::Off,
            LogLevel::Error,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(u8_to_level(level_to_u8(level)), level);
        }
    }

    #[test]
    fn capacity_parsing() {
        assert_eq!(parse_capacity("16"), 16);
        assert_eq!(parse_capacity("0"), 1);
        assert_eq!(parse_capacity("lots"), DEFAULT_LOG_CAPACITY);
    }

    // Serializes tests that swap the process-wide caches or the environment.
    static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn cached_level_is_process_sticky_until_cache_reset() {
        let _guard = TEST_LOCK.lock();
        let previous = CACHED_LEVEL.swap(level_to_u8(LogLevel::Debug), Ordering::SeqCst);
        assert_eq!(log_level(), LogLevel::Debug);
        assert_eq!(log_level(), LogLevel::Debug);

        CACHED_LEVEL.store(level_to_u8(LogLevel::Error), Ordering::SeqCst);
        assert_eq!(log_level(), LogLevel::Error);

        CACHED_LEVEL.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn resolving_state_returns_silent_default() {
        let _guard = TEST_LOCK.lock();
        let previous = CACHED_LEVEL.swap(LEVEL_RESOLVING, Ordering::SeqCst);
        assert_eq!(log_level(), LogLevel::Off);
        CACHED_LEVEL.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn cached_capacity_is_process_sticky() {
        let _guard = TEST_LOCK.lock();
        let previous = CACHED_CAPACITY.swap(7, Ordering::SeqCst);
        assert_eq!(log_capacity(), 7);
        assert_eq!(ShimConfig::from_env().log_capacity, 7);
        CACHED_CAPACITY.store(previous, Ordering::SeqCst);
    }

    #[test]
    #[allow(unsafe_code)]
    fn from_env_reads_and_caches_both_variables() {
        let _guard = TEST_LOCK.lock();
        let previous_level = CACHED_LEVEL.swap(LEVEL_UNRESOLVED, Ordering::SeqCst);
        let previous_capacity = CACHED_CAPACITY.swap(0, Ordering::SeqCst);

        // SAFETY: env mutation in this crate's tests is serialized by TEST_LOCK.
        unsafe {
            std::env::set_var(LOG_ENV, "Debug");
            std::env::set_var(LOG_CAPACITY_ENV, "2");
        }
        assert_eq!(
            ShimConfig::from_env(),
            ShimConfig {
                log_level: LogLevel::Debug,
                log_capacity: 2,
            }
        );

        // Cached values survive later environment changes.
        // SAFETY: as above.
        unsafe {
            std::env::set_var(LOG_ENV, "trace");
            std::env::set_var(LOG_CAPACITY_ENV, "0");
        }
        assert_eq!(log_level(), LogLevel::Debug);
        assert_eq!(log_capacity(), 2);

        // A fresh resolution clamps a zero capacity to one.
        CACHED_CAPACITY.store(0, Ordering::SeqCst);
        assert_eq!(log_capacity(), 1);

        // SAFETY: as above.
        unsafe {
            std::env::remove_var(LOG_ENV);
            std::env::remove_var(LOG_CAPACITY_ENV);
        }
        CACHED_LEVEL.store(LEVEL_UNRESOLVED, Ordering::SeqCst);
        CACHED_CAPACITY.store(0, Ordering::SeqCst);
        assert_eq!(ShimConfig::from_env(), ShimConfig::default());

        CACHED_LEVEL.store(previous_level, Ordering::SeqCst);
        CACHED_CAPACITY.store(previous_capacity, Ordering::SeqCst);
    }

    #[test]
    fn default_config_is_silent() {
        let config = ShimConfig::default();
        assert_eq!(config.log_level, LogLevel::Off);
        assert_eq!(config.log_capacity, DEFAULT_LOG_CAPACITY);
        assert_eq!(
            ShimConfig::with_log_level(LogLevel::Debug).log_level,
            LogLevel::Debug
        );
    }
}
