use std::sync::atomic::{AtomicU8, Ordering};

use mtfacility_core::{Level, MTFACILITY_CONFIG};

const MUTED: u8 = Level::MAX as u8 + 1;

fn threshold(ordinal: i64) -> u8 {
    ordinal.clamp(0, MUTED as i64) as u8
}

/// The default minimum log level: `Debug` in debug builds, `Info` otherwise.
pub fn default_min_log_level() -> Level {
    if cfg!(debug_assertions) {
        Level::Debug
    } else {
        Level::Info
    }
}

/// Severity thresholds consulted by every logging call.
///
/// Reads and writes are relaxed: a new threshold is seen by subsequent
/// logging calls eventually, with no ordering against other memory.
#[derive(Debug)]
pub struct LevelGate {
    min_log_level: AtomicU8,
    min_capture_callstack_level: AtomicU8,
}

impl Default for LevelGate {
    fn default() -> Self {
        Self::new(default_min_log_level(), Level::Exception)
    }
}

impl LevelGate {
    pub fn new(min_log_level: Level, min_capture_callstack_level: Level) -> Self {
        Self {
            min_log_level: AtomicU8::new(min_log_level.ordinal()),
            min_capture_callstack_level: AtomicU8::new(min_capture_callstack_level.ordinal()),
        }
    }

    /// Build defaults overridden by `MTFACILITY_MIN_LOG_LEVEL` and
    /// `MTFACILITY_MIN_CAPTURE_CALLSTACK_LEVEL`.
    pub fn from_env() -> Self {
        let gate = Self::default();
        if let Some(ordinal) = MTFACILITY_CONFIG.MIN_LOG_LEVEL {
            gate.min_log_level.store(threshold(ordinal), Ordering::Relaxed);
        }
        if let Some(ordinal) = MTFACILITY_CONFIG.MIN_CAPTURE_CALLSTACK_LEVEL {
            gate.min_capture_callstack_level
                .store(threshold(ordinal), Ordering::Relaxed);
        }
        gate
    }

    pub fn should_log(&self, level: Level) -> bool {
        level.ordinal() >= self.min_log_level.load(Ordering::Relaxed)
    }

    pub fn should_capture_stack(&self, level: Level) -> bool {
        level.ordinal() >= self.min_capture_callstack_level.load(Ordering::Relaxed)
    }

    /// Current minimum log level, `None` while muted.
    pub fn min_log_level(&self) -> Option<Level> {
        Level::from_ordinal(self.min_log_level.load(Ordering::Relaxed).into())
    }

    pub fn set_min_log_level(&self, level: Level) {
        self.min_log_level.store(level.ordinal(), Ordering::Relaxed);
    }

    /// Discards every record, including `Abort`.
    pub fn mute(&self) {
        self.min_log_level.store(MUTED, Ordering::Relaxed);
    }

    /// Current callstack capture threshold, `None` when capture is disabled.
    pub fn min_capture_callstack_level(&self) -> Option<Level> {
        Level::from_ordinal(self.min_capture_callstack_level.load(Ordering::Relaxed).into())
    }

    pub fn set_min_capture_callstack_level(&self, level: Level) {
        self.min_capture_callstack_level
            .store(level.ordinal(), Ordering::Relaxed);
    }

    pub fn disable_callstack_capture(&self) {
        self.min_capture_callstack_level
            .store(MUTED, Ordering::Relaxed);
    }
}
