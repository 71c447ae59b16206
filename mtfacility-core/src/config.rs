use std::sync::LazyLock;

use derive_from_env::FromEnv;

/// Settings read once from the environment, e.g. `MTFACILITY_MIN_LOG_LEVEL=4`.
#[derive(FromEnv)]
#[from_env(prefix = "MTFACILITY")]
#[allow(non_snake_case)]
pub struct MTFacilityConfig {
    /// Ordinal of the minimum log level. Values above the highest level mute logging.
    pub MIN_LOG_LEVEL: Option<i64>,
    /// Ordinal of the minimum level at which callstacks are captured.
    pub MIN_CAPTURE_CALLSTACK_LEVEL: Option<i64>,
    /// Size of the read buffer used by stream capture threads.
    #[from_env(default = "4096")]
    pub CAPTURE_BUFFER_SIZE: usize,
}

impl Default for MTFacilityConfig {
    fn default() -> Self {
        Self {
            MIN_LOG_LEVEL: None,
            MIN_CAPTURE_CALLSTACK_LEVEL: None,
            CAPTURE_BUFFER_SIZE: 4096,
        }
    }
}

// Falls back to the defaults on a malformed environment.
pub static MTFACILITY_CONFIG: LazyLock<MTFacilityConfig> =
    LazyLock::new(|| MTFacilityConfig::from_env().unwrap_or_default());
