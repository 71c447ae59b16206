//! # mtfacility
//! Process-wide log dispatch: one facility, any number of loggers, each fed
//! by its own delivery thread.
//!
//! ## Usage
//! ```toml
//! // Cargo.toml
//! ...
//! [dependencies]
//! mtfacility = "0.1.0"
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use mtfacility::{Facility, Level, MemoryLogger};
//!
//! let logger = Arc::new(MemoryLogger::new());
//! let facility = Facility::builder()
//!     .with_min_log_level(Level::Info)
//!     .with_logger(logger.clone())
//!     .build()
//!     .expect("Unable to build facility");
//!
//! facility.log("Hello, world!", None, Level::Info);
//! facility.log("not shown", None, Level::Debug);
//! facility.flush();
//! assert_eq!(logger.messages(), ["Hello, world!"]);
//! ```
//!
//! ## Internal logger
//! Records tagged [`TAG_INTERNAL`] come from the facility itself (a logger
//! failing to open or to handle a record, a capture that cannot be
//! restored) or from code running inside a logger. They are only delivered
//! to the internal logger, never broadcast, so a failing logger cannot feed
//! itself.
//!
//! ```rust
//! use std::sync::Arc;
//! use mtfacility::{Facility, Level, Logger, MemoryLogger, TAG_INTERNAL};
//!
//! let facility = Facility::builder().with_min_log_level(Level::Debug).build().unwrap();
//! let general: Arc<dyn Logger> = Arc::new(MemoryLogger::new());
//! let internal = Arc::new(MemoryLogger::new());
//! facility.add_logger(general);
//! facility.add_logger(internal.clone());
//! facility.set_internal_logger(Some(&(internal.clone() as Arc<dyn Logger>))).unwrap();
//!
//! facility.log("only for the internal logger", Some(TAG_INTERNAL), Level::Warning);
//! facility.flush();
//! assert_eq!(internal.messages(), ["only for the internal logger"]);
//! ```
//!
//! ## Shared facility
//! ```rust
//! use mtfacility::{Facility, Level};
//!
//! let _guard = Facility::builder()
//!     .with_stdout_capture(false)
//!     .init_shared()
//!     .expect("Unable to initialize the shared facility");
//! mtfacility::shared().log("Hello, world!", None, Level::Info);
//! // guard ensures records are delivered and loggers closed when dropped
//! ```
//!
//! ## Environment
//! `MTFACILITY_MIN_LOG_LEVEL` and `MTFACILITY_MIN_CAPTURE_CALLSTACK_LEVEL`
//! override the default thresholds with a level ordinal (0 = `Debug`,
//! 6 = `Abort`, anything higher mutes). `MTFACILITY_CAPTURE_BUFFER_SIZE` sets
//! the read buffer of stream capture threads.

mod bridge;
mod capture;
mod exception;
mod facility;
mod gate;

use std::{
    io::IsTerminal,
    sync::{Arc, OnceLock},
};

pub use bridge::LogBridge;
pub use capture::StreamCapture;
pub use exception::Exception;
pub use facility::{Facility, FacilityBuilder, FacilityGuard};
pub use gate::{LevelGate, default_min_log_level};
pub use mtfacility_core::{
    FacilityError, Frame, Level, LogRecord, Logger, MemoryLogger, Result, StderrLogger,
    StdStream, TAG_CAPTURED_STDERR, TAG_CAPTURED_STDOUT, TAG_INITIALIZED_EXCEPTIONS, TAG_INTERNAL,
    TAG_UNCAUGHT_EXCEPTIONS, format_record, original_stream,
};

static SHARED: OnceLock<Facility> = OnceLock::new();

fn default_shared() -> Facility {
    let facility = Facility::new();
    if std::io::stderr().is_terminal()
        && let Ok(logger) = StderrLogger::new()
    {
        let logger: Arc<dyn Logger> = Arc::new(logger);
        if facility.add_logger(Arc::clone(&logger)) && cfg!(debug_assertions) {
            let _ = facility.set_internal_logger(Some(&logger));
        }
    }
    facility
}

/// Returns the process-wide facility, creating it on first use.
///
/// Unless [`FacilityBuilder::init_shared`] ran first, it starts with a
/// [`StderrLogger`] when stderr is a terminal, which is also the internal
/// logger in debug builds.
pub fn shared() -> &'static Facility {
    SHARED.get_or_init(default_shared)
}

fn install_shared(facility: Facility) -> Result<()> {
    SHARED
        .set(facility)
        .map_err(|_| FacilityError::AlreadyInitialized)
}
