//! # mtfacility-core
//! Core types for mtfacility - shared logging infrastructure.
//!
//! This crate holds what destinations need to know about: the [`Level`] scale,
//! the immutable [`LogRecord`], the [`Logger`] capability and the per-logger
//! delivery thread used by the dispatch core.

mod config;
mod error;
mod level;
mod log_writer;
mod logger;
mod record;
mod utils;

pub use config::{MTFACILITY_CONFIG, MTFacilityConfig};
pub use error::{FacilityError, Result, StdStream};
pub use level::Level;
pub use log_writer::{MemoryLogger, StderrLogger, format_record, original_stream};
pub use logger::{Logger, same_logger};
pub use record::{Frame, LogRecord, capture_callstack};
pub use utils::{LoggerSender, is_delivery_thread, panic_message, spawn_logger_thread};

/// Tag of records emitted by the facility itself. Only delivered to the internal logger.
pub const TAG_INTERNAL: &str = "mtfacility.internal";
/// Tag of records synthesized from the captured standard output.
pub const TAG_CAPTURED_STDOUT: &str = "mtfacility.captured-stdout";
/// Tag of records synthesized from the captured standard error.
pub const TAG_CAPTURED_STDERR: &str = "mtfacility.captured-stderr";
/// Tag of records logged by the panic hook.
pub const TAG_UNCAUGHT_EXCEPTIONS: &str = "mtfacility.uncaught-exceptions";
/// Tag of records logged when an exception value is constructed.
pub const TAG_INITIALIZED_EXCEPTIONS: &str = "mtfacility.initialized-exceptions";
