use std::sync::Arc;

use mtfacility::{Facility, Level, MemoryLogger, StderrLogger};

// Single test: stderr is process-wide.
#[test]
fn stderr_logger_bypasses_captured_stderr() {
    let memory = Arc::new(MemoryLogger::new());
    let facility = Facility::builder()
        .with_min_log_level(Level::Debug)
        .with_logger(memory.clone())
        .with_stderr_capture(true)
        .build()
        .unwrap();
    assert!(facility.captures_standard_error());

    // Built while stderr points at the capture pipe.
    assert!(facility.add_logger(Arc::new(StderrLogger::new().unwrap())));
    facility.log("one message", Some("stderr_logger"), Level::Warning);
    facility.flush();
    facility.set_captures_standard_error(false).unwrap();
    facility.flush();

    assert_eq!(memory.messages(), ["one message"]);
    facility.shutdown();
}
