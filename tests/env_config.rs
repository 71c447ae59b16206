use std::sync::Arc;

use mtfacility::{Facility, Level, MemoryLogger};

// Single test: the environment is read once per process.
#[test]
fn environment_overrides_thresholds() {
    // SAFETY: no other thread of this test binary reads the environment yet.
    unsafe {
        std::env::set_var("MTFACILITY_MIN_LOG_LEVEL", "3");
        std::env::set_var("MTFACILITY_MIN_CAPTURE_CALLSTACK_LEVEL", "4");
    }
    let facility = Facility::new();
    assert_eq!(facility.min_log_level(), Some(Level::Warning));
    assert_eq!(facility.min_capture_callstack_level(), Some(Level::Error));

    let logger = Arc::new(MemoryLogger::new());
    assert!(facility.add_logger(logger.clone()));
    facility.log("dropped", None, Level::Info);
    facility.log("kept", None, Level::Warning);
    facility.log("with stack", None, Level::Error);
    facility.flush();
    let records = logger.records();
    assert_eq!(logger.messages(), ["kept", "with stack"]);
    assert!(records[0].callstack().is_none());
    assert!(records[1].callstack().is_some());

    // Builder settings win over the environment.
    let built = Facility::builder()
        .with_min_log_level(Level::Debug)
        .build()
        .unwrap();
    assert_eq!(built.min_log_level(), Some(Level::Debug));
    assert_eq!(built.min_capture_callstack_level(), Some(Level::Error));
    facility.shutdown();
}
