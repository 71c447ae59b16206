use mtfacility::{Facility, Level, default_min_log_level};

// Single test: the environment is read once per process.
#[test]
fn malformed_environment_keeps_defaults() {
    // SAFETY: no other thread of this test binary reads the environment yet.
    unsafe {
        std::env::set_var("MTFACILITY_MIN_LOG_LEVEL", "loud");
        std::env::set_var("MTFACILITY_MIN_CAPTURE_CALLSTACK_LEVEL", "4");
    }
    let facility = Facility::new();
    assert_eq!(facility.min_log_level(), Some(default_min_log_level()));
    assert_eq!(facility.min_capture_callstack_level(), Some(Level::Exception));
}
