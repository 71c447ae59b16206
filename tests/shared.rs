use std::sync::Arc;

use mtfacility::{Facility, FacilityError, Level, MemoryLogger};

#[test]
fn shared_facility_is_initialized_once() {
    let logger = Arc::new(MemoryLogger::new());
    let guard = Facility::builder()
        .with_min_log_level(Level::Info)
        .with_logger(logger.clone())
        .init_shared()
        .unwrap();
    assert!(matches!(
        Facility::builder().init_shared(),
        Err(FacilityError::AlreadyInitialized)
    ));

    mtfacility::shared().log("shared", None, Level::Info);
    mtfacility::shared().log("filtered", None, Level::Verbose);
    drop(guard);

    assert_eq!(logger.messages(), ["shared"]);
    assert_eq!(logger.close_count(), 1);
    assert!(mtfacility::shared().loggers().is_empty());
}
