use std::{io, sync::Arc, thread, time::Duration};

use mtfacility::{
    Facility, Level, LogRecord, Logger, MemoryLogger, TAG_INTERNAL, TAG_UNCAUGHT_EXCEPTIONS,
};

struct Panicky;

impl Logger for Panicky {
    fn handle(&self, record: &LogRecord) -> io::Result<()> {
        panic!("cannot handle {}", record.message());
    }
}

// Single test: the panic hook is process-wide.
#[test]
fn panicking_loggers_do_not_stall_delivery() {
    let memory = Arc::new(MemoryLogger::new());
    let internal: Arc<dyn Logger> = memory.clone();
    let facility = Facility::builder()
        .with_min_log_level(Level::Debug)
        .with_logger(Arc::new(Panicky))
        .with_logger(Arc::new(Panicky))
        .with_logger(memory.clone())
        .log_uncaught_exceptions(true)
        .build()
        .unwrap();
    facility.set_internal_logger(Some(&internal)).unwrap();

    let (done, finished) = crossbeam_channel::bounded(1);
    let producer = facility.clone();
    thread::spawn(move || {
        producer.log("poison", None, Level::Info);
        producer.flush();
        let _ = done.send(());
    });
    finished
        .recv_timeout(Duration::from_secs(10))
        .expect("flush stalled behind panicking loggers");

    // Failures come back once per logger as handling errors, never as uncaught panics.
    let records = memory.records();
    assert_eq!(records[0].message(), "poison");
    assert!(
        records
            .iter()
            .all(|record| record.tag() != Some(TAG_UNCAUGHT_EXCEPTIONS))
    );
    let failures: Vec<_> = records
        .iter()
        .filter(|record| record.tag() == Some(TAG_INTERNAL))
        .collect();
    assert_eq!(failures.len(), 2);
    for failure in failures {
        assert_eq!(failure.level(), Level::Error);
        assert!(failure.message().contains("cannot handle poison"));
    }

    // The hook keeps working for panics outside delivery threads.
    memory.clear();
    assert!(std::panic::catch_unwind::<_, ()>(|| panic!("outside")).is_err());
    facility.shutdown();
    let uncaught: Vec<_> = memory
        .records()
        .into_iter()
        .filter(|record| record.tag() == Some(TAG_UNCAUGHT_EXCEPTIONS))
        .collect();
    assert_eq!(uncaught.len(), 1);
    assert!(uncaught[0].message().contains("outside"));
}
