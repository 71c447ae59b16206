use std::{io, ptr, sync::Arc};

use crate::LogRecord;

/// A destination for log records.
///
/// The facility calls [`Logger::open`] once when the logger is attached and
/// [`Logger::close`] once when it is detached. In between, [`Logger::handle`]
/// is called for every dispatched record, always from the same delivery
/// thread and in dispatch order, so a logger never sees `handle` and `close`
/// at the same time.
pub trait Logger: Send + Sync {
    /// Prepares the destination. An error aborts the attachment.
    fn open(&self) -> io::Result<()> {
        Ok(())
    }

    /// Releases the destination. Must tolerate a partially failed `open`.
    fn close(&self) {}

    /// Writes one record. Errors are reported as internal records and never
    /// reach the caller of `log`.
    fn handle(&self, record: &LogRecord) -> io::Result<()>;
}

/// True when both handles point to the same logger instance.
pub fn same_logger(a: &Arc<dyn Logger>, b: &Arc<dyn Logger>) -> bool {
    ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
