use std::{
    any::Any,
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle, ThreadId},
};

use crossbeam_channel::{Sender, bounded, unbounded};
use uuid::Uuid;

use crate::{LogRecord, Logger};

thread_local! {
    static DELIVERY_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// True on the delivery thread of a logger, i.e. while inside [`Logger::handle`]
/// or [`Logger::close`].
pub fn is_delivery_thread() -> bool {
    DELIVERY_THREAD.with(Cell::get)
}

enum Delivery {
    Record(Arc<LogRecord>),
    Flush(Sender<()>),
    Shutdown,
}

/// Handle on the delivery thread of one attached logger.
///
/// Records are queued without bound and handed to the logger in FIFO order.
/// Dropping the sender shuts the thread down after the queue is drained.
pub struct LoggerSender {
    sender: Sender<Delivery>,
    handler: Mutex<Option<JoinHandle<()>>>,
    worker: ThreadId,
}

impl Drop for LoggerSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LoggerSender {
    /// Queues a record. Returns false once the delivery thread is gone.
    pub fn send(&self, record: Arc<LogRecord>) -> bool {
        self.sender.send(Delivery::Record(record)).is_ok()
    }

    /// Blocks until every record queued before this call has been handled.
    pub fn flush(&self) {
        if thread::current().id() == self.worker {
            return;
        }
        let (ack, done) = bounded(1);
        if self.sender.send(Delivery::Flush(ack)).is_ok() {
            // Disconnects instead of acking if the thread exits first.
            let _ = done.recv();
        }
    }

    /// Drains the queue, closes the logger and joins the delivery thread.
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.take() {
            let _ = self.sender.send(Delivery::Shutdown);
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Extracts the text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Spawns the delivery thread of an already opened logger.
///
/// `on_failure` is called with the record and the reason whenever `handle`
/// returns an error or panics, except for internal records.
pub fn spawn_logger_thread<F>(
    id: Uuid,
    logger: Arc<dyn Logger>,
    on_failure: F,
) -> std::io::Result<LoggerSender>
where
    F: Fn(&LogRecord, &str) + Send + 'static,
{
    let (sender, receiver) = unbounded::<Delivery>();
    let handler = thread::Builder::new()
        .name(format!("mtfacility-{}", id.simple()))
        .spawn(move || {
            DELIVERY_THREAD.with(|flag| flag.set(true));
            while let Ok(delivery) = receiver.recv() {
                match delivery {
                    Delivery::Record(record) => {
                        let failure =
                            match panic::catch_unwind(AssertUnwindSafe(|| logger.handle(&record))) {
                                Ok(Ok(())) => None,
                                Ok(Err(error)) => Some(error.to_string()),
                                Err(payload) => Some(panic_message(payload.as_ref())),
                            };
                        if let Some(reason) = failure
                            && !record.is_internal()
                        {
                            on_failure(&record, &reason);
                        }
                    }
                    Delivery::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    Delivery::Shutdown => break,
                }
            }
            let _ = panic::catch_unwind(AssertUnwindSafe(|| logger.close()));
        })?;
    Ok(LoggerSender {
        sender,
        worker: handler.thread().id(),
        handler: Mutex::new(Some(handler)),
    })
}
