use std::{
    io::Write,
    os::fd::RawFd,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use mtfacility_core::{
    FacilityError, Level, LogRecord, Logger, LoggerSender, MTFACILITY_CONFIG, Result, StdStream,
    TAG_CAPTURED_STDERR, TAG_CAPTURED_STDOUT, TAG_INTERNAL, capture_callstack,
    is_delivery_thread, original_stream, same_logger, spawn_logger_thread,
};
use uuid::Uuid;

use crate::{
    capture::StreamCapture,
    exception::{self, Exception},
    gate::LevelGate,
};

struct Attachment {
    id: Uuid,
    logger: Arc<dyn Logger>,
    sender: Arc<LoggerSender>,
}

#[derive(Default)]
struct Registry {
    attachments: Vec<Attachment>,
    // Always the id of an entry of `attachments`.
    internal: Option<Uuid>,
}

impl Registry {
    fn position(&self, logger: &Arc<dyn Logger>) -> Option<usize> {
        self.attachments
            .iter()
            .position(|attachment| same_logger(&attachment.logger, logger))
    }

    fn internal(&self) -> Option<&Attachment> {
        let id = self.internal?;
        self.attachments.iter().find(|attachment| attachment.id == id)
    }
}

#[derive(Default)]
struct Captures {
    stdout: Option<StreamCapture>,
    stderr: Option<StreamCapture>,
}

pub(crate) struct Inner {
    pub(crate) id: Uuid,
    gate: LevelGate,
    // Serializes add/remove so `open` runs at most once per attachment.
    membership: Mutex<()>,
    registry: RwLock<Registry>,
    captures: Mutex<Captures>,
    logs_uncaught_exceptions: AtomicBool,
    logs_initialized_exceptions: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn log(&self, message: impl Into<String>, tag: Option<&str>, level: Level) {
        if !self.gate.should_log(level) {
            return;
        }
        // Anything logged from inside a logger must not fan out again.
        let tag = if is_delivery_thread() {
            Some(TAG_INTERNAL)
        } else {
            tag
        };
        let mut record = LogRecord::new(level, tag, message);
        if self.gate.should_capture_stack(level) {
            record = record.with_callstack(capture_callstack());
        }
        self.dispatch(Arc::new(record));
    }

    pub(crate) fn log_internal(&self, message: impl Into<String>, level: Level) {
        self.log(message, Some(TAG_INTERNAL), level);
    }

    pub(crate) fn log_exception(&self, exception: &Exception, tag: Option<&str>) {
        if !self.gate.should_log(Level::Exception) {
            return;
        }
        let tag = if is_delivery_thread() {
            Some(TAG_INTERNAL)
        } else {
            tag
        };
        let record = LogRecord::new(Level::Exception, tag, exception.message())
            .with_callstack(exception.callstack().to_vec());
        self.dispatch(Arc::new(record));
    }

    fn dispatch(&self, record: Arc<LogRecord>) {
        let registry = self.read_registry();
        if record.is_internal() {
            if let Some(attachment) = registry.internal() {
                attachment.sender.send(record);
            }
            return;
        }
        for attachment in &registry.attachments {
            attachment.sender.send(Arc::clone(&record));
        }
    }

    pub(crate) fn flush(&self) {
        let senders: Vec<Arc<LoggerSender>> = self
            .read_registry()
            .attachments
            .iter()
            .map(|attachment| Arc::clone(&attachment.sender))
            .collect();
        for sender in senders {
            sender.flush();
        }
    }

    pub(crate) fn logs_uncaught_exceptions(&self) -> bool {
        self.logs_uncaught_exceptions.load(Ordering::Relaxed)
    }

    pub(crate) fn logs_initialized_exceptions(&self) -> bool {
        self.logs_initialized_exceptions.load(Ordering::Relaxed)
    }

    fn remove_all_loggers(&self) {
        let _membership = lock(&self.membership);
        let attachments = {
            let mut registry = self.write_registry();
            registry.internal = None;
            std::mem::take(&mut registry.attachments)
        };
        // Drained and closed outside the registry lock: a closing logger may still log.
        for attachment in attachments {
            attachment.sender.shutdown();
        }
    }

    fn set_capture(self: &Arc<Self>, stream: StdStream, enabled: bool) -> Result<()> {
        let mut captures = lock(&self.captures);
        let (slot, fd, tag, level): (_, RawFd, _, _) = match stream {
            StdStream::Stdout => (
                &mut captures.stdout,
                libc::STDOUT_FILENO,
                TAG_CAPTURED_STDOUT,
                Level::Info,
            ),
            StdStream::Stderr => (
                &mut captures.stderr,
                libc::STDERR_FILENO,
                TAG_CAPTURED_STDERR,
                Level::Error,
            ),
        };
        flush_std(stream);
        if !enabled {
            if let Some(capture) = slot.as_mut() {
                capture
                    .stop()
                    .map_err(|source| FacilityError::Capture { stream, source })?;
                *slot = None;
            }
        } else if slot.is_none() {
            // Pins the unredirected stream for StderrLogger.
            original_stream(stream)
                .map_err(|source| FacilityError::Capture { stream, source })?;
            let weak = Arc::downgrade(self);
            let capture = StreamCapture::start(
                fd,
                MTFACILITY_CONFIG.CAPTURE_BUFFER_SIZE,
                move |line| {
                    if let Some(inner) = weak.upgrade() {
                        inner.log(line, Some(tag), level);
                    }
                },
            )
            .map_err(|source| FacilityError::Capture { stream, source })?;
            *slot = Some(capture);
        }
        Ok(())
    }

    fn captures(&self, stream: StdStream) -> bool {
        let captures = lock(&self.captures);
        match stream {
            StdStream::Stdout => captures.stdout.is_some(),
            StdStream::Stderr => captures.stderr.is_some(),
        }
    }

    fn stop_captures(&self) {
        let mut guard = lock(&self.captures);
        let captures = &mut *guard;
        for (stream, slot) in [
            (StdStream::Stdout, &mut captures.stdout),
            (StdStream::Stderr, &mut captures.stderr),
        ] {
            flush_std(stream);
            if let Some(capture) = slot.as_mut() {
                match capture.stop() {
                    Ok(()) => *slot = None,
                    Err(error) => self.log_internal(
                        format!("Failed restoring captured {stream}: {error}"),
                        Level::Error,
                    ),
                }
            }
        }
    }

    fn shutdown(&self) {
        self.stop_captures();
        self.logs_uncaught_exceptions.store(false, Ordering::Relaxed);
        self.logs_initialized_exceptions
            .store(false, Ordering::Relaxed);
        exception::unbind(self.id);
        self.remove_all_loggers();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn flush_std(stream: StdStream) {
    let _ = match stream {
        StdStream::Stdout => std::io::stdout().flush(),
        StdStream::Stderr => std::io::stderr().flush(),
    };
}

/// The dispatch core: a set of attached loggers fed by every logging call.
///
/// `Facility` is a cheap handle; clones share the same state. The state is
/// torn down (captures restored, hooks released, loggers drained and
/// closed) by [`Facility::shutdown`] or when the last handle is dropped.
#[derive(Clone)]
pub struct Facility {
    pub(crate) inner: Arc<Inner>,
}

impl Default for Facility {
    fn default() -> Self {
        Self::new()
    }
}

impl Facility {
    /// A facility without loggers, with thresholds from the environment.
    pub fn new() -> Self {
        Self::with_gate(LevelGate::from_env())
    }

    pub fn with_gate(gate: LevelGate) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                gate,
                membership: Mutex::new(()),
                registry: RwLock::new(Registry::default()),
                captures: Mutex::new(Captures::default()),
                logs_uncaught_exceptions: AtomicBool::new(false),
                logs_initialized_exceptions: AtomicBool::new(false),
            }),
        }
    }

    pub fn builder() -> FacilityBuilder {
        FacilityBuilder::default()
    }

    /// The severity thresholds of this facility.
    pub fn gate(&self) -> &LevelGate {
        &self.inner.gate
    }

    pub fn min_log_level(&self) -> Option<Level> {
        self.inner.gate.min_log_level()
    }

    pub fn set_min_log_level(&self, level: Level) {
        self.inner.gate.set_min_log_level(level);
    }

    pub fn min_capture_callstack_level(&self) -> Option<Level> {
        self.inner.gate.min_capture_callstack_level()
    }

    pub fn set_min_capture_callstack_level(&self, level: Level) {
        self.inner.gate.set_min_capture_callstack_level(level);
    }

    /// Logs a message with an optional tag.
    ///
    /// Below the minimum level this returns before the message is converted.
    /// Records tagged [`TAG_INTERNAL`] only reach the internal logger.
    pub fn log(&self, message: impl Into<String>, tag: Option<&str>, level: Level) {
        self.inner.log(message, tag, level);
    }

    /// Logs a diagnostic about the logging machinery itself.
    pub fn log_internal(&self, message: impl Into<String>, level: Level) {
        self.inner.log_internal(message, level);
    }

    /// Logs an exception at the `Exception` level with its own callstack.
    pub fn log_exception(&self, exception: &Exception, tag: Option<&str>) {
        self.inner.log_exception(exception, tag);
    }

    /// Attaches and opens a logger.
    ///
    /// Fails without calling `open` if the logger is already attached.
    pub fn try_add_logger(&self, logger: Arc<dyn Logger>) -> Result<()> {
        let _membership = lock(&self.inner.membership);
        if self.inner.read_registry().position(&logger).is_some() {
            return Err(FacilityError::AlreadyAttached);
        }
        if let Err(source) = logger.open() {
            self.inner
                .log_internal(format!("Failed opening logger: {source}"), Level::Error);
            return Err(FacilityError::Open { source });
        }
        let id = Uuid::new_v4();
        let weak = Arc::downgrade(&self.inner);
        let sender = spawn_logger_thread(id, Arc::clone(&logger), move |record, reason| {
            if let Some(inner) = weak.upgrade() {
                inner.log_internal(
                    format!(
                        "Logger failed handling {} record \"{}\": {reason}",
                        record.level(),
                        record.message()
                    ),
                    Level::Error,
                );
            }
        });
        let sender = match sender {
            Ok(sender) => Arc::new(sender),
            Err(error) => {
                logger.close();
                self.inner.log_internal(
                    format!("Failed starting logger thread: {error}"),
                    Level::Error,
                );
                return Err(FacilityError::Spawn(error));
            }
        };
        self.inner.write_registry().attachments.push(Attachment {
            id,
            logger,
            sender,
        });
        Ok(())
    }

    /// Attaches and opens a logger. Returns false if it was already attached
    /// or failed to open.
    pub fn add_logger(&self, logger: Arc<dyn Logger>) -> bool {
        self.try_add_logger(logger).is_ok()
    }

    /// Detaches a logger after its pending records are handled, then closes it.
    ///
    /// Returns false if the logger was not attached.
    pub fn remove_logger(&self, logger: &Arc<dyn Logger>) -> bool {
        let _membership = lock(&self.inner.membership);
        let attachment = {
            let mut registry = self.inner.write_registry();
            let Some(position) = registry.position(logger) else {
                return false;
            };
            let attachment = registry.attachments.remove(position);
            if registry.internal == Some(attachment.id) {
                registry.internal = None;
            }
            attachment
        };
        attachment.sender.shutdown();
        true
    }

    /// Detaches, drains and closes every logger.
    pub fn remove_all_loggers(&self) {
        self.inner.remove_all_loggers();
    }

    /// Snapshot of the attached loggers, in attachment order.
    pub fn loggers(&self) -> Vec<Arc<dyn Logger>> {
        self.inner
            .read_registry()
            .attachments
            .iter()
            .map(|attachment| Arc::clone(&attachment.logger))
            .collect()
    }

    pub fn is_attached(&self, logger: &Arc<dyn Logger>) -> bool {
        self.inner.read_registry().position(logger).is_some()
    }

    /// Designates the logger receiving internal records, or drops them with `None`.
    ///
    /// The logger must already be attached; otherwise nothing changes and
    /// [`FacilityError::NotAttached`] is returned.
    pub fn set_internal_logger(&self, logger: Option<&Arc<dyn Logger>>) -> Result<()> {
        let mut registry = self.inner.write_registry();
        registry.internal = match logger {
            None => None,
            Some(logger) => {
                let position = registry
                    .position(logger)
                    .ok_or(FacilityError::NotAttached)?;
                Some(registry.attachments[position].id)
            }
        };
        Ok(())
    }

    pub fn internal_logger(&self) -> Option<Arc<dyn Logger>> {
        self.inner
            .read_registry()
            .internal()
            .map(|attachment| Arc::clone(&attachment.logger))
    }

    /// Blocks until every record dispatched so far has been handled.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Redirects stdout into `Info` records tagged [`TAG_CAPTURED_STDOUT`],
    /// still writing everything through to the original stdout.
    pub fn set_captures_standard_output(&self, enabled: bool) -> Result<()> {
        self.inner.set_capture(StdStream::Stdout, enabled)
    }

    pub fn captures_standard_output(&self) -> bool {
        self.inner.captures(StdStream::Stdout)
    }

    /// Redirects stderr into `Error` records tagged [`TAG_CAPTURED_STDERR`],
    /// still writing everything through to the original stderr.
    pub fn set_captures_standard_error(&self, enabled: bool) -> Result<()> {
        self.inner.set_capture(StdStream::Stderr, enabled)
    }

    pub fn captures_standard_error(&self) -> bool {
        self.inner.captures(StdStream::Stderr)
    }

    /// Logs every panic, before unwinding starts, with its callstack.
    ///
    /// The panic hook is process-wide: enabling this (or
    /// [`Facility::set_logs_initialized_exceptions`]) routes it to this
    /// facility and away from any other.
    pub fn set_logs_uncaught_exceptions(&self, enabled: bool) {
        self.inner
            .logs_uncaught_exceptions
            .store(enabled, Ordering::Relaxed);
        self.rebind_exception_hook();
    }

    pub fn logs_uncaught_exceptions(&self) -> bool {
        self.inner.logs_uncaught_exceptions()
    }

    /// Logs every [`Exception`] at construction, whether it is handled or not.
    pub fn set_logs_initialized_exceptions(&self, enabled: bool) {
        self.inner
            .logs_initialized_exceptions
            .store(enabled, Ordering::Relaxed);
        self.rebind_exception_hook();
    }

    pub fn logs_initialized_exceptions(&self) -> bool {
        self.inner.logs_initialized_exceptions()
    }

    fn rebind_exception_hook(&self) {
        if self.logs_uncaught_exceptions() || self.logs_initialized_exceptions() {
            exception::bind(&self.inner);
        } else {
            exception::unbind(self.inner.id);
        }
    }

    /// Restores captured streams, releases the exception hook, then drains
    /// and closes every logger. The facility stays usable afterwards.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// Builder for configuring a [`Facility`].
#[derive(Default)]
pub struct FacilityBuilder {
    min_log_level: Option<Level>,
    muted: bool,
    min_capture_callstack_level: Option<Level>,
    loggers: Vec<Arc<dyn Logger>>,
    internal_logger: Option<Arc<dyn Logger>>,
    capture_stdout: bool,
    capture_stderr: bool,
    log_uncaught_exceptions: bool,
    log_initialized_exceptions: bool,
}

impl FacilityBuilder {
    /// Sets the minimum log level, overriding the environment.
    pub fn with_min_log_level(self, level: Level) -> Self {
        Self {
            min_log_level: Some(level),
            muted: false,
            ..self
        }
    }
    /// Discards every record until a level is set on the facility.
    pub fn muted(self) -> Self {
        Self {
            muted: true,
            ..self
        }
    }
    pub fn with_min_capture_callstack_level(self, level: Level) -> Self {
        Self {
            min_capture_callstack_level: Some(level),
            ..self
        }
    }
    /// Attaches a logger at build time.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        if !self.loggers.iter().any(|known| same_logger(known, &logger)) {
            self.loggers.push(logger);
        }
        self
    }
    /// Attaches a logger and designates it as the internal logger.
    pub fn with_internal_logger(self, logger: Arc<dyn Logger>) -> Self {
        let mut builder = self.with_logger(Arc::clone(&logger));
        builder.internal_logger = Some(logger);
        builder
    }
    pub fn with_stdout_capture(self, yes: bool) -> Self {
        Self {
            capture_stdout: yes,
            ..self
        }
    }
    pub fn with_stderr_capture(self, yes: bool) -> Self {
        Self {
            capture_stderr: yes,
            ..self
        }
    }
    pub fn log_uncaught_exceptions(self, yes: bool) -> Self {
        Self {
            log_uncaught_exceptions: yes,
            ..self
        }
    }
    pub fn log_initialized_exceptions(self, yes: bool) -> Self {
        Self {
            log_initialized_exceptions: yes,
            ..self
        }
    }

    /// Builds the facility. On error everything already set up is torn down.
    pub fn build(self) -> Result<Facility> {
        let gate = LevelGate::from_env();
        if let Some(level) = self.min_log_level {
            gate.set_min_log_level(level);
        }
        if self.muted {
            gate.mute();
        }
        if let Some(level) = self.min_capture_callstack_level {
            gate.set_min_capture_callstack_level(level);
        }
        let facility = Facility::with_gate(gate);
        for logger in self.loggers {
            facility.try_add_logger(logger)?;
        }
        facility.set_internal_logger(self.internal_logger.as_ref())?;
        facility.set_captures_standard_output(self.capture_stdout)?;
        facility.set_captures_standard_error(self.capture_stderr)?;
        if self.log_uncaught_exceptions {
            facility.set_logs_uncaught_exceptions(true);
        }
        if self.log_initialized_exceptions {
            facility.set_logs_initialized_exceptions(true);
        }
        Ok(facility)
    }

    /// Builds the facility and installs it as the shared one.
    ///
    /// Returns a guard that shuts the shared facility down when dropped.
    #[must_use = "FacilityGuard must be kept alive to ensure logging works. Do \"let _guard = Facility::builder().init_shared()?;\""]
    pub fn init_shared(self) -> Result<FacilityGuard> {
        let facility = self.build()?;
        crate::install_shared(facility)?;
        Ok(FacilityGuard { _private: () })
    }
}

/// Guard that shuts the shared facility down when dropped.
/// Hold this guard for the lifetime of your logging session.
pub struct FacilityGuard {
    _private: (),
}

impl Drop for FacilityGuard {
    fn drop(&mut self) {
        crate::shared().shutdown();
    }
}
