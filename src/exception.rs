//! Exceptions as log input.
//!
//! Two producers feed the facility bound to the process-wide hook:
//! panics, seen by a panic hook chained in front of the previous one, and
//! [`Exception`] values, which can be logged the moment they are built.

use std::{
    error::Error,
    fmt,
    panic::{self, PanicHookInfo},
    sync::{Arc, Mutex, PoisonError, TryLockError, Weak},
    thread,
};

use mtfacility_core::{
    Frame, TAG_INITIALIZED_EXCEPTIONS, TAG_UNCAUGHT_EXCEPTIONS, capture_callstack,
    is_delivery_thread, panic_message,
};
use uuid::Uuid;

use crate::facility::Inner;

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

struct HookState {
    target: Option<(Uuid, Weak<Inner>)>,
    previous: Option<Arc<PanicHook>>,
}

static HOOK: Mutex<HookState> = Mutex::new(HookState {
    target: None,
    previous: None,
});

impl HookState {
    fn target(&self) -> Option<Arc<Inner>> {
        self.target.as_ref().and_then(|(_, inner)| inner.upgrade())
    }
}

fn target() -> Option<Arc<Inner>> {
    HOOK.lock().unwrap_or_else(PoisonError::into_inner).target()
}

/// Routes the hook to `inner`, installing the panic hook on first use.
pub(crate) fn bind(inner: &Arc<Inner>) {
    let mut state = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    state.target = Some((inner.id, Arc::downgrade(inner)));
    if state.previous.is_none() && !thread::panicking() {
        let previous: Arc<PanicHook> = Arc::from(panic::take_hook());
        state.previous = Some(Arc::clone(&previous));
        panic::set_hook(Box::new(move |info| {
            on_panic(info);
            previous(info);
        }));
    }
}

/// Releases the hook if it is routed to the facility `id`, restoring the
/// panic hook that was installed before.
pub(crate) fn unbind(id: Uuid) {
    let mut state = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    if !matches!(&state.target, Some((bound, _)) if *bound == id) {
        return;
    }
    state.target = None;
    // set_hook panics while panicking; the chained hook then just forwards.
    if !thread::panicking()
        && let Some(previous) = state.previous.take()
    {
        drop(panic::take_hook());
        panic::set_hook(Box::new(move |info| previous(info)));
    }
}

fn on_panic(info: &PanicHookInfo<'_>) {
    // Delivery threads contain their panics and report them as handling
    // failures. Flushing from one would wait on the other delivery threads.
    if is_delivery_thread() {
        return;
    }
    // bind/unbind hold the state while swapping the std hook; blocking here could deadlock.
    let inner = match HOOK.try_lock() {
        Ok(state) => state.target(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().target(),
        Err(TryLockError::WouldBlock) => None,
    };
    let Some(inner) = inner else {
        return;
    };
    if inner.logs_uncaught_exceptions() {
        inner.log_exception(&Exception::from_panic(info), Some(TAG_UNCAUGHT_EXCEPTIONS));
        // The process may be about to exit.
        inner.flush();
    }
}

/// An exception captured as plain data: a message and the callstack at the
/// point of construction.
///
/// Any [`std::error::Error`] converts into an `Exception`, so `?` builds one.
/// While the bound facility logs initialized exceptions, each construction is
/// logged at once, whether the exception is later handled or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    message: String,
    callstack: Vec<Frame>,
}

impl Exception {
    pub fn new(message: impl Into<String>) -> Self {
        let exception = Self {
            message: message.into(),
            callstack: capture_callstack(),
        };
        if let Some(inner) = target()
            && inner.logs_initialized_exceptions()
        {
            inner.log_exception(&exception, Some(TAG_INITIALIZED_EXCEPTIONS));
        }
        exception
    }

    /// Builds an exception from an error and its chain of sources.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(message)
    }

    fn from_panic(info: &PanicHookInfo<'_>) -> Self {
        let payload = panic_message(info.payload());
        let message = match info.location() {
            Some(location) => format!(
                "panicked at {}:{}: {payload}",
                location.file(),
                location.line()
            ),
            None => format!("panicked: {payload}"),
        };
        Self {
            message,
            callstack: capture_callstack(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Innermost frame first.
    pub fn callstack(&self) -> &[Frame] {
        &self.callstack
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: Error + 'static> From<E> for Exception {
    fn from(error: E) -> Self {
        Self::from_error(&error)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("loading settings")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    fn parse(text: &str) -> Result<u32, Exception> {
        Ok(text.parse::<u32>()?)
    }

    #[test]
    fn error_chain_becomes_the_message() {
        let exception = Exception::from(Wrapped(io::Error::other("file missing")));
        assert_eq!(exception.message(), "loading settings: file missing");
        assert_eq!(exception.to_string(), exception.message());
    }

    #[test]
    fn question_mark_builds_an_exception() {
        assert_eq!(parse("12").unwrap(), 12);
        let exception = parse("twelve").unwrap_err();
        assert_eq!(exception.message(), "invalid digit found in string");
        assert!(!exception.callstack().is_empty());
    }
}
