use std::fmt;

/// One of the two standard streams the facility can capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    Stdout,
    Stderr,
}

impl fmt::Display for StdStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdStream::Stdout => f.write_str("stdout"),
            StdStream::Stderr => f.write_str("stderr"),
        }
    }
}

pub type Result<T> = std::result::Result<T, FacilityError>;

#[derive(Debug, thiserror::Error)]
pub enum FacilityError {
    #[error("logger is already attached")]
    AlreadyAttached,

    #[error("logger is not attached")]
    NotAttached,

    #[error("failed to open logger: {source}")]
    Open {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start logger thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to toggle {stream} capture: {source}")]
    Capture {
        stream: StdStream,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to install log bridge: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("shared facility is already initialized")]
    AlreadyInitialized,
}
