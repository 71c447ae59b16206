use std::{
    fmt::Write as _,
    fs::File,
    io::{self, Write},
    os::fd::{AsFd, OwnedFd},
    sync::{
        Mutex, OnceLock, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use colored::Colorize;

use crate::{Level, LogRecord, Logger, StdStream};

static ORIGINAL_STDOUT: OnceLock<OwnedFd> = OnceLock::new();
static ORIGINAL_STDERR: OnceLock<OwnedFd> = OnceLock::new();

/// Returns a duplicate of the standard stream as it was the first time this
/// was called.
///
/// The facility calls it before redirecting a stream, so the result keeps
/// pointing at the terminal (or file) while the stream itself is captured.
pub fn original_stream(stream: StdStream) -> io::Result<OwnedFd> {
    let slot = match stream {
        StdStream::Stdout => &ORIGINAL_STDOUT,
        StdStream::Stderr => &ORIGINAL_STDERR,
    };
    if let Some(fd) = slot.get() {
        return fd.try_clone();
    }
    let current = match stream {
        StdStream::Stdout => io::stdout().as_fd().try_clone_to_owned()?,
        StdStream::Stderr => io::stderr().as_fd().try_clone_to_owned()?,
    };
    slot.get_or_init(|| current).try_clone()
}

/// Renders a record as `[time tag LEVEL] message`, followed by one indented
/// line per callstack frame.
pub fn format_record(record: &LogRecord) -> String {
    let time = record.timestamp().format("%Y-%m-%dT%H:%M:%S%.3f");
    let level = match record.level() {
        Level::Debug => "DEBUG".blue(),
        Level::Verbose => "VERBOSE".purple(),
        Level::Info => "INFO".green(),
        Level::Warning => "WARNING".yellow(),
        Level::Error => "ERROR".red(),
        Level::Exception => "EXCEPTION".red().bold(),
        Level::Abort => "ABORT".white().on_red(),
    };
    let message = record.message();
    let mut line = if let Some(tag) = record.tag() {
        format!("[{time} {tag} {level}] {message}")
    } else {
        format!("[{time} {level}] {message}")
    };
    for frame in record.callstack().unwrap_or_default() {
        let _ = write!(line, "\n    {frame}");
    }
    line
}

/// Writes formatted records to the standard error of the process.
///
/// Records go to the [`original_stream`], so they keep reaching the terminal
/// while stderr itself is captured, whichever was set up first.
pub struct StderrLogger {
    output: Mutex<File>,
}

impl StderrLogger {
    pub fn new() -> io::Result<Self> {
        let fd = original_stream(StdStream::Stderr)?;
        Ok(Self {
            output: Mutex::new(File::from(fd)),
        })
    }
}

impl Logger for StderrLogger {
    fn handle(&self, record: &LogRecord) -> io::Result<()> {
        let line = format_record(record);
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(output, "{line}")?;
        output.flush()
    }
}

/// Keeps every handled record in memory.
#[derive(Default, Debug)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|record| record.message().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of times the logger was opened.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of times the logger was closed.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Logger for MemoryLogger {
    fn open(&self) -> io::Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn handle(&self, record: &LogRecord) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[test]
fn test_format_record() {
    use crate::Frame;

    let record = LogRecord::new(Level::Warning, Some("network"), "connection reset");
    let line = format_record(&record);
    assert!(line.starts_with('['));
    assert!(line.contains("network"));
    assert!(line.contains("WARNING"));
    assert!(line.ends_with("] connection reset"));

    let record = LogRecord::new(Level::Exception, None, "boom").with_callstack(vec![Frame {
        symbol: "app::main".into(),
        file: Some("src/main.rs".into()),
        line: Some(3),
    }]);
    let line = format_record(&record);
    assert_eq!(line.lines().count(), 2);
    assert!(line.ends_with("\n    app::main (src/main.rs:3)"));
}

#[test]
fn test_memory_logger() {
    let logger = MemoryLogger::new();
    logger.open().unwrap();
    logger
        .handle(&LogRecord::new(Level::Info, None, "Hello, world!"))
        .unwrap();
    logger.close();
    assert_eq!(logger.messages(), vec!["Hello, world!".to_string()]);
    assert_eq!((logger.open_count(), logger.close_count()), (1, 1));
    logger.clear();
    assert!(logger.records().is_empty());
}

#[test]
fn test_original_stream_is_pinned() {
    use std::os::fd::AsRawFd;

    let first = original_stream(StdStream::Stdout).unwrap();
    let second = original_stream(StdStream::Stdout).unwrap();
    assert_ne!(first.as_raw_fd(), second.as_raw_fd());
    assert_ne!(first.as_raw_fd(), io::stdout().as_fd().as_raw_fd());
    File::from(second).flush().unwrap();
}

#[test]
fn test_stderr_logger() {
    let logger = StderrLogger::new().unwrap();
    logger
        .handle(&LogRecord::new(Level::Debug, None, "stderr logger test"))
        .unwrap();
}
