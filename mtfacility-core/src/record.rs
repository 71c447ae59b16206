use std::{backtrace::Backtrace, fmt};

use chrono::{DateTime, Utc};

use crate::{Level, TAG_INTERNAL};

/// One entry of a captured callstack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub symbol: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{} ({file}:{line})", self.symbol),
            (Some(file), None) => write!(f, "{} ({file})", self.symbol),
            _ => f.write_str(&self.symbol),
        }
    }
}

/// Captures the callstack of the current thread, innermost frame first.
///
/// Frames belonging to the capture machinery itself are dropped. Returns an
/// empty vector when the platform cannot unwind.
#[inline(never)]
pub fn capture_callstack() -> Vec<Frame> {
    let mut frames = parse_backtrace(&Backtrace::force_capture().to_string());
    if let Some(position) = frames
        .iter()
        .rposition(|frame| frame.symbol.contains("capture_callstack"))
    {
        frames.drain(..=position);
    }
    frames
}

// Parses the human readable rendering of `std::backtrace::Backtrace`:
//    3: some::symbol
//              at ./src/file.rs:12:5
fn parse_backtrace(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in text.lines() {
        let line = line.trim_start();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut()
                && frame.file.is_none()
            {
                let (file, line) = split_location(location);
                frame.file = Some(file.to_string());
                frame.line = line;
            }
        } else if let Some((index, symbol)) = line.split_once(": ")
            && !index.is_empty()
            && index.bytes().all(|b| b.is_ascii_digit())
        {
            frames.push(Frame {
                symbol: symbol.trim().to_string(),
                file: None,
                line: None,
            });
        }
    }
    frames
}

fn split_location(location: &str) -> (&str, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let (Some(column), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
        return (location, None);
    };
    match (column.parse::<u32>(), line.parse::<u32>()) {
        (Ok(_), Ok(line)) => (file, Some(line)),
        _ => (location, None),
    }
}

/// An immutable log record produced at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: Level,
    tag: Option<String>,
    message: String,
    callstack: Option<Vec<Frame>>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    pub fn new(level: Level, tag: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            tag: tag.map(String::from),
            message: message.into(),
            callstack: None,
        }
    }

    pub fn with_callstack(self, callstack: Vec<Frame>) -> Self {
        Self {
            callstack: Some(callstack),
            ..self
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn callstack(&self) -> Option<&[Frame]> {
        self.callstack.as_deref()
    }

    /// True for records emitted by the facility itself.
    pub fn is_internal(&self) -> bool {
        self.tag() == Some(TAG_INTERNAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_std_backtrace_rendering() {
        let text = "   0: first::symbol\n             at ./src/lib.rs:12:5\n   1: second::symbol\n   2: <unknown>\n";
        let frames = parse_backtrace(text);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].symbol, "first::symbol");
        assert_eq!(frames[0].file.as_deref(), Some("./src/lib.rs"));
        assert_eq!(frames[0].line, Some(12));
        assert_eq!(frames[1].file, None);
        assert_eq!(frames[2].to_string(), "<unknown>");
        assert_eq!(frames[0].to_string(), "first::symbol (./src/lib.rs:12)");
    }

    #[test]
    fn callstack_names_the_caller() {
        let frames = capture_callstack();
        assert!(!frames.is_empty());
        assert!(
            frames
                .iter()
                .all(|frame| !frame.symbol.contains("capture_callstack"))
        );
        assert!(
            frames
                .iter()
                .any(|frame| frame.symbol.contains("callstack_names_the_caller"))
        );
    }

    #[test]
    fn internal_tag_is_detected() {
        let record = LogRecord::new(Level::Info, Some(TAG_INTERNAL), "hello");
        assert!(record.is_internal());
        assert!(record.callstack().is_none());
        let record = LogRecord::new(Level::Info, Some("network"), "hello")
            .with_callstack(vec![]);
        assert!(!record.is_internal());
        assert_eq!(record.callstack(), Some(&[][..]));
    }
}
