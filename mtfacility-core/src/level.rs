use std::fmt;

/// Severity of a log record, ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Verbose,
    Info,
    Warning,
    Error,
    Exception,
    Abort,
}

impl Level {
    pub const MIN: Level = Level::Debug;
    pub const MAX: Level = Level::Abort;

    pub const ALL: [Level; 7] = [
        Level::Debug,
        Level::Verbose,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Exception,
        Level::Abort,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Returns the level with the given ordinal, if any.
    pub fn from_ordinal(value: i64) -> Option<Level> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Verbose => "VERBOSE",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Exception => "EXCEPTION",
            Level::Abort => "ABORT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Level::Debug,
            log::Level::Debug => Level::Verbose,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warning,
            log::Level::Error => Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_ordinal() {
        for pair in Level::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].ordinal() + 1, pair[1].ordinal());
        }
        assert_eq!(Level::MIN, Level::ALL[0]);
        assert_eq!(Level::MAX, Level::ALL[6]);
    }

    #[test]
    fn from_ordinal_rejects_out_of_range() {
        assert_eq!(Level::from_ordinal(0), Some(Level::Debug));
        assert_eq!(Level::from_ordinal(5), Some(Level::Exception));
        assert_eq!(Level::from_ordinal(7), None);
        assert_eq!(Level::from_ordinal(-1), None);
    }

    #[test]
    fn log_crate_levels_map_in_order() {
        assert_eq!(Level::from(log::Level::Trace), Level::Debug);
        assert_eq!(Level::from(log::Level::Warn), Level::Warning);
        assert_eq!(Level::from(log::Level::Error), Level::Error);
        assert_eq!(Level::Exception.to_string(), "EXCEPTION");
    }
}
