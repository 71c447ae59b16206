use log::{LevelFilter, Log, Metadata, Record};
use mtfacility_core::{Level, Result};

use crate::Facility;

/// Forwards records of the `log` crate to a facility, tagged with their target.
pub struct LogBridge {
    facility: Facility,
}

impl LogBridge {
    pub fn new(facility: Facility) -> Self {
        Self { facility }
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.facility
            .gate()
            .should_log(Level::from(metadata.level()))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.facility.log(
            record.args().to_string(),
            Some(record.target()),
            Level::from(record.level()),
        );
    }

    fn flush(&self) {
        self.facility.flush();
    }
}

impl Facility {
    /// Installs this facility as the logger of the `log` crate.
    ///
    /// Filtering stays with the facility's gate, so later changes to the
    /// minimum level apply to `log` macros too.
    pub fn install_log_bridge(&self) -> Result<()> {
        log::set_boxed_logger(Box::new(LogBridge::new(self.clone())))?;
        log::set_max_level(LevelFilter::Trace);
        Ok(())
    }
}
