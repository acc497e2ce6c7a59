use log::info;

pub const DEFAULT_INTERVAL: u64 = 1_000_000;

/// Counts records and logs every `interval` records with a description of the current one.
#[derive(Debug)]
pub struct ProgressLogger {
    message: &'static str,
    interval: u64,
    count: u64,
}

impl ProgressLogger {
    pub fn new(message: &'static str) -> ProgressLogger {
        ProgressLogger { message, interval: DEFAULT_INTERVAL, count: 0 }
    }

    pub fn with_interval(mut self, interval: u64) -> ProgressLogger {
        self.interval = interval.max(1);
        self
    }

    /// Count one record. `describe` is only called when a progress line is due.
    ///
    /// Returns true when a line was logged.
    pub fn record<F: FnOnce() -> String>(&mut self, describe: F) -> bool {
        self.count += 1;
        if self.count % self.interval == 0 {
            let at = describe();
            info!("{} {} records, at {}", self.message, self.count, at);
            true
        } else {
            false
        }
    }

    pub fn finish(&self) {
        info!("{} {} records (complete)", self.message, self.count);
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
