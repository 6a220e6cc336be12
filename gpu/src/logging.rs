//! Injectable diagnostic logger.
//!
//! Every [`GpuDevice`](crate::GpuDevice) owns a [`DeviceLogger`]. By default it
//! forwards to the process-wide [`log`] facade, so installing `env_logger` (or
//! any other `log` implementation) is enough. Applications that want device
//! diagnostics routed elsewhere pass their own [`log::Log`] sink through
//! [`DeviceParameters::with_logger`](crate::DeviceParameters::with_logger).
//!
//! Logging is a side channel only: nothing in this crate branches on whether
//! a message was recorded.

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Record};

/// Target used for records emitted by this crate.
pub const LOG_TARGET: &str = "redlilium_gpu";

/// Logger handle owned by a device and shared with its driver.
#[derive(Clone, Default)]
pub struct DeviceLogger {
    sink: Option<Arc<dyn Log>>,
}

impl DeviceLogger {
    /// A logger that forwards to the global `log` facade.
    pub fn global() -> Self {
        Self { sink: None }
    }

    /// A logger that forwards to the given sink instead of the global facade.
    pub fn with_sink(sink: Arc<dyn Log>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Whether records are routed to a custom sink.
    pub fn has_custom_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Emit a record at the given level.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .level(level)
            .target(LOG_TARGET)
            .args(args)
            .build();

        match &self.sink {
            Some(sink) => {
                if sink.enabled(record.metadata()) {
                    sink.log(&record);
                }
            }
            None => {
                if level <= log::max_level() {
                    log::logger().log(&record);
                }
            }
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl fmt::Debug for DeviceLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLogger")
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(DeviceLogger: Send, Sync);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that keeps every record for inspection.
    #[derive(Default)]
    pub(crate) struct CapturingSink {
        pub records: Mutex<Vec<(Level, String)>>,
    }

    impl Log for CapturingSink {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            self.records
                .lock()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_custom_sink_receives_records() {
        let sink = Arc::new(CapturingSink::default());
        let logger = DeviceLogger::with_sink(sink.clone());
        assert!(logger.has_custom_sink());

        logger.warn(format_args!("validation layer missing"));
        logger.info(format_args!("adapter {}", 3));

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (Level::Warn, "validation layer missing".into()));
        assert_eq!(records[1], (Level::Info, "adapter 3".into()));
    }

    #[test]
    fn test_global_logger_does_not_panic_without_backend() {
        let logger = DeviceLogger::global();
        assert!(!logger.has_custom_sink());
        logger.error(format_args!("nobody is listening"));
    }
}
