use crate::config::LogConfig;
use crate::write_byte::{ByteWriter, WriteByte};
use core::fmt::{self, Write};
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoggingInitError {
    #[error("a logger is already installed")]
    AlreadyInitialized,
}

/// Target for progress lines a boot-time test runner matches on.
///
/// Records logged under it are written without the scope: `[INFO] Done`.
pub const MILESTONE: &str = "milestone";

/// `log` backend writing `[LEVEL] (target): message` lines to a byte sink.
pub struct KernelLogger {
    sink: &'static (dyn WriteByte + Sync),
    max_level: LevelFilter,
}

static LOGGER: SyncOnceCell<KernelLogger> = SyncOnceCell::new();

impl KernelLogger {
    #[must_use]
    pub const fn new(sink: &'static (dyn WriteByte + Sync), max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    /// Installs the process-wide logger. Call this once during early init.
    ///
    /// # Errors
    /// [`LoggingInitError::AlreadyInitialized`] if a logger is already installed.
    pub fn init(
        sink: &'static (dyn WriteByte + Sync),
        config: LogConfig,
    ) -> Result<&'static Self, LoggingInitError> {
        let logger = LOGGER
            .set(Self::new(sink, config.level))
            .map_err(|_| LoggingInitError::AlreadyInitialized)?;
        log::set_logger(logger).map_err(|_| LoggingInitError::AlreadyInitialized)?;
        log::set_max_level(config.level);
        Ok(logger)
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }
}

/// Formats one log line.
///
/// # Errors
/// Propagates errors of `out`.
pub fn format_record(out: &mut impl Write, record: &Record<'_>) -> fmt::Result {
    if record.target() == MILESTONE {
        return writeln!(out, "[{}] {}", record.level(), record.args());
    }

    writeln!(
        out,
        "[{}] ({}): {}",
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = format_record(&mut ByteWriter::new(self.sink), record);
    }

    fn flush(&self) {}
}

impl fmt::Debug for KernelLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelLogger")
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_byte::testing::Capture;
    use log::Level;

    #[test]
    fn line_format() {
        let mut out = String::new();
        format_record(
            &mut out,
            &Record::builder()
                .level(Level::Warn)
                .target("pmm")
                .args(format_args!("{} frames left", 3))
                .build(),
        )
        .unwrap();
        assert_eq!(out, "[WARN] (pmm): 3 frames left\n");
    }

    #[test]
    fn milestones_carry_no_scope() {
        let mut out = String::new();
        for message in ["Init PMM", "Done"] {
            format_record(
                &mut out,
                &Record::builder()
                    .level(Level::Info)
                    .target(MILESTONE)
                    .args(format_args!("{message}"))
                    .build(),
            )
            .unwrap();
        }
        assert_eq!(out, "[INFO] Init PMM\n[INFO] Done\n");
    }

    #[test]
    fn filters_by_level() {
        static SINK: Capture = Capture::new();
        let logger = KernelLogger::new(&SINK, LevelFilter::Info);

        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("vmm")
                .args(format_args!("hidden"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .target("vmm")
                .args(format_args!("shown"))
                .build(),
        );
        assert_eq!(SINK.text(), "[ERROR] (vmm): shown\n");
    }

    /// The only test that touches the global logger.
    #[test]
    fn installs_once() {
        static SINK: Capture = Capture::new();

        let logger = KernelLogger::init(&SINK, LogConfig::new(LevelFilter::Debug)).unwrap();
        assert_eq!(logger.max_level(), LevelFilter::Debug);

        log::debug!(target: "init", "Init serial");
        log::trace!(target: "init", "not shown");
        assert_eq!(SINK.text(), "[DEBUG] (init): Init serial\n");

        assert_eq!(
            KernelLogger::init(&SINK, LogConfig::default()).unwrap_err(),
            LoggingInitError::AlreadyInitialized
        );
    }
}
