//! Log configuration from the kernel command line.
//!
//! The command line is a whitespace-separated list of arguments; this module
//! only looks at `log=<level>`, where `<level>` is one of `off`, `error`,
//! `warn`, `info`, `debug` or `trace` (any case). The last occurrence wins.

use log::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LogConfigError {
    #[error("invalid log level in command line")]
    InvalidLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LevelFilter,
}

impl LogConfig {
    pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

    #[must_use]
    pub const fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Reads `log=<level>` from `cmdline`.
    ///
    /// # Errors
    /// [`LogConfigError::InvalidLevel`] if a `log=` value is not a level name.
    pub fn from_command_line(cmdline: &str) -> Result<Self, LogConfigError> {
        let mut config = Self::default();
        for value in cmdline
            .split_ascii_whitespace()
            .filter_map(|arg| arg.strip_prefix("log="))
        {
            config.level = value.parse().map_err(|_| LogConfigError::InvalidLevel)?;
        }
        Ok(config)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_argument() {
        assert_eq!(LogConfig::from_command_line(""), Ok(LogConfig::default()));
        assert_eq!(
            LogConfig::from_command_line("root=/dev/sda quiet").map(|c| c.level),
            Ok(LevelFilter::Info)
        );
    }

    #[test]
    fn parses_levels() {
        let level = |s| LogConfig::from_command_line(s).map(|c| c.level);
        assert_eq!(level("log=debug"), Ok(LevelFilter::Debug));
        assert_eq!(level("quiet log=TRACE"), Ok(LevelFilter::Trace));
        assert_eq!(level("log=off"), Ok(LevelFilter::Off));
        assert_eq!(level("log=warn log=error"), Ok(LevelFilter::Error));
        assert_eq!(level("catalog=debug"), Ok(LevelFilter::Info));
    }

    #[test]
    fn rejects_unknown_level() {
        assert_eq!(
            LogConfig::from_command_line("log=loud"),
            Err(LogConfigError::InvalidLevel)
        );
        assert_eq!(
            LogConfig::from_command_line("log="),
            Err(LogConfigError::InvalidLevel)
        );
    }
}
