use std::fmt;

use log::LevelFilter;
use serde::{Deserialize, Deserializer};

/// Severity used by the logging engine.
///
/// Ordered by verbosity: `Panic` is the most severe, `Trace` the most verbose. An entry at
/// level `l` is written when `l <= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Logged, then the calling thread panics.
    Panic = 0,
    /// Logged, then the process exits with status 1.
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Trace = 6,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Panic => "panic",
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }

    pub(crate) fn from_u8(v: u8) -> Level {
        match v {
            0 => Level::Panic,
            1 => Level::Fatal,
            2 => Level::Error,
            3 => Level::Warn,
            5 => Level::Debug,
            6 => Level::Trace,
            _ => Level::Info,
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
            log::Level::Error => Level::Error,
            log::Level::Warn => Level::Warn,
            log::Level::Info => Level::Info,
            log::Level::Debug => Level::Debug,
            log::Level::Trace => Level::Trace,
        }
    }
}

/// Maps a host (`log` facade) level onto the engine.
///
/// Anything outside `Debug`, `Info`, `Warn` and `Error` becomes [`Level::Info`].
pub fn to_internal(level: LevelFilter) -> Level {
    match level {
        LevelFilter::Debug => Level::Debug,
        LevelFilter::Info => Level::Info,
        LevelFilter::Warn => Level::Warn,
        LevelFilter::Error => Level::Error,
        _ => Level::Info,
    }
}

/// Maps an engine level back onto the host enumeration.
///
/// Levels the host has no counterpart for (`Panic`, `Fatal`, `Trace`) become
/// [`LevelFilter::Off`].
pub fn to_host(level: Level) -> LevelFilter {
    match level {
        Level::Debug => LevelFilter::Debug,
        Level::Info => LevelFilter::Info,
        Level::Warn => LevelFilter::Warn,
        Level::Error => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

/// Parses a level name, falling back to `Info` for names the host does not know.
pub(crate) fn parse_lenient(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

/// Serde helper for configuration levels: unrecognized names degrade to `Info`.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(parse_lenient(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: [LevelFilter; 4] = [
        LevelFilter::Debug,
        LevelFilter::Info,
        LevelFilter::Warn,
        LevelFilter::Error,
    ];

    #[test]
    fn test_known_levels_round_trip() {
        for host in KNOWN {
            let internal = to_internal(host);
            assert_eq!(to_host(internal), host);
            assert_eq!(to_internal(to_host(internal)), internal);
        }
    }

    #[test]
    fn test_unknown_host_levels_map_to_info() {
        assert_eq!(to_internal(LevelFilter::Off), Level::Info);
        assert_eq!(to_internal(LevelFilter::Trace), Level::Info);
    }

    #[test]
    fn test_unknown_internal_levels_map_to_off() {
        for level in [Level::Panic, Level::Fatal, Level::Trace] {
            assert_eq!(to_host(level), LevelFilter::Off);
        }
    }

    #[test]
    fn test_u8_encoding() {
        for level in [
            Level::Panic,
            Level::Fatal,
            Level::Error,
            Level::Warn,
            Level::Info,
            Level::Debug,
            Level::Trace,
        ] {
            assert_eq!(Level::from_u8(level as u8), level);
        }
        assert_eq!(Level::from_u8(42), Level::Info);
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_lenient("warn"), LevelFilter::Warn);
        assert_eq!(parse_lenient("OFF"), LevelFilter::Off);
        assert_eq!(parse_lenient("loud"), LevelFilter::Info);
    }

    #[test]
    fn test_from_log_level() {
        assert_eq!(Level::from(log::Level::Warn), Level::Warn);
        assert_eq!(Level::from(log::Level::Trace), Level::Trace);
    }
}
