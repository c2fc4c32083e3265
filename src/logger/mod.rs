//! Leveled, component-scoped logging.
//!
//! Every component owns a named [`Logger`]. Loggers consult a process-wide
//! verbosity level and sink (the [`Log`] facade) unless an instance-specific
//! sink has been injected with [`Logger::with_sink`]. [`Log::reset`] restores
//! the defaults so tests can run in isolation.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

const DEFAULT_LEVEL: LogLevel = LogLevel::Info;

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LEVEL as u8);
static GLOBAL_SINK: LazyLock<RwLock<Arc<dyn LogSink>>> =
    LazyLock::new(|| RwLock::new(default_sink()));

/// Verbosity levels, from quietest to noisiest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::None,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::None => "NONE",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        };
        f.write_str(label)
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "silent" | "off" => Ok(LogLevel::None),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => {
                write!(f, "Invalid value \"{level}\" assigned to the log level")
            }
        }
    }
}

impl std::error::Error for LogError {}

/// Destination for log records.
///
/// Messages arrive already prefixed with the emitting component's name.
pub trait LogSink: Send + Sync {
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Writes timestamped records to stdout (info/debug) and stderr (warn/error).
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    fn write(level: LogLevel, message: &str) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        match level {
            LogLevel::Warn | LogLevel::Error => eprintln!("[{now}] {level} {message}"),
            _ => println!("[{now}] {level} {message}"),
        }
    }
}

impl LogSink for ConsoleSink {
    fn error(&self, message: &str) {
        Self::write(LogLevel::Error, message);
    }

    fn warn(&self, message: &str) {
        Self::write(LogLevel::Warn, message);
    }

    fn info(&self, message: &str) {
        Self::write(LogLevel::Info, message);
    }

    fn debug(&self, message: &str) {
        Self::write(LogLevel::Debug, message);
    }
}

/// Forwards records to the `log` crate facade under the `oidc_client` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn error(&self, message: &str) {
        log::error!(target: "oidc_client", "{message}");
    }

    fn warn(&self, message: &str) {
        log::warn!(target: "oidc_client", "{message}");
    }

    fn info(&self, message: &str) {
        log::info!(target: "oidc_client", "{message}");
    }

    fn debug(&self, message: &str) {
        log::debug!(target: "oidc_client", "{message}");
    }
}

fn default_sink() -> Arc<dyn LogSink> {
    Arc::new(ConsoleSink)
}

/// Process-wide logging configuration.
pub struct Log;

impl Log {
    pub const NONE: LogLevel = LogLevel::None;
    pub const ERROR: LogLevel = LogLevel::Error;
    pub const WARN: LogLevel = LogLevel::Warn;
    pub const INFO: LogLevel = LogLevel::Info;
    pub const DEBUG: LogLevel = LogLevel::Debug;

    /// Restores the default level and console sink.
    pub fn reset() {
        GLOBAL_LOG_LEVEL.store(DEFAULT_LEVEL as u8, Ordering::SeqCst);
        *GLOBAL_SINK.write().unwrap() = default_sink();
    }

    pub fn level() -> LogLevel {
        LogLevel::from_u8(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst))
    }

    pub fn set_level<L>(level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    pub fn sink() -> Arc<dyn LogSink> {
        GLOBAL_SINK.read().unwrap().clone()
    }

    pub fn set_sink(sink: Arc<dyn LogSink>) {
        *GLOBAL_SINK.write().unwrap() = sink;
    }

    pub fn debug(message: impl AsRef<str>) {
        dispatch(None, LogLevel::Debug, message.as_ref());
    }

    pub fn info(message: impl AsRef<str>) {
        dispatch(None, LogLevel::Info, message.as_ref());
    }

    pub fn warn(message: impl AsRef<str>) {
        dispatch(None, LogLevel::Warn, message.as_ref());
    }

    pub fn error(message: impl AsRef<str>) {
        dispatch(None, LogLevel::Error, message.as_ref());
    }
}

fn dispatch(sink: Option<&Arc<dyn LogSink>>, level: LogLevel, message: &str) {
    if level == LogLevel::None || level > Log::level() {
        return;
    }
    let sink = match sink {
        Some(sink) => sink.clone(),
        None => Log::sink(),
    };
    match level {
        LogLevel::Error => sink.error(message),
        LogLevel::Warn => sink.warn(message),
        LogLevel::Info => sink.info(message),
        LogLevel::Debug => sink.debug(message),
        LogLevel::None => {}
    }
}

/// Named logger handed to each component.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    sink: Option<Arc<dyn LogSink>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            sink: None,
        }
    }

    /// Routes this logger (and its children) to `sink` instead of the global one.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Derives a logger for a sub-component that shares this logger's sink.
    pub fn child(&self, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            sink: self.sink.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(LogLevel::Error, message.as_ref());
    }

    fn emit(&self, level: LogLevel, message: &str) {
        let line = format!("{}: {}", self.name, message);
        dispatch(self.sink.as_ref(), level, &line);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) static TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) records: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for RecordingSink {
        fn error(&self, message: &str) {
            self.records.lock().unwrap().push((LogLevel::Error, message.to_string()));
        }

        fn warn(&self, message: &str) {
            self.records.lock().unwrap().push((LogLevel::Warn, message.to_string()));
        }

        fn info(&self, message: &str) {
            self.records.lock().unwrap().push((LogLevel::Info, message.to_string()));
        }

        fn debug(&self, message: &str) {
            self.records.lock().unwrap().push((LogLevel::Debug, message.to_string()));
        }
    }

    #[test]
    fn global_level_filters_records() {
        let _guard = TEST_GUARD.lock().unwrap();
        Log::reset();
        let sink = Arc::new(RecordingSink::default());
        Log::set_sink(sink.clone());
        Log::set_level("warn").unwrap();

        let logger = Logger::new("OidcClient");
        logger.debug("debug message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");

        let records = sink.records.lock().unwrap().clone();
        let levels: Vec<_> = records.iter().map(|(level, _)| *level).collect();
        assert_eq!(levels, [LogLevel::Warn, LogLevel::Error]);
        assert_eq!(records[0].1, "OidcClient: warn message");
        drop(records);
        Log::reset();
    }

    #[test]
    fn none_level_silences_everything() {
        let _guard = TEST_GUARD.lock().unwrap();
        Log::reset();
        let sink = Arc::new(RecordingSink::default());
        Log::set_sink(sink.clone());
        Log::set_level(Log::NONE).unwrap();

        Log::error("boom");
        Logger::new("UserManager").error("boom");

        assert!(sink.records.lock().unwrap().is_empty());
        Log::reset();
    }

    #[test]
    fn injected_sink_bypasses_global_sink() {
        let _guard = TEST_GUARD.lock().unwrap();
        Log::reset();
        let global = Arc::new(RecordingSink::default());
        let local = Arc::new(RecordingSink::default());
        Log::set_sink(global.clone());
        Log::set_level(Log::DEBUG).unwrap();

        let logger = Logger::new("MetadataService").with_sink(local.clone());
        logger.child("JsonService").debug("fetching");

        assert!(global.records.lock().unwrap().is_empty());
        let records = local.records.lock().unwrap();
        assert_eq!(records.as_slice(), &[(LogLevel::Debug, "JsonService: fetching".to_string())]);
        drop(records);
        Log::reset();
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert!(matches!(
            "loud".into_log_level(),
            Err(LogError::InvalidLogLevel(level)) if level == "loud"
        ));
    }
}
