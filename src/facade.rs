use std::{
    fmt,
    panic::Location,
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::LevelFilter;
use serde::Serialize;

use crate::{
    engine::{Engine, Entry, FieldMap, Formatter, Output},
    level::{self, Level},
    trace::{self, CallSite},
};

/// Leveled logger handle.
///
/// Cloning is cheap and every clone shares the same threshold, output, formatter and traceback
/// switch. Construct one at startup and hand clones to [`AccessLogger`](crate::AccessLogger) and
/// to application code; install it as the `log` backend with [`ApiLogger::init`] to also capture
/// actix-web's own logs.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_apilog::{ApiLogger, Formatter, Output};
/// use log::LevelFilter;
///
/// let logger = ApiLogger::new()
///     .with_output(Output::stdout())
///     .with_formatter(Formatter::json());
/// logger.set_level(LevelFilter::Debug);
///
/// logger.info("service started");
/// logger.debugf(format_args!("listening on {}", 8080));
/// logger.warnj(&serde_json::json!({"event": "config", "reloaded": true}));
/// ```
#[derive(Clone)]
pub struct ApiLogger(Arc<Inner>);

struct Inner {
    engine: Engine,
    traceback: AtomicBool,
}

/// Message shapes accepted by the emission methods.
enum Payload<'a> {
    Display(&'a dyn fmt::Display),
    Args(fmt::Arguments<'a>),
    /// Already serialized structured payload.
    Json(String),
}

impl Payload<'_> {
    /// Serializes `value`. Failure means the caller handed over something that is not
    /// representable as JSON, which is a bug at the call site: the thread panics.
    fn json<T: Serialize + ?Sized>(value: &T) -> Payload<'static> {
        match serde_json::to_string(value) {
            Ok(json) => Payload::Json(json),
            Err(err) => panic!("failed to serialize structured log payload: {err}"),
        }
    }

    fn render(self) -> String {
        match self {
            Payload::Display(msg) => msg.to_string(),
            Payload::Args(args) => args.to_string(),
            Payload::Json(json) => json,
        }
    }
}

macro_rules! tier {
    ($level:expr, $name:literal, $plain:ident, $formatted:ident, $structured:ident) => {
        #[doc = concat!("Logs `msg` at ", $name, " level.")]
        #[track_caller]
        pub fn $plain(&self, msg: impl fmt::Display) {
            self.emit($level, Payload::Display(&msg), caller());
        }

        #[doc = concat!("Logs formatted `args` at ", $name, " level.")]
        #[track_caller]
        pub fn $formatted(&self, args: fmt::Arguments<'_>) {
            self.emit($level, Payload::Args(args), caller());
        }

        #[doc = concat!("Logs `payload` serialized as JSON at ", $name, " level.")]
        ///
        /// # Panics
        /// When `payload` cannot be serialized.
        #[track_caller]
        pub fn $structured<T: Serialize + ?Sized>(&self, payload: &T) {
            self.emit($level, Payload::json(payload), caller());
        }
    };
}

#[track_caller]
fn caller() -> CallSite {
    CallSite::from_location(Location::caller())
}

impl ApiLogger {
    /// Logger writing text lines to stderr at `Info`, traceback disabled.
    pub fn new() -> Self {
        ApiLogger(Arc::new(Inner {
            engine: Engine::new(Level::Info, Output::stderr(), Formatter::text()),
            traceback: AtomicBool::new(false),
        }))
    }

    pub fn with_output(self, output: Output) -> Self {
        self.set_output(output);
        self
    }

    pub fn with_formatter(self, formatter: Formatter) -> Self {
        self.set_formatter(formatter);
        self
    }

    pub fn with_level(self, level: LevelFilter) -> Self {
        self.set_level(level);
        self
    }

    /// Current threshold in host terms. Engine-only levels read back as `Off`.
    pub fn level(&self) -> LevelFilter {
        level::to_host(self.0.engine.level())
    }

    /// Sets the threshold. Levels other than `Debug`, `Info`, `Warn` and `Error` set `Info`.
    pub fn set_level(&self, level: LevelFilter) {
        self.0.engine.set_level(level::to_internal(level));
    }

    pub fn internal_level(&self) -> Level {
        self.0.engine.level()
    }

    pub fn set_internal_level(&self, level: Level) {
        self.0.engine.set_level(level);
    }

    pub fn output(&self) -> Output {
        self.0.engine.output()
    }

    pub fn set_output(&self, output: Output) {
        self.0.engine.set_output(output);
    }

    /// Writes every entry to each of `outputs`.
    pub fn set_outputs<I: IntoIterator<Item = Output>>(&self, outputs: I) {
        self.0.engine.set_output(Output::multi(outputs));
    }

    pub fn formatter(&self) -> Formatter {
        self.0.engine.formatter()
    }

    pub fn set_formatter(&self, formatter: Formatter) {
        self.0.engine.set_formatter(formatter);
    }

    /// Always empty; headers are not supported by this backend.
    pub fn header(&self) -> String {
        String::new()
    }

    /// Ignored; headers are not supported by this backend.
    pub fn set_header(&self, _header: &str) {}

    /// Always empty; prefixes are not supported by this backend.
    pub fn prefix(&self) -> String {
        String::new()
    }

    /// Ignored; prefixes are not supported by this backend.
    pub fn set_prefix(&self, _prefix: &str) {}

    /// Adds `file`, `line` and `func` of the call site to every following entry.
    pub fn enable_traceback(&self) {
        self.0.traceback.store(true, Ordering::Relaxed);
    }

    pub fn disable_traceback(&self) {
        self.0.traceback.store(false, Ordering::Relaxed);
    }

    pub fn traceback(&self) -> bool {
        self.0.traceback.load(Ordering::Relaxed)
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.0.engine.enabled(level)
    }

    tier!(Level::Info, "info", print, printf, printj);
    tier!(Level::Debug, "debug", debug, debugf, debugj);
    tier!(Level::Info, "info", info, infof, infoj);
    tier!(Level::Warn, "warn", warn, warnf, warnj);
    tier!(Level::Error, "error", error, errorf, errorj);

    /// Logs `msg` at fatal level and exits the process with status 1.
    #[track_caller]
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        self.emit(Level::Fatal, Payload::Display(&msg), caller());
        self.exit()
    }

    /// Logs formatted `args` at fatal level and exits the process with status 1.
    #[track_caller]
    pub fn fatalf(&self, args: fmt::Arguments<'_>) -> ! {
        self.emit(Level::Fatal, Payload::Args(args), caller());
        self.exit()
    }

    /// Logs `payload` as JSON at fatal level and exits the process with status 1.
    #[track_caller]
    pub fn fatalj<T: Serialize + ?Sized>(&self, payload: &T) -> ! {
        self.emit(Level::Fatal, Payload::json(payload), caller());
        self.exit()
    }

    /// Logs `msg` at panic level, then panics with it.
    #[track_caller]
    pub fn panic(&self, msg: impl fmt::Display) -> ! {
        let msg = msg.to_string();
        self.emit(Level::Panic, Payload::Display(&msg), caller());
        panic!("{msg}")
    }

    /// Logs formatted `args` at panic level, then panics with the message.
    #[track_caller]
    pub fn panicf(&self, args: fmt::Arguments<'_>) -> ! {
        let msg = args.to_string();
        self.emit(Level::Panic, Payload::Display(&msg), caller());
        panic!("{msg}")
    }

    /// Logs `payload` as JSON at panic level, then panics with it.
    #[track_caller]
    pub fn panicj<T: Serialize + ?Sized>(&self, payload: &T) -> ! {
        let msg = Payload::json(payload).render();
        self.emit(Level::Panic, Payload::Display(&msg), caller());
        panic!("{msg}")
    }

    /// Logs `args` at `level` on behalf of `site`. Used by the crate's logging macros.
    pub fn log_at(&self, level: Level, args: fmt::Arguments<'_>, site: CallSite) {
        self.emit(level, Payload::Args(args), site);
    }

    /// Emits an event carrying exactly `fields`, without call-site enrichment.
    ///
    /// `LevelFilter::Off` emits nothing; `Trace` is emitted at `Info`.
    pub fn log_event(&self, level: LevelFilter, message: &str, fields: FieldMap) {
        if level == LevelFilter::Off {
            return;
        }
        self.0
            .engine
            .log(&Entry::new(level::to_internal(level), message, fields));
    }

    pub(crate) fn log_entry(&self, entry: &Entry) {
        self.0.engine.log(entry);
    }

    pub(crate) fn flush_output(&self) {
        self.0.engine.flush();
    }

    fn emit(&self, level: Level, payload: Payload<'_>, site: CallSite) {
        if !self.0.engine.enabled(level) {
            return;
        }
        let fields = trace::capture_if_enabled(self.traceback(), site);
        self.0.engine.log(&Entry::new(level, payload.render(), fields));
    }

    fn exit(&self) -> ! {
        self.flush_output();
        process::exit(1)
    }
}

impl Default for ApiLogger {
    fn default() -> Self {
        ApiLogger::new()
    }
}

impl fmt::Debug for ApiLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiLogger")
            .field("level", &self.internal_level())
            .field("traceback", &self.traceback())
            .finish_non_exhaustive()
    }
}
