//! The `tracing-subscriber` stack behind [`ApiLogger`](crate::ApiLogger).
//!
//! Each logger owns its own [`Dispatch`]: a registry with one reloadable `fmt` layer. Changing
//! the output or the format swaps that layer in place, so reconfiguration is safe while other
//! threads are logging. Events are dispatched with [`tracing::dispatcher::with_default`] and
//! never touch the global subscriber.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    io::{self, Write},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use parking_lot::RwLock;
use serde_json::{Map, Value as Json};
use time::format_description::well_known::Rfc3339;
use tracing::Dispatch;
use tracing_subscriber::{
    Layer, Registry,
    fmt::{
        MakeWriter,
        time::UtcTime,
        writer::{BoxMakeWriter, MakeWriterExt},
    },
    layer::SubscriberExt,
    reload,
};

use crate::level::Level;

/// Field map of one entry. Keys are unique, iteration is sorted by key.
pub type FieldMap = BTreeMap<Cow<'static, str>, Value>;

/// Value of one entry field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    /// Rendered as whole nanoseconds.
    Duration(Duration),
    /// Placeholder rendered as the empty string.
    Empty,
}

impl Value {
    fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            Value::Duration(d) => Some(duration_nanos(*d)),
            Value::Str(_) | Value::Empty => None,
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Value::Str(s) => Json::String(s.clone()),
            Value::Int(i) => Json::from(*i),
            Value::Uint(u) => Json::from(*u),
            Value::Duration(d) => Json::from(duration_nanos(*d)),
            Value::Empty => Json::String(String::new()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Duration(d) => write!(f, "{}", duration_nanos(*d)),
            Value::Empty => Ok(()),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Uint(u64::from(v))
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// One log line before it is handed to the subscriber.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) level: Level,
    pub(crate) message: String,
    pub(crate) fields: FieldMap,
}

impl Entry {
    pub(crate) fn new(level: Level, message: impl Into<String>, fields: FieldMap) -> Self {
        Entry {
            level,
            message: message.into(),
            fields,
        }
    }
}

/// Shared, clonable log destination.
///
/// Anything implementing [`MakeWriter`] can back an output; [`Output::new`] takes a plain
/// [`Write`] and serializes writes through a mutex so lines from concurrent requests never
/// interleave.
#[derive(Clone)]
pub struct Output(Arc<BoxMakeWriter>);

impl Output {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Output::from_make_writer(std::sync::Mutex::new(writer))
    }

    pub fn from_make_writer<M>(make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Output(Arc::new(BoxMakeWriter::new(make_writer)))
    }

    pub fn stdout() -> Self {
        Output::from_make_writer(io::stdout)
    }

    pub fn stderr() -> Self {
        Output::from_make_writer(io::stderr)
    }

    /// Duplicates every line to each of `outputs`, in order.
    pub fn multi<I: IntoIterator<Item = Output>>(outputs: I) -> Self {
        let mut outputs = outputs.into_iter();
        match outputs.next() {
            Some(first) => outputs.fold(first, |merged, next| {
                Output::from_make_writer(merged.and(next))
            }),
            None => Output::from_make_writer(io::sink),
        }
    }

    /// True when both handles write to the same destination.
    pub fn same(&self, other: &Output) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn flush(&self) -> io::Result<()> {
        MakeWriter::make_writer(&*self.0).flush()
    }
}

impl<'a> MakeWriter<'a> for Output {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MakeWriter::make_writer(&*self.0)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

/// Line layout of a logger: JSON objects or the `fmt` text layout, with or without an RFC 3339
/// timestamp.
///
/// JSON lines carry `level`, `message` and every field at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatter {
    json: bool,
    timestamp: bool,
}

impl Formatter {
    pub fn json() -> Self {
        Formatter {
            json: true,
            timestamp: true,
        }
    }

    pub fn text() -> Self {
        Formatter {
            json: false,
            timestamp: true,
        }
    }

    pub fn without_timestamp(mut self) -> Self {
        self.timestamp = false;
        self
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn layer(self, output: Output) -> FmtLayer {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(output)
            .with_ansi(false)
            .with_target(false)
            .with_level(true);

        match (self.json, self.timestamp) {
            (true, true) => layer
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_timer(UtcTime::new(Rfc3339))
                .boxed(),
            (true, false) => layer
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .without_time()
                .boxed(),
            (false, true) => layer.with_timer(UtcTime::new(Rfc3339)).boxed(),
            (false, false) => layer.without_time().boxed(),
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::text()
    }
}

type FmtLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub(crate) struct Engine {
    level: AtomicU8,
    dispatch: Dispatch,
    layer: reload::Handle<FmtLayer, Registry>,
    current: RwLock<(Output, Formatter)>,
}

impl Engine {
    pub(crate) fn new(level: Level, output: Output, formatter: Formatter) -> Self {
        let (layer, handle) = reload::Layer::new(formatter.layer(output.clone()));
        Engine {
            level: AtomicU8::new(level as u8),
            dispatch: Dispatch::new(Registry::default().with(layer)),
            layer: handle,
            current: RwLock::new((output, formatter)),
        }
    }

    pub(crate) fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub(crate) fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub(crate) fn enabled(&self, level: Level) -> bool {
        level <= self.level()
    }

    pub(crate) fn output(&self) -> Output {
        self.current.read().0.clone()
    }

    pub(crate) fn set_output(&self, output: Output) {
        let mut current = self.current.write();
        self.reload(output.clone(), current.1);
        current.0 = output;
    }

    pub(crate) fn formatter(&self) -> Formatter {
        self.current.read().1
    }

    pub(crate) fn set_formatter(&self, formatter: Formatter) {
        let mut current = self.current.write();
        self.reload(current.0.clone(), formatter);
        current.1 = formatter;
    }

    fn reload(&self, output: Output, formatter: Formatter) {
        if let Err(err) = self.layer.reload(formatter.layer(output)) {
            eprintln!("Failed to reconfigure log output, {err}");
        }
    }

    /// Writes `entry` if its level passes the threshold.
    pub(crate) fn log(&self, entry: &Entry) {
        if !self.enabled(entry.level) {
            return;
        }
        let event = EventFields::new(entry);
        tracing::dispatcher::with_default(&self.dispatch, || event.dispatch(entry.level));
    }

    pub(crate) fn flush(&self) {
        if let Err(err) = self.output().flush() {
            eprintln!("Failed to flush log output, {err}");
        }
    }
}

/// Entry fields laid out for a `tracing` event.
///
/// Event field names are fixed at compile time, so the access-log catalog and the traceback
/// fields get their own slots and any other key ends up in `kv` as a JSON object.
struct EventFields<'a> {
    message: &'a str,
    id: Option<String>,
    remote_ip: Option<String>,
    host: Option<String>,
    method: Option<String>,
    uri: Option<String>,
    user_agent: Option<String>,
    bytes_in: Option<String>,
    status: Option<u64>,
    error: Option<String>,
    latency: Option<u64>,
    latency_human: Option<String>,
    bytes_out: Option<String>,
    file: Option<String>,
    line: Option<u64>,
    func: Option<String>,
    kv: Option<String>,
}

const TEXT_KEYS: [&str; 12] = [
    "id",
    "remote_ip",
    "host",
    "method",
    "uri",
    "user_agent",
    "bytes_in",
    "error",
    "latency_human",
    "bytes_out",
    "file",
    "func",
];
const NUMERIC_KEYS: [&str; 3] = ["status", "latency", "line"];

impl<'a> EventFields<'a> {
    fn new(entry: &'a Entry) -> Self {
        let fields = &entry.fields;
        let text = |key: &str| fields.get(key).map(Value::to_string);
        let number = |key: &str| fields.get(key).and_then(Value::as_u64);

        let extra: Map<String, Json> = fields
            .iter()
            .filter(|(key, _)| {
                let key: &str = key;
                !TEXT_KEYS.contains(&key) && !NUMERIC_KEYS.contains(&key)
            })
            .map(|(key, value)| (key.to_string(), value.to_json()))
            .collect();

        EventFields {
            message: &entry.message,
            id: text("id"),
            remote_ip: text("remote_ip"),
            host: text("host"),
            method: text("method"),
            uri: text("uri"),
            user_agent: text("user_agent"),
            bytes_in: text("bytes_in"),
            status: number("status"),
            error: text("error"),
            latency: number("latency"),
            latency_human: text("latency_human"),
            bytes_out: text("bytes_out"),
            file: text("file"),
            line: number("line"),
            func: text("func"),
            kv: (!extra.is_empty()).then(|| Json::Object(extra).to_string()),
        }
    }

    fn dispatch(&self, level: Level) {
        macro_rules! event_at {
            ($e:ident, $level:expr) => {
                tracing::event!(
                    $level,
                    id = $e.id.as_deref(),
                    remote_ip = $e.remote_ip.as_deref(),
                    host = $e.host.as_deref(),
                    method = $e.method.as_deref(),
                    uri = $e.uri.as_deref(),
                    user_agent = $e.user_agent.as_deref(),
                    bytes_in = $e.bytes_in.as_deref(),
                    status = $e.status,
                    error = $e.error.as_deref(),
                    latency = $e.latency,
                    latency_human = $e.latency_human.as_deref(),
                    bytes_out = $e.bytes_out.as_deref(),
                    file = $e.file.as_deref(),
                    line = $e.line,
                    func = $e.func.as_deref(),
                    kv = $e.kv.as_deref(),
                    "{}",
                    $e.message
                )
            };
        }

        let e = self;
        // tracing has no tiers above ERROR
        match level {
            Level::Panic | Level::Fatal | Level::Error => event_at!(e, tracing::Level::ERROR),
            Level::Warn => event_at!(e, tracing::Level::WARN),
            Level::Info => event_at!(e, tracing::Level::INFO),
            Level::Debug => event_at!(e, tracing::Level::DEBUG),
            Level::Trace => event_at!(e, tracing::Level::TRACE),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    pub(crate) struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl TestWriter {
        pub(crate) fn get_output(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock()).into_owned()
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.get_output().lines().map(str::to_string).collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn entry(level: Level, fields: FieldMap) -> Entry {
        Entry::new(level, "hello world", fields)
    }

    fn json_engine(writer: &TestWriter, level: Level) -> Engine {
        Engine::new(
            level,
            Output::new(writer.clone()),
            Formatter::json().without_timestamp(),
        )
    }

    #[test]
    fn test_json_event() {
        let writer = TestWriter::default();
        let engine = json_engine(&writer, Level::Info);

        let mut fields = FieldMap::new();
        fields.insert("status".into(), Value::from(200u16));
        fields.insert("latency".into(), Value::from(Duration::from_millis(5)));
        fields.insert("error".into(), Value::Empty);
        engine.log(&entry(Level::Warn, fields));

        let json: Json = serde_json::from_str(&writer.lines()[0]).unwrap();
        assert_eq!(json["level"], "WARN");
        assert_eq!(json["message"], "hello world");
        assert_eq!(json["status"], 200);
        assert_eq!(json["latency"], 5_000_000);
        assert_eq!(json["error"], "");
        assert!(json.get("host").is_none());
        assert!(json.get("timestamp").is_none());
        assert!(json.get("kv").is_none());
    }

    #[test]
    fn test_json_timestamp() {
        let writer = TestWriter::default();
        let engine = Engine::new(Level::Info, Output::new(writer.clone()), Formatter::json());
        engine.log(&entry(Level::Info, FieldMap::new()));

        let json: Json = serde_json::from_str(&writer.lines()[0]).unwrap();
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_unknown_keys_go_to_kv() {
        let writer = TestWriter::default();
        let engine = json_engine(&writer, Level::Info);

        let mut fields = FieldMap::new();
        fields.insert("user".into(), Value::from("alice"));
        fields.insert("attempt".into(), Value::Int(3));
        fields.insert("method".into(), Value::from("GET"));
        engine.log(&entry(Level::Info, fields));

        let json: Json = serde_json::from_str(&writer.lines()[0]).unwrap();
        assert_eq!(json["method"], "GET");
        let kv: Json = serde_json::from_str(json["kv"].as_str().unwrap()).unwrap();
        assert_eq!(kv, serde_json::json!({"user": "alice", "attempt": 3}));
    }

    #[test]
    fn test_text_event() {
        let writer = TestWriter::default();
        let engine = Engine::new(
            Level::Info,
            Output::new(writer.clone()),
            Formatter::text().without_timestamp(),
        );
        let mut fields = FieldMap::new();
        fields.insert("method".into(), Value::from("GET"));
        engine.log(&entry(Level::Info, fields));

        let line = writer.get_output();
        assert!(line.contains("INFO"));
        assert!(line.contains("hello world"));
        assert!(line.contains("method"));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn test_engine_threshold() {
        let writer = TestWriter::default();
        let engine = json_engine(&writer, Level::Warn);

        engine.log(&entry(Level::Info, FieldMap::new()));
        engine.log(&entry(Level::Debug, FieldMap::new()));
        assert!(writer.get_output().is_empty());

        engine.log(&entry(Level::Warn, FieldMap::new()));
        engine.log(&entry(Level::Fatal, FieldMap::new()));
        assert_eq!(writer.lines().len(), 2);

        engine.set_level(Level::Trace);
        assert_eq!(engine.level(), Level::Trace);
        engine.log(&entry(Level::Debug, FieldMap::new()));
        assert_eq!(writer.lines().len(), 3);
    }

    #[test]
    fn test_multi_output() {
        let first = TestWriter::default();
        let second = TestWriter::default();
        let engine = json_engine(&first, Level::Info);
        engine.set_output(Output::multi([
            Output::new(first.clone()),
            Output::new(second.clone()),
        ]));
        engine.log(&entry(Level::Error, FieldMap::new()));

        assert_eq!(first.lines().len(), 1);
        assert_eq!(first.get_output(), second.get_output());
    }

    #[test]
    fn test_output_identity() {
        let out = Output::stderr();
        assert!(out.same(&out.clone()));
        assert!(!out.same(&Output::stderr()));
    }

    #[test]
    fn test_engine_swaps_formatter() {
        let writer = TestWriter::default();
        let engine = Engine::new(
            Level::Info,
            Output::new(writer.clone()),
            Formatter::text().without_timestamp(),
        );
        engine.set_formatter(Formatter::json().without_timestamp());
        assert!(engine.formatter().is_json());
        engine.log(&entry(Level::Info, FieldMap::new()));
        assert!(writer.get_output().starts_with('{'));
    }
}
