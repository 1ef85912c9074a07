use std::io::{self, Write};
use std::sync::Arc;

use actix_web_middleware_apilog::{ApiLogger, Formatter, Output};
use parking_lot::Mutex;
use serde_json::Value;

/// In-memory log destination.
#[derive(Clone, Default)]
pub struct TestWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl TestWriter {
    pub fn entries(&self) -> Vec<Value> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
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

/// JSON logger without timestamps writing to a fresh [`TestWriter`].
pub fn json_logger() -> (ApiLogger, TestWriter) {
    let writer = TestWriter::default();
    let logger = ApiLogger::new()
        .with_output(Output::new(writer.clone()))
        .with_formatter(Formatter::json().without_timestamp());
    (logger, writer)
}

/// Field keys of an entry, without `level` and `message`.
#[allow(dead_code)]
pub fn field_keys(entry: &Value) -> Vec<String> {
    let mut keys: Vec<String> = entry
        .as_object()
        .unwrap()
        .keys()
        .filter(|k| *k != "level" && *k != "message")
        .cloned()
        .collect();
    keys.sort();
    keys
}
