//! Routes records from the `log` facade (and so from actix-web itself) into an [`ApiLogger`].

use std::borrow::Cow;

use log::{
    LevelFilter, Metadata, Record,
    kv::{self, Key, VisitSource},
};

use crate::{
    ApiLogger, Result,
    engine::{Entry, FieldMap, Value},
    level::Level,
};

impl ApiLogger {
    /// Installs a clone of this handle as the process-wide `log` backend.
    ///
    /// The `log` max level is opened fully; filtering follows this handle's threshold, so later
    /// [`set_level`](ApiLogger::set_level) calls take effect for `log` macros too.
    ///
    /// # Errors
    /// When another `log` backend is already installed.
    pub fn try_init(&self) -> Result<()> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(LevelFilter::Trace);
        Ok(())
    }

    /// Same as [`try_init`](ApiLogger::try_init).
    ///
    /// # Panics
    /// When another `log` backend is already installed.
    pub fn init(&self) {
        self.try_init()
            .expect("ApiLogger::init should not be called after logger initialization");
    }
}

impl log::Log for ApiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        ApiLogger::enabled(self, Level::from(metadata.level()))
    }

    fn log(&self, record: &Record) {
        let level = Level::from(record.level());
        if !ApiLogger::enabled(self, level) {
            return;
        }

        let mut fields = FieldMap::new();
        let _ = record.key_values().visit(&mut Collect(&mut fields));

        if self.traceback() {
            if let Some(file) = record.file() {
                fields.insert("file".into(), Value::from(file));
            }
            if let Some(line) = record.line() {
                fields.insert("line".into(), Value::Uint(u64::from(line)));
            }
            if let Some(module) = record.module_path() {
                fields.insert("func".into(), Value::from(module));
            }
        }

        self.log_entry(&Entry::new(level, record.args().to_string(), fields));
    }

    fn flush(&self) {
        self.flush_output();
    }
}

struct Collect<'a>(&'a mut FieldMap);

impl<'kvs> VisitSource<'kvs> for Collect<'_> {
    fn visit_pair(
        &mut self,
        key: Key<'kvs>,
        value: kv::Value<'kvs>,
    ) -> std::result::Result<(), kv::Error> {
        let value = if let Some(i) = value.to_i64() {
            Value::Int(i)
        } else if let Some(u) = value.to_u64() {
            Value::Uint(u)
        } else {
            Value::Str(value.to_string())
        };
        self.0.insert(Cow::Owned(key.as_str().to_string()), value);
        Ok(())
    }
}
