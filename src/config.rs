use std::borrow::Cow;

use log::LevelFilter;
use serde::Deserialize;

use crate::fields::{Fields, REQUEST_FIELDS, RESPONSE_FIELDS};

/// Message of the default request event.
pub const DEFAULT_REQUEST_MESSAGE: &str = "REQUEST";
/// Message of the default response event.
pub const DEFAULT_RESPONSE_MESSAGE: &str = "RESPONSE";

/// Controls one access-log event: which fields it carries, its level and its message.
///
/// Only the request configuration's `level` is consulted by [`AccessLogger`]; it levels both the
/// request and the response event. `LevelFilter::Off` silences both, `LevelFilter::Trace` is
/// emitted at `Info`.
///
/// # Examples
/// ```rust
/// use actix_web_middleware_apilog::{EventConfig, Fields};
/// use log::LevelFilter;
///
/// let request = EventConfig::request()
///     .fields(Fields::builder().with_method().with_uri().build())
///     .level(LevelFilter::Debug);
/// assert!(request.fields.includes("uri"));
/// assert!(!request.fields.includes("host"));
/// ```
///
/// [`AccessLogger`]: crate::AccessLogger
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub fields: Fields,
    #[serde(
        default = "default_level",
        deserialize_with = "crate::level::deserialize_lenient"
    )]
    pub level: LevelFilter,
    pub message: Cow<'static, str>,
}

fn default_level() -> LevelFilter {
    LevelFilter::Info
}

impl EventConfig {
    pub fn new(fields: Fields, level: LevelFilter, message: impl Into<Cow<'static, str>>) -> Self {
        EventConfig {
            fields,
            level,
            message: message.into(),
        }
    }

    /// Request event defaults: every request field, `Info`, `"REQUEST"`.
    pub fn request() -> Self {
        EventConfig::new(
            Fields::from(&REQUEST_FIELDS[..]),
            LevelFilter::Info,
            DEFAULT_REQUEST_MESSAGE,
        )
    }

    /// Response event defaults: every response field, `Info`, `"RESPONSE"`.
    pub fn response() -> Self {
        EventConfig::new(
            Fields::from(&RESPONSE_FIELDS[..]),
            LevelFilter::Info,
            DEFAULT_RESPONSE_MESSAGE,
        )
    }

    pub fn fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    #[test]
    fn test_defaults() {
        let req = EventConfig::request();
        assert_eq!(req.level, LevelFilter::Info);
        assert_eq!(req.message, "REQUEST");
        assert_eq!(req.fields.names().map(<[_]>::len), Some(7));
        assert!(!req.fields.includes_field(Field::Status));

        let res = EventConfig::response();
        assert_eq!(res.level, LevelFilter::Info);
        assert_eq!(res.message, "RESPONSE");
        for field in RESPONSE_FIELDS {
            assert!(res.fields.includes_field(field));
        }
    }

    #[test]
    fn test_deserialize() {
        let config: EventConfig = serde_json::from_str(
            r#"{"fields": ["method", "uri"], "level": "warn", "message": "IN"}"#,
        )
        .unwrap();
        assert_eq!(config.fields, Fields::only(["method", "uri"]));
        assert_eq!(config.level, LevelFilter::Warn);
        assert_eq!(config.message, "IN");
    }

    #[test]
    fn test_deserialize_lenient_level_and_unset_fields() {
        let config: EventConfig =
            serde_json::from_str(r#"{"level": "shout", "message": "OUT"}"#).unwrap();
        assert_eq!(config.fields, Fields::all());
        assert_eq!(config.level, LevelFilter::Info);

        let config: EventConfig = serde_json::from_str(r#"{"message": "OUT"}"#).unwrap();
        assert_eq!(config.level, LevelFilter::Info);
    }
}
