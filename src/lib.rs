//! Actix-web middleware for field-selectable request/response logs, plus the leveled logger
//! that writes them.
//!
//! Every request produces two events: one before the handler runs (`REQUEST`) and one after
//! (`RESPONSE`). Which fields each event carries is chosen per event from a fixed catalog.
//!
//! # Examples:
//! ## Default configuration
//! ```bash
//! cargo add actix-web-middleware-apilog
//! ```
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_apilog::{AccessLogger, ApiLogger, Formatter, Output};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let logger = ApiLogger::new()
//!         .with_output(Output::stdout())
//!         .with_formatter(Formatter::json());
//!     // actix-web's own `log` records go through the same logger
//!     logger.init();
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(AccessLogger::new(logger.clone()))
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?;
//!     Ok(())
//! }
//! ```
//! ## Request IDs
//! `RequestIdGenerator` assigns an id to requests that arrive without `X-Request-Id`, so both
//! events share a correlation id. Register it after (outside) `AccessLogger`:
//! ```rust
//! use actix_web::App;
//! use actix_web_middleware_apilog::{AccessLogger, ApiLogger, RequestIdGenerator};
//!
//! let app = App::new()
//!     .wrap(AccessLogger::new(ApiLogger::new()))
//!     .wrap(RequestIdGenerator::default());
//! ```
//! With the `tracing-request-id` feature the id set by `tracing_actix_web::TracingLogger` is
//! picked up as well.
//!
//! # Configuration
//!
//! ## Custom Fields
//!
//! ```rust
//! use actix_web_middleware_apilog::{AccessLogger, ApiLogger, EventConfig, Fields};
//! use log::LevelFilter;
//!
//! let logger = AccessLogger::with_config(
//!     ApiLogger::new(),
//!     EventConfig::request()
//!         .fields(Fields::builder().with_method().with_uri().build())
//!         .level(LevelFilter::Debug),
//!     EventConfig::response().fields(Fields::all()),
//! );
//! ```
//! The request configuration's level applies to *both* events; the response configuration's level
//! is not consulted. `LevelFilter::Off` turns the middleware off.
//!
//! ## Path Exclusions
//!
//! ```rust
//! use actix_web_middleware_apilog::{AccessLogger, ApiLogger};
//!
//! let logger = AccessLogger::new(ApiLogger::new())
//!     .exclude("/health")
//!     .exclude_regex(r"^/assets/.*");
//! ```
//!
//! # Available Fields
//!
//! Request event (default: all of them):
//! - `id` - correlation id from `X-Request-Id` or an upstream generator, empty otherwise
//! - `remote_ip` - client address, honouring `Forwarded` / `X-Forwarded-For`
//! - `host` - request host
//! - `method` - HTTP method
//! - `uri` - path and query string
//! - `user_agent` - `User-Agent` header
//! - `bytes_in` - `Content-Length`, `"0"` when missing
//!
//! Response event (default: all of the above plus):
//! - `status` - response status code
//! - `error` - handler error, empty when there was none
//! - `latency` - handler duration in nanoseconds
//! - `latency_human` - handler duration, e.g. `5.2ms`
//! - `bytes_out` - bytes written to the response body
//!
//! # Traceback
//!
//! [`ApiLogger::enable_traceback`] adds `file`, `line` and `func` of the call site to entries
//! written through the logger's methods and macros.
//!
//! # Feature Flags
//!
//! - `tracing-request-id` - Read the request id set by `tracing-actix-web`
//! - `uuid_v7` - Use UUIDv7 instead of UUIDv4 for generated request IDs

mod bridge;
mod config;
mod engine;
mod error;
mod facade;
mod fields;
mod level;
mod logger;
mod macros;
mod request_id;
mod trace;

pub use crate::config::{DEFAULT_REQUEST_MESSAGE, DEFAULT_RESPONSE_MESSAGE, EventConfig};
pub use crate::engine::{FieldMap, Formatter, Output, Value};
pub use crate::error::{Error, Result};
pub use crate::facade::ApiLogger;
pub use crate::fields::{Field, Fields, FieldsBuilder, REQUEST_FIELDS, RESPONSE_FIELDS, included};
pub use crate::level::{Level, to_host, to_internal};
pub use crate::logger::{AccessLogger, AccessLoggerResponse, AccessLoggerService, StreamLog};
pub use crate::request_id::{
    RequestId, RequestIdGenerator, RequestIdResponse, RequestIdService, X_REQUEST_ID,
};
pub use crate::trace::CallSite;

#[doc(hidden)]
pub mod __private {
    pub use crate::trace::enclosing_function;
}
