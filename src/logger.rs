use std::{
    collections::HashSet,
    future::Future,
    marker::PhantomData,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use bytes::Bytes;
use futures_core::ready;
use log::LevelFilter;
use pin_project_lite::pin_project;
use regex::Regex;

use actix_http::header::{CONTENT_LENGTH, USER_AGENT};
use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::HttpMessage;
use actix_web::body::{BodySize, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{Error, Result};

use crate::{
    ApiLogger,
    config::EventConfig,
    engine::{FieldMap, Value},
    fields::{Field, Fields, REQUEST_FIELDS, RESPONSE_FIELDS},
    request_id::{RequestId, X_REQUEST_ID},
};

/// Middleware logging one event before and one event after the wrapped handler.
///
/// Both events go through the [`ApiLogger`] handed to the constructor. Each event carries the
/// fields its [`EventConfig`] selects. Both events are leveled by the *request* configuration's
/// `level`, so `LevelFilter::Off` there disables the middleware entirely.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_apilog::{AccessLogger, ApiLogger, EventConfig, Fields};
///
/// let logger = ApiLogger::new();
///
/// let app = App::new().wrap(AccessLogger::new(logger.clone()));
///
/// let custom = AccessLogger::with_config(
///     logger,
///     EventConfig::request().fields(Fields::only(["method", "uri"])),
///     EventConfig::response(),
/// )
/// .exclude("/health");
/// ```
pub struct AccessLogger(Rc<Inner>);

#[derive(Debug, Clone)]
struct Inner {
    logger: ApiLogger,
    request: EventConfig,
    response: EventConfig,
    exclude: HashSet<String>,
    exclude_regex: Vec<Regex>,
}

impl AccessLogger {
    /// Create `AccessLogger` middleware with the default request and response events.
    pub fn new(logger: ApiLogger) -> AccessLogger {
        AccessLogger::with_config(logger, EventConfig::request(), EventConfig::response())
    }

    /// Create `AccessLogger` middleware with custom request and response events.
    pub fn with_config(
        logger: ApiLogger,
        request: EventConfig,
        response: EventConfig,
    ) -> AccessLogger {
        AccessLogger(Rc::new(Inner {
            logger,
            request,
            response,
            exclude: HashSet::new(),
            exclude_regex: Vec::new(),
        }))
    }

    /// Ignore and do not log access info for specified path.
    pub fn exclude<T: Into<String>>(mut self, path: T) -> Self {
        Rc::make_mut(&mut self.0).exclude.insert(path.into());
        self
    }

    /// Ignore and do not log access info for paths that match regex.
    ///
    /// # Panics
    /// When `pattern` is not a valid regex. See [`try_exclude_regex`](Self::try_exclude_regex).
    pub fn exclude_regex<T: AsRef<str>>(self, pattern: T) -> Self {
        let pattern = pattern.as_ref();
        match self.try_exclude_regex(pattern) {
            Ok(logger) => logger,
            Err(err) => panic!("invalid exclude pattern {pattern:?}: {err}"),
        }
    }

    /// Ignore and do not log access info for paths that match regex.
    pub fn try_exclude_regex<T: AsRef<str>>(mut self, pattern: T) -> crate::Result<Self> {
        let regex = Regex::new(pattern.as_ref())?;
        Rc::make_mut(&mut self.0).exclude_regex.push(regex);
        Ok(self)
    }
}

impl Inner {
    fn is_excluded(&self, path: &str) -> bool {
        self.exclude.contains(path) || self.exclude_regex.iter().any(|r| r.is_match(path))
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Transform = AccessLoggerService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessLoggerService {
            service,
            inner: Rc::clone(&self.0),
        }))
    }
}

/// Response event waiting for the handler result and the body size.
struct PendingEvent {
    inner: Rc<Inner>,
    fields: FieldMap,
    start: Instant,
}

impl PendingEvent {
    fn selection(&self) -> impl Iterator<Item = Field> + '_ {
        RESPONSE_FIELDS
            .into_iter()
            .filter(|field| self.inner.response.fields.includes_field(*field))
    }

    fn complete(&mut self, status: u16, error: Option<String>, latency: Duration) {
        let rendered: Vec<_> = self
            .selection()
            .filter_map(|field| {
                field
                    .render_response(status, error.as_deref(), latency)
                    .map(|value| (field, value))
            })
            .collect();
        for (field, value) in rendered {
            self.fields.insert(field.name().into(), value);
        }
    }

    fn emit(mut self, size: u64) {
        let rendered: Vec<_> = self
            .selection()
            .filter_map(|field| field.render(size).map(|value| (field, value)))
            .collect();
        for (field, value) in rendered {
            self.fields.insert(field.name().into(), value);
        }

        let inner = &self.inner;
        inner
            .logger
            .log_event(inner.request.level, &inner.response.message, self.fields);
    }
}

pin_project! {
    pub struct StreamLog<B> {
        #[pin]
        body: B,
        pending: Option<PendingEvent>,
        size: usize,
    }

    impl<B> PinnedDrop for StreamLog<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(pending) = this.pending.take() {
                pending.emit(*this.size as u64);
            }
        }
    }
}

impl<B: MessageBody> MessageBody for StreamLog<B> {
    type Error = B::Error;

    #[inline]
    fn size(&self) -> BodySize {
        self.body.size()
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.project();

        match ready!(this.body.poll_next(cx)) {
            Some(Ok(chunk)) => {
                *this.size += chunk.len();
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}

/// Logger middleware service.
pub struct AccessLoggerService<S> {
    inner: Rc<Inner>,
    service: S,
}

impl<S, B> Service<ServiceRequest> for AccessLoggerService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    type Response = ServiceResponse<StreamLog<B>>;
    type Error = Error;
    type Future = AccessLoggerResponse<S, B>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inner = &self.inner;
        if inner.request.level == LevelFilter::Off || inner.is_excluded(req.path()) {
            return AccessLoggerResponse {
                fut: self.service.call(req),
                pending: None,
                _phantom: PhantomData,
            };
        }

        let snapshot = RequestSnapshot::capture(&req);
        let request_fields = snapshot.fields(&inner.request.fields);
        let response_fields = snapshot.fields(&inner.response.fields);

        inner
            .logger
            .log_event(inner.request.level, &inner.request.message, request_fields);

        let start = Instant::now();
        AccessLoggerResponse {
            fut: self.service.call(req),
            pending: Some(PendingEvent {
                inner: Rc::clone(inner),
                fields: response_fields,
                start,
            }),
            _phantom: PhantomData,
        }
    }
}

pin_project! {
    pub struct AccessLoggerResponse<S, B>
    where
        B: MessageBody,
        S: Service<ServiceRequest>,
    {
        #[pin]
        fut: S::Future,
        pending: Option<PendingEvent>,
        _phantom: PhantomData<B>,
    }

    impl<S, B> PinnedDrop for AccessLoggerResponse<S, B>
    where
        B: MessageBody,
        S: Service<ServiceRequest>,
    {
        fn drop(this: Pin<&mut Self>) {
            // dropped before the handler finished: the client went away or a timeout fired
            let this = this.project();
            if let Some(mut pending) = this.pending.take() {
                let latency = pending.start.elapsed();
                pending.complete(CANCELLED_STATUS, Some(CANCELLED_ERROR.to_string()), latency);
                pending.emit(0);
            }
        }
    }
}

/// Status logged for a request whose handler future was dropped before completing.
const CANCELLED_STATUS: u16 = 499;
const CANCELLED_ERROR: &str = "request cancelled before the handler completed";

impl<S, B> Future for AccessLoggerResponse<S, B>
where
    B: MessageBody,
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Output = Result<ServiceResponse<StreamLog<B>>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let result = ready!(this.fut.poll(cx));
        let stop = Instant::now();

        let Some(mut pending) = this.pending.take() else {
            return Poll::Ready(result.map(|res| {
                res.map_body(|_, body| StreamLog {
                    body,
                    pending: None,
                    size: 0,
                })
            }));
        };
        let latency = stop.duration_since(pending.start);

        match result {
            Ok(res) => {
                let error = res.response().error().map(|err| {
                    log::debug!("Error in response: {:?}", err);
                    err.to_string()
                });
                pending.complete(res.status().as_u16(), error, latency);

                Poll::Ready(Ok(res.map_body(move |_, body| StreamLog {
                    body,
                    pending: Some(pending),
                    size: 0,
                })))
            }
            Err(err) => {
                // the response the host renders for this error decides status and size
                let res = err.error_response();
                let size = match res.body().size() {
                    BodySize::Sized(size) => size,
                    _ => 0,
                };
                pending.complete(res.status().as_u16(), Some(err.to_string()), latency);
                pending.emit(size);

                Poll::Ready(Err(err))
            }
        }
    }
}

/// Request attributes shared by both events, read once before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestSnapshot {
    id: String,
    remote_ip: String,
    host: String,
    method: String,
    uri: String,
    user_agent: String,
    bytes_in: String,
}

impl RequestSnapshot {
    fn capture(req: &ServiceRequest) -> Self {
        let info = req.connection_info();
        RequestSnapshot {
            id: correlation_id(req),
            remote_ip: info.realip_remote_addr().unwrap_or_default().to_string(),
            host: info.host().to_string(),
            method: req.method().to_string(),
            uri: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.path().to_string()),
            user_agent: header_str(req, USER_AGENT).to_string(),
            bytes_in: header_str(req, CONTENT_LENGTH)
                .trim()
                .parse::<u64>()
                .unwrap_or(0)
                .to_string(),
        }
    }

    fn fields(&self, selection: &Fields) -> FieldMap {
        REQUEST_FIELDS
            .into_iter()
            .filter(|field| selection.includes_field(*field))
            .filter_map(|field| {
                field
                    .render_request(self)
                    .map(|value| (field.name().into(), value))
            })
            .collect()
    }
}

fn header_str(req: &ServiceRequest, name: actix_http::header::HeaderName) -> &str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Inbound `x-request-id`, else an id generated upstream, else empty.
fn correlation_id(req: &ServiceRequest) -> String {
    let inbound = header_str(req, X_REQUEST_ID);
    if !inbound.is_empty() {
        return inbound.to_string();
    }

    let ext = req.extensions();
    if let Some(id) = ext.get::<RequestId>() {
        return id.to_string();
    }
    #[cfg(feature = "tracing-request-id")]
    if let Some(id) = ext.get::<tracing_actix_web::RequestId>() {
        return id.to_string();
    }

    String::new()
}

impl Field {
    fn render_request(&self, snapshot: &RequestSnapshot) -> Option<Value> {
        let value = match self {
            Field::Id => &snapshot.id,
            Field::RemoteIp => &snapshot.remote_ip,
            Field::Host => &snapshot.host,
            Field::Method => &snapshot.method,
            Field::Uri => &snapshot.uri,
            Field::UserAgent => &snapshot.user_agent,
            Field::BytesIn => &snapshot.bytes_in,
            _ => return None,
        };
        Some(Value::Str(value.clone()))
    }

    fn render_response(&self, status: u16, error: Option<&str>, latency: Duration) -> Option<Value> {
        match self {
            Field::Status => Some(Value::from(status)),
            Field::Error => Some(error.map_or(Value::Empty, Value::from)),
            Field::Latency => Some(Value::Duration(latency)),
            Field::LatencyHuman => Some(Value::Str(human_duration(latency))),
            _ => None,
        }
    }

    fn render(&self, size: u64) -> Option<Value> {
        match self {
            Field::BytesOut => Some(Value::Str(size.to_string())),
            _ => None,
        }
    }
}

/// Compact duration rendering: `0s`, `850ns`, `12.5µs`, `5.2ms`, `1.5s`, `2m3.5s`, `1h0m0s`.
pub(crate) fn human_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    let seconds = u128::from(seconds) * 1_000_000_000 + u128::from(d.subsec_nanos());
    out.push_str(&format!("{}s", decimal(seconds, 1_000_000_000)));
    out
}

fn decimal(value: u128, unit: u128) -> String {
    let (whole, frac) = (value / unit, value % unit);
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let frac = format!("{frac:0width$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
