use std::{
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures_core::ready;
use pin_project_lite::pin_project;
use uuid::Uuid;

use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::HttpMessage;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, Result};

use crate::error::Error as ApiLogError;

/// Header carrying the correlation id in both directions.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation id of a request: the inbound one, or a freshly generated UUID.
///
/// Stored in the request extensions by [`RequestIdGenerator`] and picked up by
/// [`AccessLogger`](crate::AccessLogger).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub(crate) fn new() -> Self {
        #[cfg(not(feature = "uuid_v7"))]
        let id = Uuid::new_v4();
        #[cfg(feature = "uuid_v7")]
        let id = Uuid::now_v7();
        Self(id.as_hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware that makes sure every request has a correlation id.
///
/// An inbound id is kept as is, otherwise a new one is generated. The resolved id is stored in
/// the request extensions as a [`RequestId`] and echoed in the response header. Register it outside
/// [`AccessLogger`](crate::AccessLogger) (i.e. `.wrap()` it after) so the id exists before the
/// request event is logged.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_apilog::{AccessLogger, ApiLogger, RequestIdGenerator};
///
/// let logger = ApiLogger::new();
/// let app = App::new()
///     .wrap(AccessLogger::new(logger))
///     .wrap(RequestIdGenerator::default());
/// ```
#[derive(Clone)]
pub struct RequestIdGenerator(Rc<HeaderName>);

impl RequestIdGenerator {
    /// Uses `header` instead of `x-request-id` for the echoed response header and for
    /// detecting an inbound id.
    pub fn header(header: &str) -> crate::Result<Self> {
        HeaderName::try_from(header)
            .map(|name| RequestIdGenerator(Rc::new(name)))
            .map_err(|_| ApiLogError::InvalidHeader(header.to_string()))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        RequestIdGenerator(Rc::new(X_REQUEST_ID))
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestIdGenerator
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestIdService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdService {
            service,
            header: Rc::clone(&self.0),
        }))
    }
}

pub struct RequestIdService<S> {
    service: S,
    header: Rc<HeaderName>,
}

impl<S, B> Service<ServiceRequest> for RequestIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = RequestIdResponse<S>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inbound = req
            .headers()
            .get(&*self.header)
            .filter(|value| !value.is_empty())
            .and_then(|value| Some((value.to_str().ok()?.to_string(), value.clone())));
        let (id, value) = match inbound {
            Some((id, value)) => (RequestId(id), Some(value)),
            None => {
                let id = RequestId::new();
                let value = HeaderValue::from_str(id.as_str()).ok();
                (id, value)
            }
        };
        req.extensions_mut().insert(id);

        RequestIdResponse {
            fut: self.service.call(req),
            header: Rc::clone(&self.header),
            value,
        }
    }
}

pin_project! {
    pub struct RequestIdResponse<S>
    where
        S: Service<ServiceRequest>,
    {
        #[pin]
        fut: S::Future,
        header: Rc<HeaderName>,
        value: Option<HeaderValue>,
    }
}

impl<S, B> Future for RequestIdResponse<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
{
    type Output = Result<ServiceResponse<B>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let mut res = match ready!(this.fut.poll(cx)) {
            Ok(res) => res,
            Err(err) => return Poll::Ready(Err(err)),
        };

        if let Some(value) = this.value.take() {
            res.headers_mut().insert(HeaderName::clone(this.header), value);
        }

        Poll::Ready(Ok(res))
    }
}
