//! Request instrumentation.
//!
//! # Data Flow
//! ```text
//! request
//!     → track_requests (axum middleware, normalizes method + MatchedPath)
//!     → RequestInstrumentation::on_request (counters, active users)
//!     → [order submission only] buffer body, record pizza totals, reattach body
//!     → next handler
//!     → response body sent or dropped
//!     → RequestObservation completed → 3-4 fire-and-forget pushes
//! ```
//!
//! # Design Decisions
//! - Counters are bumped before the handler runs: they count requests received
//! - Completion is tied to a drop guard, so errors, panics, timeouts and client
//!   aborts all produce exactly one set of completion pushes
//! - The middleware never rejects or alters a request; bad order bodies are
//!   only logged, and a body it gives up on is replayed to the handler as read
//! - Unmatched requests share one route key to keep cardinality bounded

use axum::{
    body::{Body, Bytes},
    extract::{MatchedPath, Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use futures_util::{stream, Stream, StreamExt};
use http_body::{Body as HttpBody, Frame, SizeHint};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::telemetry::emitter::MetricEmitter;
use crate::telemetry::registry::{MetricRegistry, RouteKey};
use crate::telemetry::series::{self, MetricReading};

/// Route key used for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Why an order body contributed nothing to the pizza totals.
#[derive(Debug, Error)]
pub enum OrderBodyError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("body has no items array")]
    MissingItems,

    #[error("body larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read body: {0}")]
    Read(String),
}

/// Item count and revenue extracted from one order body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSummary {
    pub item_count: u64,
    pub revenue: f64,
}

/// Sum the `items[].price` fields of an order body.
///
/// Missing, non-numeric or negative prices count as zero.
pub fn summarize_order(body: &[u8]) -> Result<OrderSummary, OrderBodyError> {
    let value: Value = serde_json::from_slice(body)?;
    let items = value
        .get("items")
        .and_then(Value::as_array)
        .ok_or(OrderBodyError::MissingItems)?;

    let revenue = items
        .iter()
        .filter_map(|item| item.get("price").and_then(Value::as_f64))
        .filter(|price| price.is_finite() && *price > 0.0)
        .sum();

    Ok(OrderSummary {
        item_count: items.len() as u64,
        revenue,
    })
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// The `(method, route)` whose requests carry an order to count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEndpoint {
    pub method: Method,
    pub route: String,
}

impl OrderEndpoint {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
        }
    }

    fn matches(&self, method: &str, route: &str) -> bool {
        self.method.as_str() == method && self.route == route
    }
}

/// Instrumentation hook the routing layer calls with a normalized
/// `(method, route pattern)` pair.
#[derive(Debug)]
pub struct RequestInstrumentation {
    registry: Arc<MetricRegistry>,
    emitter: MetricEmitter,
    order_endpoint: OrderEndpoint,
    max_body_bytes: usize,
}

impl RequestInstrumentation {
    pub fn new(
        registry: Arc<MetricRegistry>,
        emitter: MetricEmitter,
        order_endpoint: OrderEndpoint,
    ) -> Self {
        Self {
            registry,
            emitter,
            order_endpoint,
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Largest order body that will be buffered for counting.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Record a received request. The returned observation fires the
    /// completion pushes when completed or dropped.
    pub fn on_request(
        self: &Arc<Self>,
        method: &str,
        route: &str,
        bearer: Option<&str>,
    ) -> RequestObservation {
        let start = Instant::now();

        if let Some(token) = bearer {
            self.registry.record_user(token);
        }
        self.registry.increment_route(method, route);
        self.registry.increment_method(method);

        RequestObservation {
            instrumentation: Arc::clone(self),
            key: RouteKey::new(method, route),
            is_order: self.order_endpoint.matches(method, route),
            start,
            done: false,
        }
    }

    /// Count an order body. Never fails; problems are logged.
    pub fn on_order_body(&self, body: &[u8]) {
        match summarize_order(body) {
            Ok(order) => {
                self.registry.record_pizza_order(order.item_count, order.revenue);
                tracing::info!(
                    items = order.item_count,
                    revenue = order.revenue,
                    "Pizza order detected"
                );
            }
            Err(e) => self.skip_order(&e),
        }
    }

    fn skip_order(&self, error: &OrderBodyError) {
        tracing::info!(error = %error, "Order body not counted");
    }

    /// Buffer the body of an order submission, count it and hand back an
    /// equivalent request.
    ///
    /// A body over the limit, or one that fails mid-read, is not counted. The
    /// handler still receives every byte read so far followed by the rest of
    /// the original stream (or its error), so it answers exactly as it would
    /// without instrumentation.
    async fn observe_order(&self, request: Request) -> Request {
        let declared_too_large = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .is_some_and(|len| len > self.max_body_bytes);
        if declared_too_large {
            self.skip_order(&OrderBodyError::TooLarge {
                limit: self.max_body_bytes,
            });
            return request;
        }

        let (parts, payload) = request.into_parts();
        let mut rest = payload.into_data_stream();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut buffered = 0usize;

        while let Some(chunk) = rest.next().await {
            match chunk {
                Ok(chunk) => {
                    buffered += chunk.len();
                    chunks.push(chunk);
                    if buffered > self.max_body_bytes {
                        self.skip_order(&OrderBodyError::TooLarge {
                            limit: self.max_body_bytes,
                        });
                        let body = Body::from_stream(replay(chunks).chain(rest));
                        return Request::from_parts(parts, body);
                    }
                }
                Err(e) => {
                    self.skip_order(&OrderBodyError::Read(e.to_string()));
                    let body = Body::from_stream(replay(chunks).chain(stream::iter([Err(e)])));
                    return Request::from_parts(parts, body);
                }
            }
        }

        let bytes = Bytes::from(chunks.concat());
        self.on_order_body(&bytes);
        Request::from_parts(parts, Body::from(bytes))
    }

    fn finish(&self, key: &RouteKey, is_order: bool, start: Instant) {
        let latency_ms = latency_ms(start.elapsed());

        // Fire and forget: outcomes are logged by the transport.
        let _ = self.emitter.emit(
            &MetricReading::counter(series::HTTP_REQUESTS_TOTAL, self.registry.route_count(key))
                .with_attribute("http.method", key.method.clone())
                .with_attribute("http.route", key.route.clone()),
        );
        let _ = self.emitter.emit(
            &MetricReading::counter(
                series::method_requests_total(&key.method),
                self.registry.method_count(&key.method),
            )
            .with_attribute("http.method", key.method.clone()),
        );
        let _ = self.emitter.emit(&MetricReading::gauge(
            series::HTTP_REQUEST_LATENCY_MS,
            latency_ms,
            series::UNIT_MILLIS,
        ));
        if is_order {
            let _ = self.emitter.emit(&MetricReading::gauge(
                series::PIZZA_ORDER_LATENCY_MS,
                latency_ms,
                series::UNIT_MILLIS,
            ));
        }
    }
}

/// Chunks already pulled off a body, ready to be put back in front of it.
fn replay(chunks: Vec<Bytes>) -> impl Stream<Item = Result<Bytes, axum::Error>> + Send {
    stream::iter(chunks.into_iter().map(Ok))
}

/// Elapsed time in whole milliseconds, rounded to nearest.
fn latency_ms(elapsed: Duration) -> i64 {
    (elapsed.as_secs_f64() * 1000.0).round() as i64
}

/// One in-progress request. Completion pushes fire exactly once, either on
/// [`complete`](Self::complete) or when dropped.
#[derive(Debug)]
pub struct RequestObservation {
    instrumentation: Arc<RequestInstrumentation>,
    key: RouteKey,
    is_order: bool,
    start: Instant,
    done: bool,
}

impl RequestObservation {
    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn is_order(&self) -> bool {
        self.is_order
    }

    pub fn complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        self.instrumentation.finish(&self.key, self.is_order, self.start);
    }
}

impl Drop for RequestObservation {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Response body that completes its request's observation once the last
/// frame has been sent, the body errors, or the body is dropped unfinished.
struct ObservedBody {
    inner: Body,
    observation: Option<RequestObservation>,
}

impl ObservedBody {
    fn new(inner: Body, observation: RequestObservation) -> Self {
        Self {
            inner,
            observation: Some(observation),
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let frame = Pin::new(&mut self.inner).poll_frame(cx);
        if matches!(frame, Poll::Ready(None | Some(Err(_)))) {
            if let Some(observation) = self.observation.take() {
                observation.complete();
            }
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Axum middleware recording every request that passes through it.
pub async fn track_requests(
    State(instrumentation): State<Arc<RequestInstrumentation>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let observation = instrumentation.on_request(&method, &route, bearer_token(request.headers()));

    let request = if observation.is_order() {
        instrumentation.observe_order(request).await
    } else {
        request
    };

    let (parts, body) = next.run(request).await.into_parts();
    Response::from_parts(parts, Body::new(ObservedBody::new(body, observation)))
}
