//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, panics, timeout, body limit,
//!   instrumentation)
//! - Bind server to listener and shut down gracefully

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServiceConfig;
use crate::http::handlers::{self, DOCS_ROUTE, MENU_ROUTE, ORDER_ROUTE};
use crate::telemetry::middleware::{track_requests, RequestInstrumentation};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
}

/// HTTP server for the pizza service.
pub struct HttpServer {
    router: Router,
    config: Arc<ServiceConfig>,
}

impl HttpServer {
    /// Create a new HTTP server. Every request passes through `instrumentation`.
    pub fn new(config: ServiceConfig, instrumentation: Arc<RequestInstrumentation>) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
        };
        let router = Self::build_router(&config, state, instrumentation);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(
        config: &ServiceConfig,
        state: AppState,
        instrumentation: Arc<RequestInstrumentation>,
    ) -> Router {
        Router::new()
            .route("/", get(handlers::welcome))
            .route(DOCS_ROUTE, get(handlers::docs))
            .route(MENU_ROUTE, get(handlers::get_menu))
            .route(ORDER_ROUTE, post(handlers::create_order))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.http.max_body_bytes))
            .layer(middleware::from_fn_with_state(instrumentation, track_requests))
            .layer(TimeoutLayer::new(Duration::from_secs(config.http.request_timeout_secs)))
            .layer(CatchPanicLayer::new())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for driving the service without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::encoder::Encoder;
    use crate::telemetry::middleware::{OrderEndpoint, UNMATCHED_ROUTE};
    use crate::telemetry::registry::{MetricRegistry, RouteKey};
    use crate::telemetry::series;
    use crate::telemetry::transport::MemoryTransport;
    use crate::telemetry::MetricEmitter;
    use axum::body::{self, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn server() -> (HttpServer, Arc<MetricRegistry>, Arc<MemoryTransport>) {
        server_with(ServiceConfig::default())
    }

    fn server_with(config: ServiceConfig) -> (HttpServer, Arc<MetricRegistry>, Arc<MemoryTransport>) {
        let registry = Arc::new(MetricRegistry::new());
        let transport = Arc::new(MemoryTransport::new());
        let instrumentation = Arc::new(
            RequestInstrumentation::new(
                registry.clone(),
                MetricEmitter::new(Encoder::new("test"), transport.clone()),
                OrderEndpoint::new(Method::POST, ORDER_ROUTE),
            )
            .max_body_bytes(config.http.max_body_bytes),
        );
        (HttpServer::new(config, instrumentation), registry, transport)
    }

    /// A valid order with `items` priced items, serialized.
    fn order_body(items: usize) -> String {
        let items = vec![r#"{"menuId":1,"description":"Veggie","price":0.05}"#; items].join(",");
        format!(r#"{{"franchiseId":1,"storeId":1,"items":[{}]}}"#, items)
    }

    /// The same order, once with a Content-Length header and once streamed
    /// in two pieces without one.
    fn order_requests(body: String) -> [Request<Body>; 2] {
        let declared = Request::builder()
            .method("POST")
            .uri(ORDER_ROUTE)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body.clone()))
            .unwrap();

        let (head, tail) = body.split_at(body.len() / 2);
        let pieces = vec![
            Ok::<_, std::io::Error>(head.to_string()),
            Ok(tail.to_string()),
        ];
        let streamed = Request::builder()
            .method("POST")
            .uri(ORDER_ROUTE)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from_stream(futures_util::stream::iter(pieces)))
            .unwrap();

        [declared, streamed]
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_welcome() {
        let (server, _, _) = server();
        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["message"], "welcome to JWT Pizza");
    }

    #[tokio::test]
    async fn test_order_flow_is_counted() {
        let (server, registry, transport) = server();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(ORDER_ROUTE)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer diner-token")
                    .body(Body::from(
                        r#"{"franchiseId":1,"storeId":1,"items":[{"menuId":1,"description":"Veggie","price":0.05}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["order"]["items"][0]["description"], "Veggie");
        assert!(body["order"]["id"].is_string());

        assert_eq!(registry.route_count(&RouteKey::new("POST", ORDER_ROUTE)), 1);
        assert_eq!(registry.active_users(), 1);
        assert_eq!(registry.pizza().purchase_count, 1);
        assert_eq!(registry.pizza().revenue_cents(), 5);
        assert_eq!(transport.named(series::PIZZA_ORDER_LATENCY_MS).len(), 1);
    }

    #[tokio::test]
    async fn test_order_without_items_is_rejected_by_handler() {
        let (server, registry, transport) = server();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(ORDER_ROUTE)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"franchiseId":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        drop(response);
        assert_eq!(registry.pizza().purchase_count, 0);
        assert_eq!(registry.route_count(&RouteKey::new("POST", ORDER_ROUTE)), 1);
        assert_eq!(transport.named(series::HTTP_REQUEST_LATENCY_MS).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let (server, registry, _) = server();
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/franchise/42/store/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "unknown endpoint");
        assert_eq!(registry.route_count(&RouteKey::new("GET", UNMATCHED_ROUTE)), 1);
    }

    #[tokio::test]
    async fn test_method_counters_sum_to_total() {
        let (server, registry, _) = server();
        let app = server.router();
        let requests = [
            ("GET", "/"),
            ("GET", MENU_ROUTE),
            ("POST", ORDER_ROUTE),
            ("DELETE", "/api/franchise/1"),
            ("GET", DOCS_ROUTE),
        ];
        for (method, uri) in requests {
            app.clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from("{}"))
                        .unwrap(),
                )
                .await
                .unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.methods.values().sum::<u64>(), requests.len() as u64);
        assert_eq!(snapshot.total_requests(), requests.len() as u64);
        assert_eq!(snapshot.methods["GET"], 3);
    }

    #[tokio::test]
    async fn test_oversized_body_gets_413() {
        let mut config = ServiceConfig::default();
        config.http.max_body_bytes = 64;
        let (server, _, _) = server_with(config);

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(ORDER_ROUTE)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(order_body(4)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json_body(response).await["message"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_order_same_outcome_with_or_without_length() {
        let mut config = ServiceConfig::default();
        config.http.max_body_bytes = 256;
        let (server, registry, _) = server_with(config);
        let body = order_body(20);
        assert!(body.len() > 256);

        for request in order_requests(body) {
            let response = server.router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        }
        assert_eq!(registry.pizza().purchase_count, 0);
        assert_eq!(registry.route_count(&RouteKey::new("POST", ORDER_ROUTE)), 2);
    }

    #[tokio::test]
    async fn test_order_within_limit_accepted_with_or_without_length() {
        let mut config = ServiceConfig::default();
        config.http.max_body_bytes = 4096;
        let (server, registry, transport) = server_with(config);

        for request in order_requests(order_body(3)) {
            let response = server.router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["order"]["items"][2]["price"], 0.05);
        }
        assert_eq!(registry.pizza().purchase_count, 6);
        assert_eq!(registry.pizza().revenue_cents(), 30);
        assert_eq!(transport.named(series::PIZZA_ORDER_LATENCY_MS).len(), 2);
    }
}
