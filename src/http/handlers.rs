//! Request handlers.
//!
//! Authentication, franchise management and order persistence live in
//! separate services. These handlers only give the instrumented router real
//! routes to serve.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Route pattern of the order submission endpoint.
pub const ORDER_ROUTE: &str = "/api/order";
pub const MENU_ROUTE: &str = "/api/order/menu";
pub const DOCS_ROUTE: &str = "/api/docs";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub image: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub menu_id: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub franchise_id: Option<u64>,
    #[serde(default)]
    pub store_id: Option<u64>,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    #[serde(flatten)]
    pub request: OrderRequest,
}

pub async fn welcome() -> Json<Value> {
    Json(json!({
        "message": "welcome to JWT Pizza",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_menu() -> Json<Vec<MenuItem>> {
    Json(vec![
        MenuItem {
            id: 1,
            title: "Veggie".into(),
            description: "A garden of delight".into(),
            image: "pizza1.png".into(),
            price: 0.0038,
        },
        MenuItem {
            id: 2,
            title: "Pepperoni".into(),
            description: "Spicy treat".into(),
            image: "pizza2.png".into(),
            price: 0.0042,
        },
        MenuItem {
            id: 3,
            title: "Student".into(),
            description: "No topping, no sauce, just carbs".into(),
            image: "pizza9.png".into(),
            price: 0.0001,
        },
    ])
}

pub async fn create_order(
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("order has no items".into()));
    }

    let order = Order {
        id: Uuid::new_v4(),
        request,
    };
    tracing::debug!(order_id = %order.id, items = order.request.items.len(), "Order accepted");
    Ok(Json(json!({ "order": order })))
}

pub async fn docs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            { "method": "GET", "path": "/", "description": "Service banner" },
            { "method": "GET", "path": MENU_ROUTE, "description": "Get the pizza menu" },
            { "method": "POST", "path": ORDER_ROUTE, "description": "Create an order" },
            { "method": "GET", "path": DOCS_ROUTE, "description": "This document" },
        ],
        "config": {
            "metrics": state.config.metrics.enabled,
            "source": state.config.metrics.source,
        },
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
