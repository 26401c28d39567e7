//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{
    CartItem, FulfillmentStatus, LineItem, Order, OrderUpdate, PaymentStatus, ShippingAddress,
};
use lifecycle::{CancellationResult, CreatedOrder, LifecycleState};
use serde::{Deserialize, Serialize};
use store::{OrderQuery, Store};

use crate::AppState;
use crate::auth::AuthContext;
use crate::error::ApiError;

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: usize = 100;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItem>,
}

#[derive(Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListOrdersParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub payment_status: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub total_cents: i64,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub lifecycle_state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
    pub updates: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            user_id: order.user_id(),
            items: order.items().to_vec(),
            total_cents: order.total_amount().cents(),
            payment_status: order.payment_status(),
            fulfillment_status: order.fulfillment_status(),
            lifecycle_state: LifecycleState::of(order),
            payment_id: order.payment_id().map(str::to_string),
            shipping_address: order.shipping_address().cloned(),
            updates: order.updates().to_string(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub session_id: String,
    pub payment_url: String,
    pub total_cents: i64,
}

impl From<CreatedOrder> for OrderCreatedResponse {
    fn from(created: CreatedOrder) -> Self {
        Self {
            order_id: created.order_id,
            session_id: created.session_id,
            payment_url: created.payment_url,
            total_cents: created.total_amount.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderCancelledResponse {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub result: CancellationResult,
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(raw).map_err(|e| ApiError::BadRequest(format!("invalid order id '{raw}': {e}")))
}

// -- Handlers --

/// POST /orders: reserves stock and opens a checkout session.
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthContext(actor): AuthContext,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let created = state.lifecycle.create_order(&actor, req.items).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /orders: lists the caller's orders (every order for admins).
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthContext(actor): AuthContext,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let mut query = OrderQuery::new()
        .limit(params.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE))
        .offset(params.offset.unwrap_or(0));
    if let Some(raw) = params.payment_status.as_deref() {
        let status = raw.parse::<PaymentStatus>().map_err(ApiError::BadRequest)?;
        query = query.payment_status(status);
    }

    let orders = state.lifecycle.list_orders(&actor, query).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: returns one order to its owner or an admin.
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.get_order(&actor, order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}: customers edit the address, admins the fulfillment status.
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(update): Json<OrderUpdate>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.update_order(&actor, order_id, update).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel: discards an unpaid order or refunds a paid one.
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderCancelledResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let reason = req.reason.unwrap_or_default();
    let result = state
        .lifecycle
        .cancel_order(&actor, order_id, reason.trim())
        .await?;
    Ok(Json(OrderCancelledResponse { order_id, result }))
}
