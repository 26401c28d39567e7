//! Checkout redirect targets.
//!
//! The hosted checkout page sends the customer back to one of these URLs
//! with the session id in the query string. Both are the single entry point
//! for reconciling that session into the order.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use lifecycle::{CheckoutCancellation, PaymentConfirmation};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SessionParams {
    pub session_id: Option<String>,
}

impl SessionParams {
    fn session_id(&self) -> Result<&str, ApiError> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing session_id".to_string()))
    }
}

/// GET /payment/success: applies a completed payment to its order.
pub async fn success<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SessionParams>,
) -> Result<Json<PaymentConfirmation>, ApiError> {
    let session_id = params.session_id()?;
    let confirmation = state.lifecycle.reconcile_payment_success(session_id).await?;
    Ok(Json(confirmation))
}

/// GET /payment/cancel: releases the reservation of an abandoned checkout.
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SessionParams>,
) -> Result<Json<CheckoutCancellation>, ApiError> {
    let session_id = params.session_id()?;
    let cancellation = state.lifecycle.reconcile_payment_cancel(session_id).await?;
    Ok(Json(cancellation))
}
