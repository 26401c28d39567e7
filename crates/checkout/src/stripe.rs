//! Stripe Checkout provider over the REST API (no SDK dependency).

use std::time::Duration;

use async_trait::async_trait;
use common::OrderId;
use domain::ShippingAddress;
use serde_json::Value;

use crate::{
    CheckoutBridge, CheckoutError, CheckoutLine, CheckoutSession, RedirectTargets, Result,
    SessionResolution,
};

/// Metadata key carrying the order id on sessions and payment intents.
const ORDER_ID_KEY: &str = "orderId";

/// Provider settings that shape the hosted session.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// ISO currency code, lowercase.
    pub currency: String,
    /// Countries the shipping address may be in.
    pub allowed_countries: Vec<String>,
    pub api_base: String,
    /// Per-request timeout on the HTTP client.
    pub timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            allowed_countries: vec!["US".to_string(), "CA".to_string()],
            api_base: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Stripe Checkout Sessions client.
#[derive(Clone)]
pub struct StripeCheckout {
    client: reqwest::Client,
    secret_key: String,
    config: CheckoutConfig,
}

impl std::fmt::Debug for StripeCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeCheckout")
            .field("api_base", &self.config.api_base)
            .field("currency", &self.config.currency)
            .finish_non_exhaustive()
    }
}

impl StripeCheckout {
    /// Creates a client authenticating with `secret_key`.
    pub fn new(secret_key: impl Into<String>, config: CheckoutConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.api_base.trim_end_matches('/'))
    }
}

/// Builds the form body for `POST /v1/checkout/sessions`.
pub fn session_form(
    order_id: OrderId,
    lines: &[CheckoutLine],
    redirects: &RedirectTargets,
    config: &CheckoutConfig,
) -> Vec<(String, String)> {
    let order_id = order_id.to_string();
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), redirects.success_url.clone()),
        ("cancel_url".to_string(), redirects.cancel_url.clone()),
        ("client_reference_id".to_string(), order_id.clone()),
        (format!("metadata[{ORDER_ID_KEY}]"), order_id.clone()),
        (
            format!("payment_intent_data[metadata][{ORDER_ID_KEY}]"),
            order_id,
        ),
    ];

    for (i, country) in config.allowed_countries.iter().enumerate() {
        form.push((
            format!("shipping_address_collection[allowed_countries][{i}]"),
            country.clone(),
        ));
    }

    for (i, line) in lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            config.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.cents().to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }

    form
}

/// Maps a retrieved session object onto a [`SessionResolution`].
pub fn parse_session(session: &Value) -> Result<SessionResolution> {
    let order_id = session["metadata"][ORDER_ID_KEY]
        .as_str()
        .map(|raw| {
            OrderId::parse(raw)
                .map_err(|e| CheckoutError::MalformedSession(format!("bad order id {raw:?}: {e}")))
        })
        .transpose()?;

    if session["payment_status"].as_str() != Some("paid") {
        return Ok(SessionResolution::NotPaid { order_id });
    }

    let order_id = order_id.ok_or_else(|| {
        CheckoutError::MalformedSession("paid session has no order id metadata".to_string())
    })?;

    // Either the bare id or the expanded object.
    let payment_intent = &session["payment_intent"];
    let payment_id = payment_intent
        .as_str()
        .or_else(|| payment_intent["id"].as_str())
        .ok_or_else(|| {
            CheckoutError::MalformedSession("paid session has no payment intent".to_string())
        })?
        .to_string();

    let address = if session["shipping_details"]["address"].is_object() {
        &session["shipping_details"]["address"]
    } else {
        &session["collected_information"]["shipping_details"]["address"]
    };

    Ok(SessionResolution::Paid {
        order_id,
        payment_id,
        shipping_address: parse_address(address),
    })
}

fn parse_address(address: &Value) -> Option<ShippingAddress> {
    if !address.is_object() {
        return None;
    }
    let field = |name: &str| address[name].as_str().map(str::to_string);
    let parsed = ShippingAddress {
        line1: field("line1"),
        line2: field("line2"),
        city: field("city"),
        state: field("state"),
        postal_code: field("postal_code"),
        country: field("country"),
    };
    (!parsed.is_empty()).then_some(parsed)
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await?;

    if status.is_success() {
        return Ok(body);
    }

    Err(CheckoutError::Rejected {
        status: status.as_u16(),
        message: body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string(),
    })
}

/// Stripe session ids are `cs_` followed by alphanumerics; anything else
/// must never be spliced into a request path.
fn is_session_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[async_trait]
impl CheckoutBridge for StripeCheckout {
    async fn open(
        &self,
        order_id: OrderId,
        lines: &[CheckoutLine],
        redirects: &RedirectTargets,
    ) -> Result<CheckoutSession> {
        let form = session_form(order_id, lines, redirects, &self.config);
        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;
        let body = read_json(response).await?;

        let session_id = body["id"].as_str();
        let payment_url = body["url"].as_str();
        match (session_id, payment_url) {
            (Some(session_id), Some(payment_url)) => {
                tracing::debug!(%order_id, session_id, "Stripe checkout session opened");
                Ok(CheckoutSession {
                    session_id: session_id.to_string(),
                    payment_url: payment_url.to_string(),
                })
            }
            _ => Err(CheckoutError::MalformedSession(format!(
                "create session response missing id or url: {body}"
            ))),
        }
    }

    async fn resolve(&self, session_id: &str) -> Result<SessionResolution> {
        if !is_session_id(session_id) {
            tracing::debug!(session_id, "rejected malformed checkout session id");
            return Ok(SessionResolution::NotFound);
        }

        let response = self
            .client
            .get(self.url(&format!("checkout/sessions/{session_id}")))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("expand[]", "payment_intent")])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SessionResolution::NotFound);
        }

        let body = read_json(response).await?;
        parse_session(&body)
    }

    async fn expire(&self, session_id: &str) -> Result<()> {
        if !is_session_id(session_id) {
            return Err(CheckoutError::Rejected {
                status: 404,
                message: format!("no such checkout session: {session_id}"),
            });
        }

        let response = self
            .client
            .post(self.url(&format!("checkout/sessions/{session_id}/expire")))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        read_json(response).await?;
        Ok(())
    }

    async fn refund(&self, payment_id: &str, idempotency_key: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("refunds"))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", format!("refund-{idempotency_key}"))
            .form(&[("payment_intent", payment_id)])
            .send()
            .await?;
        read_json(response).await?;
        tracing::info!(payment_id, "Stripe refund requested");
        Ok(())
    }
}
