//! Axum router and HTTP handlers.

use std::net::SocketAddr;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use spigot_core::{FaucetStatus, PayoutContext, PayoutError, PayoutRequest};

use crate::AppState;

// Embed the web UI at compile time.
const INDEX_HTML: &str = include_str!("static/index.html");

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(web_ui).post(form_faucet))
        .route("/api/faucet", post(api_faucet))
        .route("/api/status", get(api_status))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body `{"error": ...}` with a status chosen by error kind.
pub enum ApiError {
    Payout(PayoutError),
    BadRequest(String),
}

impl From<PayoutError> for ApiError {
    fn from(e: PayoutError) -> Self {
        ApiError::Payout(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Payout(PayoutError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Payout(PayoutError::SubmissionFailed { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Payout(PayoutError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Payout(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::Payout(PayoutError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }

    fn body(&self) -> Value {
        match self {
            ApiError::BadRequest(msg) => json!({ "error": msg }),
            ApiError::Payout(e) => match self.retry_after_secs() {
                Some(secs) => json!({ "error": e.to_string(), "retry_after_secs": secs }),
                None => json!({ "error": e.to_string() }),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut resp = (self.status(), Json(self.body())).into_response();
        if let Some(secs) = self.retry_after_secs() {
            resp.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        resp
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Serve the embedded web UI.
async fn web_ui() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Deserialize)]
struct FaucetRequest {
    address: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default, rename = "overridetoken")]
    override_token: Option<String>,
    /// Any non-empty value asks the form endpoint for a JSON reply.
    #[serde(default)]
    json: Option<String>,
}

/// `POST /api/faucet` with a JSON body.
async fn api_faucet(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<FaucetRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    dispense(&state, peer, &headers, req).await
}

/// `POST /` from the HTML form.
///
/// Replies with JSON when the form carries a `json` field or the client
/// accepts `application/json`, otherwise with a result page.
async fn form_faucet(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Form<FaucetRequest>, FormRejection>,
) -> Response {
    let (wants_json, result) = match body {
        Ok(Form(req)) => {
            let wants_json =
                req.json.as_deref().is_some_and(|v| !v.is_empty()) || accepts_json(&headers);
            (wants_json, dispense(&state, peer, &headers, req).await)
        }
        Err(e) => (accepts_json(&headers), Err(ApiError::BadRequest(e.body_text()))),
    };
    if wants_json {
        result.into_response()
    } else {
        result_page(result)
    }
}

fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

/// HTML result for browsers posting the form without JavaScript. The JSON
/// reply is carried in `X-Json-Reply`.
fn result_page(result: Result<Json<Value>, ApiError>) -> Response {
    let (status, reply, message, retry_after) = match result {
        Ok(Json(reply)) => {
            let message = format!(
                "Sent {} to {} (tx {})",
                reply["amount"].as_str().unwrap_or_default(),
                reply["address"].as_str().unwrap_or_default(),
                reply["txid"].as_str().unwrap_or_default(),
            );
            (StatusCode::OK, reply, message, None)
        }
        Err(e) => {
            let reply = e.body();
            let message = reply["error"].as_str().unwrap_or_default().to_string();
            (e.status(), reply, message, e.retry_after_secs())
        }
    };

    let page = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\">\
         <title>Spigot Faucet</title></head>\n<body>\n<h1>Spigot Faucet</h1>\n\
         <p>{}</p>\n<p><a href=\"/\">Back</a></p>\n</body>\n</html>\n",
        escape_html(&message)
    );
    let mut resp = (status, Html(page)).into_response();
    if let Ok(value) = HeaderValue::from_str(&reply.to_string()) {
        resp.headers_mut()
            .insert(HeaderName::from_static("x-json-reply"), value);
    }
    if let Some(secs) = retry_after {
        resp.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    resp
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

async fn dispense(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    req: FaucetRequest,
) -> Result<Json<Value>, ApiError> {
    let identity = state.identity.resolve(peer, headers);
    let mut request = PayoutRequest::new(identity, req.address);
    if let Some(amount) = req.amount {
        request = request.with_amount(amount);
    }
    if let Some(token) = req.override_token {
        request = request.with_override_token(token);
    }

    let ctx = PayoutContext::with_timeout(state.config.request_timeout);
    let payout = state.coordinator.pay(&ctx, request).await?;

    Ok(Json(json!({
        "txid": payout.txid,
        "amount": payout.amount.to_string(),
        "amount_units": payout.amount.units(),
        "address": payout.address.encode(),
    })))
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: FaucetStatus,
    donation_address: Option<String>,
}

/// `GET /api/status`: balance, limits and payout totals. Amounts are in
/// minimal units.
async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.coordinator.status(),
        donation_address: state.config.donation_address.clone(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use spigot_core::testing::{FakeWallet, ManualClock, address_for, testnet_address};
    use spigot_core::{
        Amount, BalanceTracker, Bech32mValidator, Network, PayoutCoordinator, WalletError,
    };
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::identity::IdentityResolver;

    const COINS_1000: u64 = 100_000_000_000;

    fn config() -> Config {
        let env = HashMap::from([
            ("FAUCET_WALLET_USER", "faucet".to_string()),
            ("FAUCET_WALLET_PASSWORD", "hunter2".to_string()),
            ("FAUCET_DONATION_ADDRESS", testnet_address(200)),
        ]);
        Config::from_lookup(|k| env.get(k).cloned()).unwrap()
    }

    async fn app(balance_units: u64) -> (Router, Arc<FakeWallet>) {
        let config = config();
        let wallet = Arc::new(FakeWallet::new(Amount::from_units(balance_units)));
        let clock = Arc::new(ManualClock::default());
        let balance = Arc::new(
            BalanceTracker::initialize(wallet.clone(), clock.clone(), "default")
                .await
                .unwrap(),
        );
        let coordinator = PayoutCoordinator::new(
            config.payout_policy(),
            wallet.clone(),
            Arc::new(Bech32mValidator),
            clock,
            balance,
        );
        let state = AppState {
            coordinator: Arc::new(coordinator),
            identity: Arc::new(IdentityResolver::new(
                config.real_ip_header.clone(),
                config.trusted_proxies.clone(),
            )),
            config: Arc::new(config),
        };
        (router(state), wallet)
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("203.0.113.7:5555".parse().unwrap())
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .extension(peer())
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // --- Pages ---

    #[tokio::test]
    async fn index_serves_html() {
        let (app, _) = app(COINS_1000).await;
        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("<form"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app(COINS_1000).await;
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let (app, _) = app(COINS_1000).await;
        let req = Request::get("/api/status")
            .header("origin", "https://example.org")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    // --- Payouts ---

    #[tokio::test]
    async fn json_payout_succeeds() {
        let (app, wallet) = app(COINS_1000).await;
        let address = testnet_address(1);
        let resp = app
            .oneshot(json_post("/api/faucet", json!({ "address": address })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["amount"], "2");
        assert_eq!(body["amount_units"], 200_000_000);
        assert_eq!(body["address"], address);
        assert_eq!(body["txid"], wallet.sent()[0].txid.as_str());
    }

    #[tokio::test]
    async fn explicit_amount_is_honoured() {
        let (app, wallet) = app(COINS_1000).await;
        let req = json_post(
            "/api/faucet",
            json!({ "address": testnet_address(1), "amount": "0.25" }),
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(wallet.sent()[0].amount, Amount::from_units(25_000_000));
    }

    #[tokio::test]
    async fn repeat_request_is_429_with_retry_after() {
        let (app, _) = app(COINS_1000).await;
        let body = json!({ "address": testnet_address(1) });

        let first = app.clone().oneshot(json_post("/api/faucet", body.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(json_post("/api/faucet", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "86400");
        let body = body_json(second).await;
        assert_eq!(body["retry_after_secs"], 86_400);
        assert!(body["error"].as_str().unwrap().contains("86400 seconds"));
    }

    #[tokio::test]
    async fn validation_errors_are_400() {
        let (app, wallet) = app(COINS_1000).await;
        let mainnet = address_for(1, Network::Mainnet).encode();
        for body in [
            json!({ "address": "nonsense" }),
            json!({ "address": mainnet }),
            json!({ "address": testnet_address(1), "amount": "-3" }),
            json!({ "address": testnet_address(1), "amount": "11" }),
        ] {
            let resp = app.clone().oneshot(json_post("/api/faucet", body.clone())).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(body_json(resp).await["error"].is_string());
        }
        assert_eq!(wallet.send_attempts(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let (app, _) = app(COINS_1000).await;
        let req = Request::builder()
            .method("POST")
            .uri("/api/faucet")
            .header("content-type", "application/json")
            .extension(peer())
            .body(Body::from("{\"addr"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn wallet_failure_is_502_without_details() {
        let (app, wallet) = app(COINS_1000).await;
        wallet.fail_sends_with(Some(WalletError::Unreachable(
            "tcp connect 127.0.0.1:19110 as faucet".into(),
        )));
        let resp = app
            .oneshot(json_post("/api/faucet", json!({ "address": testnet_address(1) })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "failed to send funds: wallet unreachable");
    }

    fn form_post(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .extension(peer())
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn form_payout_renders_result_page() {
        let (app, wallet) = app(COINS_1000).await;
        let address = testnet_address(4);
        let resp = app
            .oneshot(form_post(format!("address={address}&amount=&overridetoken=")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let reply: Value =
            serde_json::from_str(resp.headers()["x-json-reply"].to_str().unwrap()).unwrap();
        let txid = wallet.sent()[0].txid.as_str().to_string();
        assert_eq!(reply["txid"], txid);
        assert_eq!(wallet.sent()[0].amount, Amount::from_units(200_000_000));

        let page = body_text(resp).await;
        assert!(page.contains(&format!("Sent 2 to {address} (tx {txid})")));
    }

    #[tokio::test]
    async fn form_json_field_asks_for_json() {
        let (app, _) = app(COINS_1000).await;
        let resp = app
            .oneshot(form_post(format!("address={}&json=1", testnet_address(4))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["amount"], "2");
    }

    #[tokio::test]
    async fn form_honours_json_accept_header() {
        let (app, _) = app(COINS_1000).await;
        let mut req = form_post(format!("address={}", testnet_address(4)));
        req.headers_mut()
            .insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["amount_units"], 200_000_000);
    }

    #[tokio::test]
    async fn form_errors_render_result_page() {
        let (app, _) = app(COINS_1000).await;
        let body = format!("address={}", testnet_address(4));
        app.clone().oneshot(form_post(body.clone())).await.unwrap();

        let resp = app.clone().oneshot(form_post(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "86400");
        let reply: Value =
            serde_json::from_str(resp.headers()["x-json-reply"].to_str().unwrap()).unwrap();
        assert_eq!(reply["retry_after_secs"], 86_400);
        assert!(body_text(resp).await.contains("86400 seconds"));
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    // --- Status ---

    #[tokio::test]
    async fn status_reports_totals() {
        let (app, _) = app(COINS_1000).await;
        app.clone()
            .oneshot(json_post("/api/faucet", json!({ "address": testnet_address(1) })))
            .await
            .unwrap();

        let resp = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["network"], "testnet");
        assert_eq!(body["transaction_limit"], 1_000_000_000);
        assert_eq!(body["default_amount"], 200_000_000);
        assert_eq!(body["cooldown_secs"], 86_400);
        assert_eq!(body["payouts_last_24h"], 1);
        assert_eq!(body["sent_last_24h"], 200_000_000);
        assert_eq!(body["lifetime_payouts"], 1);
        assert_eq!(body["donation_address"], testnet_address(200));
    }
}
