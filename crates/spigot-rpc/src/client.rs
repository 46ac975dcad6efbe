use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client};
use serde::{Deserialize, Serialize};
use serde_json::value::{RawValue, to_raw_value};
use tracing::debug;

use spigot_core::constants::WALLET_MIN_CONF;
use spigot_core::{Address, Amount, TxId, WalletError, WalletSender};

use crate::error::RpcClientError;

/// Connection settings for the wallet's JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct WalletRpcConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    /// PEM certificate to trust in addition to the system roots, for wallets
    /// serving a self-signed TLS certificate.
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
}

/// [`WalletSender`] over HTTP JSON-RPC with basic auth.
///
/// Amounts cross the wire as JSON numbers written from the integer unit
/// count, so a payout is never rounded through `f64`.
pub struct WalletRpcClient {
    client: Client,
    endpoint: String,
    user: String,
    password: String,
    next_id: AtomicU64,
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Box<RawValue>],
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct GetBalanceResult {
    balances: Vec<AccountBalance>,
}

#[derive(Deserialize)]
struct AccountBalance {
    spendable: Box<RawValue>,
}

impl WalletRpcClient {
    pub fn new(config: &WalletRpcConfig) -> Result<Self, RpcClientError> {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).map_err(|source| RpcClientError::ReadCertificate {
                path: path.clone(),
                source,
            })?;
            let cert = Certificate::from_pem(&pem).map_err(RpcClientError::InvalidCertificate)?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            client: builder.build().map_err(RpcClientError::Build)?,
            endpoint: config.url.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(
        &self,
        method: &str,
        params: &[Box<RawValue>],
    ) -> Result<Box<RawValue>, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "wallet rpc call");

        let resp = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&Request {
                jsonrpc: "1.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|e| WalletError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| WalletError::Unreachable(e.to_string()))?;

        // Wallets report RPC errors with a JSON body and a non-2xx status.
        match serde_json::from_slice::<Response>(&body) {
            Ok(Response {
                error: Some(err), ..
            }) => Err(WalletError::Rejected {
                code: err.code,
                message: err.message,
            }),
            Ok(Response {
                result: Some(result),
                ..
            }) if status.is_success() => Ok(result),
            _ if !status.is_success() => {
                Err(WalletError::Unreachable(format!("http status {status}")))
            }
            Ok(_) => Err(WalletError::MalformedResponse(format!(
                "{method}: missing result"
            ))),
            Err(e) => Err(WalletError::MalformedResponse(format!("{method}: {e}"))),
        }
    }
}

#[async_trait]
impl WalletSender for WalletRpcClient {
    async fn spendable_balance(&self, account: &str) -> Result<Amount, WalletError> {
        let params = [raw(&account)?, raw(&WALLET_MIN_CONF)?];
        let result = self.call("getbalance", &params).await?;
        parse_balance(&result)
    }

    async fn send_from_account(
        &self,
        account: &str,
        address: &Address,
        amount: Amount,
    ) -> Result<TxId, WalletError> {
        let params = [
            raw(&account)?,
            raw(&address.encode())?,
            amount_param(amount)?,
            raw(&WALLET_MIN_CONF)?,
        ];
        let result = self.call("sendfrom", &params).await?;
        parse_txid(&result)
    }
}

fn raw<T: Serialize + ?Sized>(value: &T) -> Result<Box<RawValue>, WalletError> {
    to_raw_value(value).map_err(|e| WalletError::MalformedResponse(e.to_string()))
}

/// Coin amount as a bare JSON number, e.g. `0.5`.
fn amount_param(amount: Amount) -> Result<Box<RawValue>, WalletError> {
    RawValue::from_string(amount.to_string())
        .map_err(|e| WalletError::MalformedResponse(e.to_string()))
}

/// Accepts either a per-account balance object (spendable amounts summed)
/// or a bare number.
fn parse_balance(result: &RawValue) -> Result<Amount, WalletError> {
    let text = result.get().trim_start();
    if !text.starts_with('{') {
        return coin_amount(result);
    }
    let parsed: GetBalanceResult = serde_json::from_str(text)
        .map_err(|e| WalletError::MalformedResponse(format!("getbalance: {e}")))?;
    parsed.balances.iter().try_fold(Amount::ZERO, |total, b| {
        total
            .checked_add(coin_amount(&b.spendable)?)
            .ok_or_else(|| WalletError::MalformedResponse("getbalance: balance overflow".into()))
    })
}

fn coin_amount(value: &RawValue) -> Result<Amount, WalletError> {
    Amount::parse_coins(value.get())
        .map_err(|e| WalletError::MalformedResponse(format!("amount {}: {e}", value.get())))
}

fn parse_txid(result: &RawValue) -> Result<TxId, WalletError> {
    let txid: String = serde_json::from_str(result.get())
        .map_err(|e| WalletError::MalformedResponse(format!("sendfrom: {e}")))?;
    if txid.is_empty() {
        return Err(WalletError::MalformedResponse("sendfrom: empty txid".into()));
    }
    Ok(TxId::new(txid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::Value;
    use spigot_core::Network;

    fn raw_json(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    // --- Response parsing ---

    #[test]
    fn balance_object_sums_spendable() {
        let result = raw_json(
            r#"{"balances":[{"accountname":"default","spendable":1.5,"total":2},
                {"accountname":"default","spendable":0.00000001}],"blockhash":"00"}"#,
        );
        assert_eq!(
            parse_balance(&result).unwrap(),
            Amount::from_units(150_000_001)
        );
    }

    #[test]
    fn balance_bare_number() {
        assert_eq!(
            parse_balance(&raw_json("42.25")).unwrap(),
            Amount::from_units(4_225_000_000)
        );
        assert_eq!(
            parse_balance(&raw_json("1e-8")).unwrap(),
            Amount::from_units(1)
        );
    }

    #[test]
    fn balance_empty_list_is_zero() {
        assert_eq!(
            parse_balance(&raw_json(r#"{"balances":[]}"#)).unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn negative_or_quoted_balance_is_malformed() {
        for bad in ["-1", r#""1.0""#, r#"{"total":1}"#] {
            assert!(
                matches!(parse_balance(&raw_json(bad)), Err(WalletError::MalformedResponse(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn txid_must_be_nonempty_string() {
        assert_eq!(parse_txid(&raw_json(r#""ab12""#)).unwrap(), TxId::new("ab12"));
        assert!(parse_txid(&raw_json(r#""""#)).is_err());
        assert!(parse_txid(&raw_json("12")).is_err());
    }

    #[test]
    fn amount_param_is_exact_number() {
        assert_eq!(amount_param(Amount::from_units(1)).unwrap().get(), "0.00000001");
        assert_eq!(amount_param(Amount::from_units(250_000_000)).unwrap().get(), "2.5");
    }

    // --- Against a local JSON-RPC server ---

    type Seen = Arc<Mutex<Vec<(Option<String>, String)>>>;

    async fn serve(status: StatusCode, reply: &'static str) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let log = seen.clone();
        let app = Router::new().route(
            "/",
            post(move |headers: HeaderMap, body: String| {
                let log = log.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    log.lock().unwrap().push((auth, body));
                    (status, [("content-type", "application/json")], reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/"), seen)
    }

    fn client(url: String) -> WalletRpcClient {
        WalletRpcClient::new(&WalletRpcConfig {
            url,
            user: "faucet".into(),
            password: "hunter2".into(),
            ca_cert: None,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn getbalance_request_shape() {
        let (url, seen) = serve(
            StatusCode::OK,
            r#"{"result":{"balances":[{"spendable":3}]},"error":null,"id":1}"#,
        )
        .await;
        let balance = client(url).spendable_balance("default").await.unwrap();
        assert_eq!(balance, Amount::from_units(300_000_000));

        let seen = seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Basic ZmF1Y2V0Omh1bnRlcjI="));
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["method"], "getbalance");
        assert_eq!(body["params"], serde_json::json!(["default", 0]));
    }

    #[tokio::test]
    async fn sendfrom_sends_exact_amount() {
        let (url, seen) =
            serve(StatusCode::OK, r#"{"result":"deadbeef","error":null,"id":1}"#).await;
        let address = Address::new([3; 32], Network::Testnet);
        let txid = client(url)
            .send_from_account("default", &address, Amount::from_units(12_345_678))
            .await
            .unwrap();
        assert_eq!(txid, TxId::new("deadbeef"));

        let seen = seen.lock().unwrap();
        let body = &seen[0].1;
        assert!(body.contains(&format!(r#"["default","{}",0.12345678,0]"#, address.encode())));
    }

    #[tokio::test]
    async fn rpc_error_is_rejected() {
        let (url, _) = serve(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"result":null,"error":{"code":-6,"message":"insufficient funds"},"id":1}"#,
        )
        .await;
        let err = client(url).spendable_balance("default").await.unwrap_err();
        assert_eq!(
            err,
            WalletError::Rejected {
                code: -6,
                message: "insufficient funds".into()
            }
        );
    }

    #[tokio::test]
    async fn http_failure_is_unreachable() {
        let (url, _) = serve(StatusCode::UNAUTHORIZED, "").await;
        let err = client(url).spendable_balance("default").await.unwrap_err();
        assert!(matches!(err, WalletError::Unreachable(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let (url, _) = serve(StatusCode::OK, "not json").await;
        let err = client(url).spendable_balance("default").await.unwrap_err();
        assert!(matches!(err, WalletError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}/"))
            .spendable_balance("default")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Unreachable(_)));
    }

    #[test]
    fn missing_certificate_file_fails() {
        let err = WalletRpcClient::new(&WalletRpcConfig {
            url: "https://127.0.0.1:1/".into(),
            user: String::new(),
            password: String::new(),
            ca_cert: Some(PathBuf::from("/nonexistent/rpc.cert")),
            timeout: Duration::from_secs(1),
        })
        .err()
        .unwrap();
        assert!(matches!(err, RpcClientError::ReadCertificate { .. }));
    }
}
