//! A JSON-RPC wallet served over local HTTP, for exercising the real
//! `WalletRpcClient` against the coordinator.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::value::RawValue;
use spigot_core::Amount;
use tokio::task::JoinHandle;

/// A payment accepted by the mock wallet, as it arrived on the wire.
#[derive(Clone, Debug)]
pub struct WireSend {
    pub account: String,
    pub address: String,
    /// The amount parameter exactly as sent.
    pub amount_text: String,
}

#[derive(Default)]
pub struct WalletBook {
    balance: Mutex<Amount>,
    sends: Mutex<Vec<WireSend>>,
}

impl WalletBook {
    pub fn balance(&self) -> Amount {
        *self.balance.lock()
    }

    pub fn set_balance(&self, balance: Amount) {
        *self.balance.lock() = balance;
    }

    pub fn sends(&self) -> Vec<WireSend> {
        self.sends.lock().clone()
    }
}

pub struct MockWalletServer {
    pub url: String,
    pub book: Arc<WalletBook>,
    handle: JoinHandle<()>,
}

impl MockWalletServer {
    pub async fn start(balance: Amount) -> Self {
        let book = Arc::new(WalletBook::default());
        book.set_balance(balance);

        let app = Router::new().route("/", post(rpc)).with_state(book.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock wallet");
        let addr = listener.local_addr().expect("mock wallet addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}/"),
            book,
            handle,
        }
    }
}

impl Drop for MockWalletServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    params: Vec<Box<RawValue>>,
}

type RpcReply = (StatusCode, [(&'static str, &'static str); 1], String);

fn reply(status: StatusCode, id: u64, result: &str, error: &str) -> RpcReply {
    (
        status,
        [("content-type", "application/json")],
        format!(r#"{{"result":{result},"error":{error},"id":{id}}}"#),
    )
}

fn reject(id: u64, code: i64, message: &str) -> RpcReply {
    let error = format!(r#"{{"code":{code},"message":"{message}"}}"#);
    reply(StatusCode::INTERNAL_SERVER_ERROR, id, "null", &error)
}

async fn rpc(State(book): State<Arc<WalletBook>>, body: String) -> RpcReply {
    let Ok(req) = serde_json::from_str::<RpcRequest>(&body) else {
        return reject(0, -32700, "parse error");
    };
    let text = |i: usize| -> Option<String> {
        req.params
            .get(i)
            .and_then(|p| serde_json::from_str::<String>(p.get()).ok())
    };

    match req.method.as_str() {
        "getbalance" => {
            let result = format!(r#"{{"balances":[{{"spendable":{}}}]}}"#, book.balance());
            reply(StatusCode::OK, req.id, &result, "null")
        }
        "sendfrom" => {
            let (Some(account), Some(address), Some(raw_amount)) =
                (text(0), text(1), req.params.get(2))
            else {
                return reject(req.id, -8, "invalid parameters");
            };
            let Ok(amount) = Amount::parse_coins(raw_amount.get()) else {
                return reject(req.id, -3, "invalid amount");
            };
            let n = {
                let mut balance = book.balance.lock();
                if *balance < amount {
                    return reject(req.id, -6, "insufficient funds");
                }
                *balance = balance.saturating_sub(amount);
                let mut sends = book.sends.lock();
                sends.push(WireSend {
                    account,
                    address,
                    amount_text: raw_amount.get().to_string(),
                });
                sends.len()
            };
            reply(StatusCode::OK, req.id, &format!(r#""{n:064x}""#), "null")
        }
        _ => reject(req.id, -32601, "method not found"),
    }
}
