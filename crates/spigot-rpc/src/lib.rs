//! # spigot-rpc
//! HTTP JSON-RPC client for the wallet that holds the faucet's funds.

pub mod client;
pub mod error;

pub use client::{WalletRpcClient, WalletRpcConfig};
pub use error::RpcClientError;
