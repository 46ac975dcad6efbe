//! Request and result types shared by the faucet crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::amount::Amount;

/// Opaque key identifying a requester for rate limiting.
///
/// Usually the client IP as a string. Two identities are the same requester
/// only if the strings match exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction identifier returned by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request for funds, as received from the HTTP layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutRequest {
    pub identity: ClientIdentity,
    /// Recipient address as typed by the requester.
    pub address: String,
    /// Requested amount in coins; `None` or blank means the default amount.
    pub amount: Option<String>,
    pub override_token: Option<String>,
}

impl PayoutRequest {
    pub fn new(identity: ClientIdentity, address: impl Into<String>) -> Self {
        Self {
            identity,
            address: address.into(),
            amount: None,
            override_token: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_override_token(mut self, token: impl Into<String>) -> Self {
        self.override_token = Some(token.into());
        self
    }
}

/// A completed payout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub txid: TxId,
    pub amount: Amount,
    pub address: Address,
}
