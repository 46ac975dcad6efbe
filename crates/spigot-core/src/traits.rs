//! Trait interfaces between the payout core and its collaborators:
//! - [`WalletSender`]: balance queries and fund transfers (spigot-rpc implements)
//! - [`AddressValidator`]: recipient address decoding
//! - [`Clock`]: wall-clock time, replaceable in tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::address::{Address, Network};
use crate::amount::Amount;
use crate::error::{AddressError, WalletError};
use crate::types::TxId;

/// The external wallet holding the faucet's funds.
///
/// Implementations own their transport and any retry policy. The payout
/// coordinator calls [`send_from_account`](Self::send_from_account) at most
/// once per request and never retries it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletSender: Send + Sync {
    /// Spendable balance of `account`.
    async fn spendable_balance(&self, account: &str) -> Result<Amount, WalletError>;

    /// Send `amount` from `account` to `address`, returning the transaction id.
    async fn send_from_account(
        &self,
        account: &str,
        address: &Address,
        amount: Amount,
    ) -> Result<TxId, WalletError>;
}

/// Decodes requester-supplied addresses.
pub trait AddressValidator: Send + Sync {
    /// Decode `input` as an address of any known network.
    fn decode(&self, input: &str) -> Result<Address, AddressError>;

    /// Whether `address` may receive funds on `network`.
    fn belongs_to_network(&self, address: &Address, network: Network) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
