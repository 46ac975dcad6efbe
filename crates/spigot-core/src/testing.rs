//! Test doubles for the faucet core: a settable clock and an in-memory wallet.
//!
//! Compiled for this crate's own tests and, through the `testing` feature,
//! for downstream test crates.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::address::{Address, Network, PAYLOAD_LEN};
use crate::amount::Amount;
use crate::error::WalletError;
use crate::traits::{Clock, WalletSender};
use crate::types::TxId;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::zero());
        *self.now.lock() += delta;
    }
}

impl Default for ManualClock {
    /// 2023-11-14T22:13:20Z.
    fn default() -> Self {
        Self::at(DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A payment accepted by [`FakeWallet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentPayment {
    pub account: String,
    pub address: Address,
    pub amount: Amount,
    pub txid: TxId,
}

/// In-memory wallet. Sends deduct from the balance so post-payout refreshes
/// observe the spend.
#[derive(Debug)]
pub struct FakeWallet {
    balance: Mutex<Amount>,
    sent: Mutex<Vec<SentPayment>>,
    balance_queries: AtomicUsize,
    send_attempts: AtomicUsize,
    fail_balance: AtomicBool,
    send_failure: Mutex<Option<WalletError>>,
    send_delay: Mutex<Duration>,
    next_txid: AtomicU64,
}

impl FakeWallet {
    pub fn new(balance: Amount) -> Self {
        Self {
            balance: Mutex::new(balance),
            sent: Mutex::new(Vec::new()),
            balance_queries: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            fail_balance: AtomicBool::new(false),
            send_failure: Mutex::new(None),
            send_delay: Mutex::new(Duration::ZERO),
            next_txid: AtomicU64::new(1),
        }
    }

    pub fn set_balance(&self, balance: Amount) {
        *self.balance.lock() = balance;
    }

    pub fn balance(&self) -> Amount {
        *self.balance.lock()
    }

    pub fn fail_balance_queries(&self, fail: bool) {
        self.fail_balance.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent send fail with `error` (or succeed again with `None`).
    pub fn fail_sends_with(&self, error: Option<WalletError>) {
        *self.send_failure.lock() = error;
    }

    /// Delay every send, simulating a slow wallet.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    pub fn sent(&self) -> Vec<SentPayment> {
        self.sent.lock().clone()
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSender for FakeWallet {
    async fn spendable_balance(&self, _account: &str) -> Result<Amount, WalletError> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(WalletError::Unreachable("fake wallet offline".into()));
        }
        Ok(*self.balance.lock())
    }

    async fn send_from_account(
        &self,
        account: &str,
        address: &Address,
        amount: Amount,
    ) -> Result<TxId, WalletError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.send_failure.lock().clone() {
            return Err(err);
        }

        {
            let mut balance = self.balance.lock();
            if *balance < amount {
                return Err(WalletError::Rejected {
                    code: -6,
                    message: "insufficient funds".into(),
                });
            }
            *balance = balance.saturating_sub(amount);
        }

        let n = self.next_txid.fetch_add(1, Ordering::SeqCst);
        let txid = TxId::new(format!("{n:064x}"));
        self.sent.lock().push(SentPayment {
            account: account.to_string(),
            address: address.clone(),
            amount,
            txid: txid.clone(),
        });
        Ok(txid)
    }
}

/// A well-formed address on `network` whose payload is `seed` repeated.
pub fn address_for(seed: u8, network: Network) -> Address {
    Address::new([seed; PAYLOAD_LEN], network)
}

/// Encoded testnet address for `seed`.
pub fn testnet_address(seed: u8) -> String {
    address_for(seed, Network::Testnet).encode()
}
