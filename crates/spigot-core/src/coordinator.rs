//! The payout coordinator: the single serialization point for payouts.
//!
//! Every payout is evaluated and submitted under one process-wide lock, so
//! the rate-limit check, the balance-derived limit check and the wallet send
//! all see the same state and two requests can never both pass against a
//! snapshot the other is about to invalidate.
//!
//! Request lifecycle:
//!
//! ```text
//! Received -> AmountResolved -> LimitEnforced -> RateLimitChecked
//!          -> AddressValidated -> Submitted -> Succeeded | Failed
//! ```
//!
//! Everything up to the wallet call runs in the caller's future and may be
//! abandoned (dropped, or cut short by the [`PayoutContext`] deadline)
//! without side effects. From the wallet call onwards the work runs on a
//! detached task that owns the lock guard, so a send that completed on the
//! wallet side is always booked even if the caller has gone away.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address::{Address, Network};
use crate::amount::Amount;
use crate::balance::BalanceTracker;
use crate::constants::{DAILY_WINDOW, LEDGER_RETENTION};
use crate::error::PayoutError;
use crate::ledger::PayoutLedger;
use crate::rate_limit::RateLimiter;
use crate::traits::{AddressValidator, Clock, WalletSender};
use crate::types::{ClientIdentity, Payout, PayoutRequest};

/// Operator-configured payout rules.
#[derive(Clone, Debug)]
pub struct PayoutPolicy {
    /// Paid when the request names no amount, capped by the transaction limit.
    pub default_amount: Amount,
    /// Minimum time between successful payouts to one identity.
    pub cooldown: Duration,
    /// Secret that skips the cooldown. Unset or empty disables it.
    pub override_token: Option<String>,
    /// Network recipient addresses must belong to.
    pub network: Network,
}

impl PayoutPolicy {
    pub fn new(default_amount: Amount, cooldown: Duration, network: Network) -> Self {
        Self {
            default_amount,
            cooldown,
            override_token: None,
            network,
        }
    }

    pub fn with_override_token(mut self, token: impl Into<String>) -> Self {
        self.override_token = Some(token.into());
        self
    }

    fn override_matches(&self, supplied: Option<&str>) -> bool {
        match (self.override_token.as_deref(), supplied) {
            (Some(expected), Some(given)) if !expected.is_empty() => {
                tokens_equal(expected.as_bytes(), given.as_bytes())
            }
            _ => false,
        }
    }
}

/// Compare without stopping at the first differing byte.
fn tokens_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Per-request cancellation scope.
///
/// The deadline is honoured while waiting for the payout lock and once more
/// right before the wallet call; never after the send has started.
#[derive(Clone, Copy, Debug, Default)]
pub struct PayoutContext {
    deadline: Option<Instant>,
}

impl PayoutContext {
    /// No deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// A deadline `timeout` from now. A timeout too large to represent as an
    /// instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Point-in-time view for status pages. Taken without the payout lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FaucetStatus {
    pub network: Network,
    pub spendable: Amount,
    pub transaction_limit: Amount,
    pub balance_updated_at: DateTime<Utc>,
    pub default_amount: Amount,
    pub cooldown_secs: u64,
    pub sent_last_24h: Amount,
    pub payouts_last_24h: usize,
    pub lifetime_payouts: u64,
    pub lifetime_sent: Amount,
}

pub struct PayoutCoordinator {
    policy: PayoutPolicy,
    wallet: Arc<dyn WalletSender>,
    validator: Arc<dyn AddressValidator>,
    clock: Arc<dyn Clock>,
    balance: Arc<BalanceTracker>,
    /// The payout lock. Guards the rate limiter and serializes ledger writes.
    limiter: Arc<Mutex<RateLimiter>>,
    /// Written only while holding `limiter`; read freely by status queries.
    ledger: Arc<RwLock<PayoutLedger>>,
}

impl PayoutCoordinator {
    pub fn new(
        policy: PayoutPolicy,
        wallet: Arc<dyn WalletSender>,
        validator: Arc<dyn AddressValidator>,
        clock: Arc<dyn Clock>,
        balance: Arc<BalanceTracker>,
    ) -> Self {
        let limiter = RateLimiter::new(policy.cooldown);
        Self {
            policy,
            wallet,
            validator,
            clock,
            balance,
            limiter: Arc::new(Mutex::new(limiter)),
            ledger: Arc::new(RwLock::new(PayoutLedger::new(LEDGER_RETENTION))),
        }
    }

    pub fn balance(&self) -> &Arc<BalanceTracker> {
        &self.balance
    }

    /// Evaluate `request` and, if it passes, send the funds.
    pub async fn pay(
        &self,
        ctx: &PayoutContext,
        request: PayoutRequest,
    ) -> Result<Payout, PayoutError> {
        let identity = request.identity.clone();
        let result = self.evaluate_and_submit(ctx, request).await;
        if let Err(e) = &result {
            if e.is_validation() {
                debug!(%identity, reason = %e, "payout rejected");
            }
        }
        result
    }

    async fn evaluate_and_submit(
        &self,
        ctx: &PayoutContext,
        request: PayoutRequest,
    ) -> Result<Payout, PayoutError> {
        let PayoutRequest {
            identity,
            address,
            amount,
            override_token,
        } = request;

        // Explicit amounts are checked before any shared state is touched.
        let requested = parse_requested_amount(amount.as_deref())?;

        let limiter = self.acquire(ctx).await?;
        let now = self.clock.now();
        let limit = self.balance.snapshot().transaction_limit;

        let amount = requested.unwrap_or_else(|| self.policy.default_amount.min(limit));
        if amount.is_zero() {
            return Err(PayoutError::InvalidAmount(
                "amount must be greater than 0".into(),
            ));
        }
        if amount > limit {
            return Err(PayoutError::AmountExceedsLimit {
                requested: amount,
                limit,
            });
        }

        let bypass = self.policy.override_matches(override_token.as_deref());
        limiter.check(&identity, now, bypass)?;

        let address = self.validator.decode(&address)?;
        if !self
            .validator
            .belongs_to_network(&address, self.policy.network)
        {
            return Err(PayoutError::WrongNetwork {
                address: address.encode(),
                network: self.policy.network,
            });
        }

        if ctx.expired() {
            return Err(PayoutError::Cancelled);
        }

        let submission = Submission {
            wallet: self.wallet.clone(),
            clock: self.clock.clone(),
            balance: self.balance.clone(),
            ledger: self.ledger.clone(),
            identity,
            address,
            amount,
        };
        tokio::spawn(submission.run(limiter))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "payout task did not complete");
                Err(PayoutError::SubmissionFailed {
                    cause: "payout task aborted".into(),
                })
            })
    }

    async fn acquire(
        &self,
        ctx: &PayoutContext,
    ) -> Result<OwnedMutexGuard<RateLimiter>, PayoutError> {
        let lock = self.limiter.clone().lock_owned();
        match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, lock)
                .await
                .map_err(|_| PayoutError::Cancelled),
            None => Ok(lock.await),
        }
    }

    /// Current balance, limits and recent payout totals.
    pub fn status(&self) -> FaucetStatus {
        let now = self.clock.now();
        let balance = self.balance.snapshot();
        let ledger = self.ledger.read();
        FaucetStatus {
            network: self.policy.network,
            spendable: balance.spendable,
            transaction_limit: balance.transaction_limit,
            balance_updated_at: balance.updated_at,
            default_amount: self.policy.default_amount,
            cooldown_secs: self.policy.cooldown.as_secs(),
            sent_last_24h: ledger.sum_since(now, DAILY_WINDOW),
            payouts_last_24h: ledger.count_since(now, DAILY_WINDOW),
            lifetime_payouts: ledger.lifetime_count(),
            lifetime_sent: ledger.lifetime_amount(),
        }
    }
}

fn parse_requested_amount(input: Option<&str>) -> Result<Option<Amount>, PayoutError> {
    let Some(text) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let amount = Amount::parse_coins(text)?;
    if amount.is_zero() {
        return Err(PayoutError::InvalidAmount(
            "amount must be greater than 0".into(),
        ));
    }
    Ok(Some(amount))
}

/// The wallet call and its bookkeeping, run while holding the payout lock.
struct Submission {
    wallet: Arc<dyn WalletSender>,
    clock: Arc<dyn Clock>,
    balance: Arc<BalanceTracker>,
    ledger: Arc<RwLock<PayoutLedger>>,
    identity: ClientIdentity,
    address: Address,
    amount: Amount,
}

impl Submission {
    async fn run(self, mut limiter: OwnedMutexGuard<RateLimiter>) -> Result<Payout, PayoutError> {
        let account = self.balance.account();
        let txid = match self
            .wallet
            .send_from_account(account, &self.address, self.amount)
            .await
        {
            Ok(txid) => txid,
            Err(e) => {
                warn!(
                    identity = %self.identity,
                    address = %self.address,
                    amount = %self.amount,
                    error = %e,
                    detail = ?e,
                    "payout send failed"
                );
                return Err(PayoutError::SubmissionFailed {
                    cause: e.to_string(),
                });
            }
        };

        let completed = self.clock.now();
        limiter.record(&self.identity, completed);
        self.ledger.write().record(completed, self.amount);
        self.balance.request_refresh();
        drop(limiter);

        info!(
            %txid,
            amount = %self.amount,
            identity = %self.identity,
            address = %self.address,
            "payout sent"
        );
        Ok(Payout {
            txid,
            amount: self.amount,
            address: self.address,
        })
    }
}
