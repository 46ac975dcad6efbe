//! Cached wallet balance and the per-transaction limit derived from it.
//!
//! The tracker is refreshed once at startup (fatal on failure), then by a
//! single background task that wakes on a fixed interval and whenever a
//! payout requests it. Running every later refresh on one task keeps
//! refreshes from overlapping, so a slow response can never overwrite a
//! newer balance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::amount::Amount;
use crate::constants::{MAX_INTERVAL, TRANSACTION_LIMIT_DIVISOR};
use crate::error::BalanceRefreshFailed;
use crate::traits::{Clock, WalletSender};

/// Spendable balance and the largest single payout it allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BalanceState {
    pub spendable: Amount,
    pub transaction_limit: Amount,
    pub updated_at: DateTime<Utc>,
}

impl BalanceState {
    pub fn new(spendable: Amount, updated_at: DateTime<Utc>) -> Self {
        Self {
            spendable,
            transaction_limit: Amount::from_units(spendable.units() / TRANSACTION_LIMIT_DIVISOR),
            updated_at,
        }
    }
}

pub struct BalanceTracker {
    wallet: Arc<dyn WalletSender>,
    clock: Arc<dyn Clock>,
    account: String,
    state: RwLock<BalanceState>,
    refresh_requested: Notify,
}

impl BalanceTracker {
    /// Query the wallet once and build a tracker from the result.
    ///
    /// Fails if the wallet cannot be reached: the faucet must not serve
    /// payouts without a known transaction limit.
    pub async fn initialize(
        wallet: Arc<dyn WalletSender>,
        clock: Arc<dyn Clock>,
        account: impl Into<String>,
    ) -> Result<Self, BalanceRefreshFailed> {
        let account = account.into();
        let spendable = wallet.spendable_balance(&account).await?;
        let state = BalanceState::new(spendable, clock.now());
        info!(
            %account,
            balance = %state.spendable,
            limit = %state.transaction_limit,
            "initial balance"
        );
        Ok(Self {
            wallet,
            clock,
            account,
            state: RwLock::new(state),
            refresh_requested: Notify::new(),
        })
    }

    /// Current balance state. Never waits on the wallet.
    pub fn snapshot(&self) -> BalanceState {
        *self.state.read()
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Re-query the wallet and replace the cached state.
    ///
    /// On failure the previous state is left untouched.
    pub async fn refresh(&self) -> Result<BalanceState, BalanceRefreshFailed> {
        let spendable = self.wallet.spendable_balance(&self.account).await?;
        let next = BalanceState::new(spendable, self.clock.now());
        let previous = std::mem::replace(&mut *self.state.write(), next);
        if previous.spendable != next.spendable {
            info!(
                from = %previous.spendable,
                to = %next.spendable,
                limit = %next.transaction_limit,
                "balance updated"
            );
        } else {
            debug!(balance = %next.spendable, "balance unchanged");
        }
        Ok(next)
    }

    /// Ask the background refresher to run as soon as possible.
    ///
    /// Requests made while a refresh is running coalesce into one follow-up.
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    /// Spawn the task that refreshes every `every` and on request.
    ///
    /// `every` is capped at [`MAX_INTERVAL`].
    pub fn spawn_refresher(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        let every = every.min(MAX_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.refresh_requested.notified() => {}
                }
                if let Err(e) = self.refresh().await {
                    warn!(error = %e, detail = ?e.0, "keeping previous balance");
                }
            }
        })
    }
}
