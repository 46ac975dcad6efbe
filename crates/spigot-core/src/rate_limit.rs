//! Per-identity cooldown between successful payouts.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::PayoutError;
use crate::types::ClientIdentity;

/// Tracks the last successful payout per identity to enforce a cooldown.
///
/// Checking and recording are separate calls: the coordinator checks before
/// contacting the wallet and records only once the send has succeeded.
/// Entries are never expired; a stale entry simply stops blocking once its
/// cooldown has elapsed.
#[derive(Debug)]
pub struct RateLimiter {
    last_success: HashMap<ClientIdentity, DateTime<Utc>>,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_success: HashMap::new(),
            cooldown,
        }
    }

    /// Check whether `identity` may receive a payout at `now`.
    ///
    /// With `bypass` set the cooldown is not consulted at all.
    pub fn check(
        &self,
        identity: &ClientIdentity,
        now: DateTime<Utc>,
        bypass: bool,
    ) -> Result<(), PayoutError> {
        if bypass {
            debug!(%identity, "rate limit bypassed by override token");
            return Ok(());
        }
        match self.remaining(identity, now) {
            Some(remaining) => Err(PayoutError::RateLimited {
                retry_after_secs: ceil_secs(remaining),
            }),
            None => Ok(()),
        }
    }

    /// Record a successful payout for `identity` at `now`.
    pub fn record(&mut self, identity: &ClientIdentity, now: DateTime<Utc>) {
        self.last_success.insert(identity.clone(), now);
    }

    pub fn len(&self) -> usize {
        self.last_success.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_success.is_empty()
    }

    fn remaining(&self, identity: &ClientIdentity, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_success.get(identity)?;
        // A timestamp in the future (clock stepped back) counts as no time elapsed.
        let elapsed = (now - *last).to_std().unwrap_or(Duration::ZERO);
        self.cooldown.checked_sub(elapsed).filter(|r| !r.is_zero())
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_nanos().div_ceil(1_000_000_000) as u64
}
