//! Rolling record of successful payouts.
//!
//! Records are kept in a time-ordered [`VecDeque`]. Each write evicts
//! records older than the retention window from the front, so memory stays
//! bounded by the payout rate rather than growing for the life of the
//! process. Lifetime totals are tracked separately and survive eviction.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::amount::Amount;

/// One successful payout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayoutRecord {
    pub timestamp: DateTime<Utc>,
    pub amount: Amount,
}

#[derive(Debug)]
pub struct PayoutLedger {
    records: VecDeque<PayoutRecord>,
    retention: Duration,
    lifetime_count: u64,
    lifetime_amount: Amount,
}

impl PayoutLedger {
    /// Create an empty ledger keeping records for `retention`.
    ///
    /// [`sum_since`](Self::sum_since) is exact only for windows no longer
    /// than `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            records: VecDeque::new(),
            retention,
            lifetime_count: 0,
            lifetime_amount: Amount::ZERO,
        }
    }

    /// Append a payout and evict records that have aged out.
    pub fn record(&mut self, now: DateTime<Utc>, amount: Amount) {
        // Keep the queue ordered if the wall clock steps backwards.
        let timestamp = match self.records.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.records.push_back(PayoutRecord { timestamp, amount });
        self.lifetime_count += 1;
        self.lifetime_amount = self.lifetime_amount.saturating_add(amount);
        self.evict(now);
    }

    /// Sum of amounts recorded less than `window` before `now`.
    pub fn sum_since(&self, now: DateTime<Utc>, window: Duration) -> Amount {
        self.within(now, window)
            .fold(Amount::ZERO, |acc, r| acc.saturating_add(r.amount))
    }

    /// Number of payouts recorded less than `window` before `now`.
    pub fn count_since(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.within(now, window).count()
    }

    pub fn lifetime_count(&self) -> u64 {
        self.lifetime_count
    }

    pub fn lifetime_amount(&self) -> Amount {
        self.lifetime_amount
    }

    /// Records currently retained.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> impl Iterator<Item = &PayoutRecord> + '_ {
        self.records
            .iter()
            .rev()
            .take_while(move |r| age(now, r.timestamp) < window)
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while self
            .records
            .front()
            .is_some_and(|r| age(now, r.timestamp) >= self.retention)
        {
            self.records.pop_front();
        }
    }
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}
