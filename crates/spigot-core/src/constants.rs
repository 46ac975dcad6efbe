//! Faucet constants. All monetary values in units (1 coin = 10^8 units).

use std::time::Duration;

/// Units per whole coin.
pub const COIN: u64 = 100_000_000;

/// Number of fractional digits in a coin amount.
pub const COIN_DECIMALS: usize = 8;

/// The per-transaction limit is `spendable_balance / TRANSACTION_LIMIT_DIVISOR`.
pub const TRANSACTION_LIMIT_DIVISOR: u64 = 100;

/// Trailing window reported as "sent today".
pub const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// How long payout records are retained by the ledger.
///
/// Must be at least [`DAILY_WINDOW`] so the daily sum is exact.
pub const LEDGER_RETENTION: Duration = DAILY_WINDOW;

/// Longest cooldown, timeout or refresh interval the faucet accepts.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Minimum confirmations for spendable outputs when querying or spending.
pub const WALLET_MIN_CONF: u32 = 0;
