//! # spigot-core
//! Payout coordination for the Spigot test-network faucet: amounts,
//! addresses, the per-identity rate limiter, the payout ledger, the cached
//! wallet balance and the coordinator that ties them together.

pub mod address;
pub mod amount;
pub mod balance;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod rate_limit;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use address::{Address, Bech32mValidator, Network};
pub use amount::Amount;
pub use balance::{BalanceState, BalanceTracker};
pub use coordinator::{FaucetStatus, PayoutContext, PayoutCoordinator, PayoutPolicy};
pub use error::{AddressError, AmountError, BalanceRefreshFailed, PayoutError, WalletError};
pub use traits::{AddressValidator, Clock, SystemClock, WalletSender};
pub use types::{ClientIdentity, Payout, PayoutRequest, TxId};
