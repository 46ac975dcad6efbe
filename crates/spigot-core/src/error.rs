//! Error types for the Spigot faucet.
use thiserror::Error;

use crate::address::Network;
use crate::amount::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")] Empty,
    #[error("amount is not a decimal number")] Malformed,
    #[error("amount is negative")] Negative,
    #[error("amount has more than 8 decimal places")] TooPrecise,
    #[error("amount is too large")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid HRP")] InvalidHrp,
    #[error("invalid length")] InvalidLength,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid version: {0}")] InvalidVersion(u8),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("unknown network: {0}")] UnknownNetwork(String),
    #[error("missing separator")] MissingSeparator,
    #[error("mixed case")] MixedCase,
}

/// Failures reported by the external wallet.
///
/// Transport detail is kept for logs but left out of the display string,
/// which may reach end users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet unreachable")] Unreachable(String),
    #[error("wallet rejected request: {message}")] Rejected { code: i64, message: String },
    #[error("malformed wallet response")] MalformedResponse(String),
}

/// The balance tracker could not reach the wallet; the previous balance stays in effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("balance refresh failed: {0}")]
pub struct BalanceRefreshFailed(#[from] pub WalletError);

/// Outcome of a rejected or failed payout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount {requested} exceeds the transaction limit of {limit}")]
    AmountExceedsLimit { requested: Amount, limit: Amount },

    #[error("too many requests: try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("address {address} is not for {network}")]
    WrongNetwork { address: String, network: Network },

    #[error("failed to send funds: {cause}")]
    SubmissionFailed { cause: String },

    #[error("request cancelled")]
    Cancelled,
}

impl From<AmountError> for PayoutError {
    fn from(e: AmountError) -> Self {
        PayoutError::InvalidAmount(e.to_string())
    }
}

impl From<AddressError> for PayoutError {
    fn from(e: AddressError) -> Self {
        PayoutError::InvalidAddress(e.to_string())
    }
}

impl PayoutError {
    /// True for rejections decided before the wallet was contacted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PayoutError::InvalidAmount(_)
                | PayoutError::AmountExceedsLimit { .. }
                | PayoutError::RateLimited { .. }
                | PayoutError::InvalidAddress(_)
                | PayoutError::WrongNetwork { .. }
        )
    }
}
