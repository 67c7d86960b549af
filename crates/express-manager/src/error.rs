use express_api::ExpressApiError;
use thiserror::Error;

/// Error type for the `ExpressManager`.
///
/// Business restrictions are never reported through this type, they are part of
/// [`crate::ExpressManagerState`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressManagerError {
    #[error("Express API error: {0}")]
    Api(#[from] ExpressApiError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// The amount cannot be represented with the currency decimals
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ExpressManagerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Error reported by the wallet collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WalletError {
    #[error("No address for currency {0}")]
    MissingAddress(String),

    #[error("Balance unavailable: {0}")]
    Balance(String),

    #[error("Allowance unavailable: {0}")]
    Allowance(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RatesError {
    #[error("No rate for currency {0}")]
    UnknownCurrency(String),

    #[error("Rates service error: {0}")]
    Service(String),
}
