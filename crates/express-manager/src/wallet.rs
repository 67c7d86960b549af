use rust_decimal::Decimal;

use crate::{Currency, WalletError};

/// Wallet state the manager needs before a swap can be executed.
///
/// Amounts are in display units of the given currency.
#[async_trait::async_trait]
pub trait ExpressWallet: Send + Sync {
    /// Receiving and refund address of the wallet for the currency's blockchain.
    async fn address(&self, currency: &Currency) -> Result<String, WalletError>;

    async fn balance(&self, currency: &Currency) -> Result<Decimal, WalletError>;

    /// How much of the token `spender` is currently allowed to move.
    async fn allowance(&self, currency: &Currency, spender: &str) -> Result<Decimal, WalletError>;
}
