use std::{str::FromStr, sync::Arc};

use anyhow::{Result, anyhow, bail};
use clap::Subcommand;
use express_api::{
    CacheStore, ExchangeStatusRequest, ExpressApiClient, ExpressApiService,
    NATIVE_COIN_CONTRACT_ADDRESS, PairsRequest, RateType,
};
use express_manager::{
    Blockchain, Currency, ExpressManager, ExpressManagerBuilder, ExpressManagerConfig,
    ExpressManagerListener, ExpressManagerState, ExpressProvider, ExpressWallet, SwappingPair,
    WalletError,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::settings::Settings;

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Lists the provider catalog
    Providers,

    /// Lists the providers able to swap between two currencies
    Pairs {
        /// Source currency as `network:contract:decimals`, contract `0` for the native coin
        from: CurrencyArg,
        /// Destination currency, same format as the source
        to: CurrencyArg,
    },

    /// Resolves a swap and prints the resulting state with all quotes
    Quote {
        from: CurrencyArg,
        to: CurrencyArg,
        /// Amount to swap in source display units
        amount: Decimal,
        /// Only quote this provider
        #[arg(short, long)]
        provider: Option<String>,
        /// Wallet address receiving the swap and any refund
        #[arg(short, long)]
        address: String,
        /// Source balance of the wallet. Unlimited when omitted
        #[arg(short, long)]
        balance: Option<Decimal>,
        /// Request fixed rates instead of floating ones
        #[arg(long)]
        fixed: bool,
    },

    /// Polls the status of an exchange
    Status {
        /// Transaction id returned with the exchange data
        tx_id: String,
    },
}

/// A currency parsed from `network:contract:decimals`.
#[derive(Clone, Debug)]
pub struct CurrencyArg(pub Currency);

impl FromStr for CurrencyArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let [network, contract, decimals] = s.split(':').collect::<Vec<_>>()[..] else {
            bail!("Expected network:contract:decimals, got {s}");
        };
        let decimals: u32 = decimals
            .parse()
            .map_err(|e| anyhow!("Invalid decimals {decimals}: {e}"))?;
        if network.is_empty() || contract.is_empty() {
            bail!("Network and contract must not be empty in {s}");
        }
        let blockchain = Blockchain {
            network_id: network.to_string(),
            currency_id: network.to_string(),
            symbol: network.to_uppercase(),
            decimals,
        };
        let currency = if contract == NATIVE_COIN_CONTRACT_ADDRESS {
            Currency::coin(blockchain)
        } else {
            Currency::token(contract, blockchain, contract, contract, decimals)
        };
        Ok(Self(currency))
    }
}

/// Wallet with a single address and no on-chain lookups. Allowances are
/// reported as unlimited.
struct StaticWallet {
    address: String,
    balance: Option<Decimal>,
}

#[async_trait::async_trait]
impl ExpressWallet for StaticWallet {
    async fn address(&self, _currency: &Currency) -> Result<String, WalletError> {
        Ok(self.address.clone())
    }

    async fn balance(&self, _currency: &Currency) -> Result<Decimal, WalletError> {
        Ok(self.balance.unwrap_or(Decimal::MAX))
    }

    async fn allowance(&self, _currency: &Currency, _spender: &str) -> Result<Decimal, WalletError> {
        Ok(Decimal::MAX)
    }
}

struct CliStateListener {}

#[async_trait::async_trait]
impl ExpressManagerListener for CliStateListener {
    async fn on_state(&self, state: ExpressManagerState) {
        info!(
            "State: {}",
            serde_json::to_string(&state).unwrap_or_else(|_| "Failed to serialize state".to_string())
        );
    }
}

fn print_value<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) async fn execute_command(command: Command, settings: &Settings) -> Result<()> {
    let api: Arc<dyn ExpressApiService> = Arc::new(ExpressApiClient::new(
        settings.api_config(),
        Arc::new(CacheStore::default()),
    )?);

    match command {
        Command::Providers => print_value(&api.providers().await?),
        Command::Pairs { from, to } => {
            let pairs = api
                .pairs(PairsRequest {
                    from: vec![from.0.express_asset()],
                    to: vec![to.0.express_asset()],
                })
                .await?;
            print_value(&pairs)
        }
        Command::Quote {
            from,
            to,
            amount,
            provider,
            address,
            balance,
            fixed,
        } => {
            let config = ExpressManagerConfig {
                rate_type: if fixed { RateType::Fixed } else { RateType::Float },
                ..Default::default()
            };
            let manager =
                ExpressManagerBuilder::new(config, Arc::new(StaticWallet { address, balance }))
                    .with_api_service(api.clone())
                    .build()?;
            manager.add_listener(Box::new(CliStateListener {})).await;

            manager.update_pair(SwappingPair::new(from.0, to.0)?).await?;
            if let Some(provider_id) = provider {
                let provider = api
                    .providers()
                    .await?
                    .into_iter()
                    .find(|p| p.id == provider_id)
                    .ok_or_else(|| anyhow!("Unknown provider {provider_id}"))?;
                manager
                    .update_selected_provider(ExpressProvider::from(provider))
                    .await?;
            }
            let state = manager.update_amount(Some(amount)).await?;
            print_value(&serde_json::json!({
                "state": state,
                "quotes": manager.get_all_quotes().await,
            }))
        }
        Command::Status { tx_id } => {
            let status = api.exchange_status(ExchangeStatusRequest { tx_id }).await?;
            print_value(&serde_json::json!({
                "status": status,
                "terminal": status.external_tx_status.is_terminal(),
            }))
        }
    }
}
