use express_api::{
    ExpressAsset, NATIVE_COIN_CONTRACT_ADDRESS, ProviderInfo, ProviderType, RateType,
    TransactionType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ExpressManagerError;

/// Default validity window of the quotes of a resolution (10 seconds)
pub const DEFAULT_QUOTE_TTL_MS: u128 = 10_000;

/// A blockchain and its native coin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blockchain {
    /// Network identifier used by the Express backend, e.g. `polygon-pos`
    pub network_id: String,
    /// Rate lookup identifier of the native coin, e.g. `matic-network`
    pub currency_id: String,
    pub symbol: String,
    pub decimals: u32,
}

/// A blockchain's native coin or a token living on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub id: String,
    pub blockchain: Blockchain,
    pub contract_address: Option<String>,
    pub symbol: String,
    pub decimals: u32,
}

impl Currency {
    /// Creates the native coin of the given blockchain.
    pub fn coin(blockchain: Blockchain) -> Self {
        Self {
            id: blockchain.currency_id.clone(),
            symbol: blockchain.symbol.clone(),
            decimals: blockchain.decimals,
            contract_address: None,
            blockchain,
        }
    }

    pub fn token(
        id: impl Into<String>,
        blockchain: Blockchain,
        contract_address: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u32,
    ) -> Self {
        Self {
            id: id.into(),
            blockchain,
            contract_address: Some(contract_address.into()),
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn is_token(&self) -> bool {
        self.contract_address.is_some()
    }

    /// Identifier used to look up fiat rates: the token id for tokens, the
    /// blockchain's coin id otherwise.
    pub fn rate_id(&self) -> &str {
        if self.is_token() {
            &self.id
        } else {
            &self.blockchain.currency_id
        }
    }

    pub fn express_asset(&self) -> ExpressAsset {
        ExpressAsset {
            contract_address: self
                .contract_address
                .clone()
                .unwrap_or_else(|| NATIVE_COIN_CONTRACT_ADDRESS.to_string()),
            network: self.blockchain.network_id.clone(),
        }
    }

    /// Converts a display amount into the integer amount the backend expects.
    ///
    /// Fails for negative amounts and for amounts with more fractional digits
    /// than the currency supports.
    pub fn to_smallest_units(&self, amount: Decimal) -> Result<u128, ExpressManagerError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ExpressManagerError::InvalidAmount(format!(
                "{amount} is negative"
            )));
        }
        let normalized = amount.normalize();
        if normalized.scale() > self.decimals {
            return Err(ExpressManagerError::InvalidAmount(format!(
                "{amount} has more than {} fractional digits for {}",
                self.decimals, self.symbol
            )));
        }
        let mantissa = normalized.mantissa().unsigned_abs();
        10u128
            .checked_pow(self.decimals.saturating_sub(normalized.scale()))
            .and_then(|factor| mantissa.checked_mul(factor))
            .ok_or_else(|| {
                ExpressManagerError::InvalidAmount(format!(
                    "{amount} overflows the smallest units of {}",
                    self.symbol
                ))
            })
    }
}

/// Largest mantissa a [`Decimal`] can hold (2^96 - 1)
const MAX_DECIMAL_MANTISSA: u128 = (1 << 96) - 1;
const MAX_DECIMAL_SCALE: u32 = 28;

/// Converts an integer backend amount into a display amount.
///
/// Values beyond the precision of a [`Decimal`] lose their lowest fractional
/// digits. Only integer parts that do not fit fail.
pub(crate) fn from_smallest_units(value: u128, decimals: u32) -> Result<Decimal, ExpressManagerError> {
    let (mut mantissa, mut scale) = (value, decimals);
    while (mantissa > MAX_DECIMAL_MANTISSA || scale > MAX_DECIMAL_SCALE) && scale > 0 {
        mantissa /= 10;
        scale = scale.saturating_sub(1);
    }
    if scale < decimals {
        trace!("Truncated {value} with {decimals} decimals to scale {scale}");
    }
    let mantissa = i128::try_from(mantissa).map_err(|e| {
        ExpressManagerError::InvalidAmount(format!("{value} is out of range: {e}"))
    })?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|e| {
            ExpressManagerError::InvalidAmount(format!(
                "{value} with {decimals} decimals is out of range: {e}"
            ))
        })
}

/// The ordered (source, destination) selection of a swap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwappingPair {
    source: Currency,
    destination: Currency,
}

impl SwappingPair {
    pub fn new(source: Currency, destination: Currency) -> Result<Self, ExpressManagerError> {
        if source.express_asset() == destination.express_asset() {
            return Err(ExpressManagerError::invalid_input(format!(
                "Source and destination are both {}",
                source.symbol
            )));
        }
        Ok(Self {
            source,
            destination,
        })
    }

    pub fn source(&self) -> &Currency {
        &self.source
    }

    pub fn destination(&self) -> &Currency {
        &self.destination
    }
}

/// A third-party liquidity source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressProvider {
    pub id: String,
    pub name: String,
    pub provider_type: ProviderType,
    pub image_url: Option<String>,
    pub terms_of_use: Option<String>,
    pub privacy_policy: Option<String>,
}

impl From<ProviderInfo> for ExpressProvider {
    fn from(info: ProviderInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            provider_type: info.provider_type,
            image_url: info.image_large.or(info.image_small),
            terms_of_use: info.terms_of_use,
            privacy_policy: info.privacy_policy,
        }
    }
}

/// A provider's non-binding estimate for the current pair and amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressQuote {
    /// Amount sent, in source currency display units
    pub from_amount: Decimal,
    /// Amount expected to be received, in destination currency display units
    pub expect_amount: Decimal,
    /// Provider fee, in destination currency display units
    pub fee: Option<Decimal>,
    /// Contract that needs an allowance to spend the source token
    pub allowance_contract: Option<String>,
}

impl ExpressQuote {
    /// How many destination units one source unit yields.
    pub fn rate(&self) -> Option<Decimal> {
        self.expect_amount.checked_div(self.from_amount)
    }
}

/// Outcome of the quote request to a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteState {
    Quote(ExpressQuote),
    Restriction(ExpressManagerRestriction),
    Error(String),
}

impl QuoteState {
    pub fn quote(&self) -> Option<&ExpressQuote> {
        match self {
            QuoteState::Quote(quote) => Some(quote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressAvailableQuote {
    pub provider: ExpressProvider,
    pub state: QuoteState,
}

/// Why a ready state cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressManagerRestriction {
    /// The amount is below the provider minimum, in source display units
    TooSmallAmount { min_amount: Decimal },
    /// The amount is above the provider maximum, in source display units
    TooBigAmount { max_amount: Decimal },
    /// The spender contract needs an approval before swapping. Both fields are
    /// unknown when the backend declared the restriction itself.
    NotEnoughAllowance {
        spender: Option<String>,
        allowance: Option<Decimal>,
    },
    NotEnoughBalanceForSwapping { required: Decimal },
    /// No provider supports the pair, or the pinned one does not
    NoRoute,
    /// The pair is listed but none of its providers is available
    NoProvidersAvailable,
}

/// The provider-furnished payload needed to execute the swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressTransactionData {
    pub provider_id: String,
    pub tx_id: String,
    pub tx_type: TransactionType,
    pub source_address: Option<String>,
    pub destination_address: String,
    pub tx_data: Option<String>,
    /// Native coin value attached to the transaction, in smallest units
    pub tx_value: u128,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub extra_destination_id: Option<String>,
    pub external_tx_id: Option<String>,
    pub external_tx_url: Option<String>,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpressManagerState {
    #[default]
    Idle,
    /// Returned after the quote step
    Restriction(ExpressManagerRestriction),
    /// Returned after the exchange data step
    Ready(ExpressTransactionData),
}

#[derive(Debug, Clone)]
pub struct ExpressManagerConfig {
    /// How long the quotes of a resolution are reused by `update`
    pub quote_ttl_ms: u128,
    /// Rate type requested from the providers
    pub rate_type: RateType,
}

impl Default for ExpressManagerConfig {
    fn default() -> Self {
        Self {
            quote_ttl_ms: DEFAULT_QUOTE_TTL_MS,
            rate_type: RateType::Float,
        }
    }
}
