use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, trace};

use crate::{Blockchain, Currency, RatesError};

/// Source of live fiat rates, keyed by currency id.
#[async_trait::async_trait]
pub trait FiatRatesService: Send + Sync {
    async fn fetch_rates(
        &self,
        currency_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, RatesError>;
}

/// Fiat conversion rates per currency id.
#[async_trait::async_trait]
pub trait RatesRepository: Send + Sync {
    /// Returns the rate, fetching it when it is not cached yet.
    async fn rate(&self, currency_id: &str) -> Result<Decimal, RatesError>;

    /// Best-effort lookup of an already known rate.
    fn cached_rate(&self, currency_id: &str) -> Option<Decimal>;
}

pub struct CommonRatesRepository {
    service: Arc<dyn FiatRatesService>,
    rates: RwLock<HashMap<String, Decimal>>,
}

impl CommonRatesRepository {
    pub fn new(service: Arc<dyn FiatRatesService>) -> Self {
        Self {
            service,
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches the rates of the given currencies and merges them into the cache.
    pub async fn refresh(&self, currency_ids: &[String]) -> Result<(), RatesError> {
        debug!("Refreshing fiat rates for {} currencies", currency_ids.len());
        let fetched = self.service.fetch_rates(currency_ids).await?;
        trace!("Fetched fiat rates: {fetched:?}");
        self.rates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(fetched);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RatesRepository for CommonRatesRepository {
    async fn rate(&self, currency_id: &str) -> Result<Decimal, RatesError> {
        if let Some(rate) = self.cached_rate(currency_id) {
            return Ok(rate);
        }
        self.refresh(&[currency_id.to_string()]).await?;
        self.cached_rate(currency_id)
            .ok_or_else(|| RatesError::UnknownCurrency(currency_id.to_string()))
    }

    fn cached_rate(&self, currency_id: &str) -> Option<Decimal> {
        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(currency_id)
            .copied()
    }
}

/// Fiat values of swap amounts, for display only.
pub struct SwappingRatesProvider {
    repository: Arc<dyn RatesRepository>,
}

impl SwappingRatesProvider {
    pub fn new(repository: Arc<dyn RatesRepository>) -> Self {
        Self { repository }
    }

    pub fn has_rates(&self, currency: &Currency) -> bool {
        self.repository.cached_rate(currency.rate_id()).is_some()
    }

    pub fn get_sync_fiat(&self, currency: &Currency, amount: Decimal) -> Option<Decimal> {
        self.sync_fiat(currency.rate_id(), amount)
    }

    pub async fn get_fiat(&self, currency: &Currency, amount: Decimal) -> Result<Decimal, RatesError> {
        self.fiat(currency.rate_id(), amount).await
    }

    /// Whether the rate of the blockchain's native coin is known, e.g. to show
    /// network fees in fiat.
    pub fn has_blockchain_rates(&self, blockchain: &Blockchain) -> bool {
        self.repository.cached_rate(&blockchain.currency_id).is_some()
    }

    pub fn get_sync_blockchain_fiat(&self, blockchain: &Blockchain, amount: Decimal) -> Option<Decimal> {
        self.sync_fiat(&blockchain.currency_id, amount)
    }

    pub async fn get_blockchain_fiat(
        &self,
        blockchain: &Blockchain,
        amount: Decimal,
    ) -> Result<Decimal, RatesError> {
        self.fiat(&blockchain.currency_id, amount).await
    }

    fn sync_fiat(&self, currency_id: &str, amount: Decimal) -> Option<Decimal> {
        self.repository
            .cached_rate(currency_id)
            .map(|rate| map_to_fiat(amount, rate))
    }

    async fn fiat(&self, currency_id: &str, amount: Decimal) -> Result<Decimal, RatesError> {
        let rate = self.repository.rate(currency_id).await?;
        Ok(map_to_fiat(amount, rate))
    }
}

/// Non-zero values are shown with at least one cent.
fn map_to_fiat(amount: Decimal, rate: Decimal) -> Decimal {
    let fiat_value = amount.saturating_mul(rate);
    if fiat_value.is_zero() {
        return Decimal::ZERO;
    }
    fiat_value
        .max(Decimal::new(1, 2))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
