use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use express_api::{
    AssetInfo, AssetsRequest, ExchangeDataRequest, ExchangeDataResponse, ExchangeQuoteRequest,
    ExchangeStatus, ExchangeStatusRequest, ExpressApiError, ExpressApiErrorBody,
    ExpressApiErrorCode, ExpressApiService, PairInfo, PairProvider, PairsRequest, ProviderInfo,
    ProviderType, QuoteResponse, RateType, StatusResponse, TransactionType,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    Blockchain, Currency, ExpressProvider, ExpressWallet, FiatRatesService, RatesError,
    WalletError,
};

pub const USDC_POLYGON_CONTRACT: &str = "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359";

pub fn polygon() -> Blockchain {
    Blockchain {
        network_id: "polygon-pos".to_string(),
        currency_id: "matic-network".to_string(),
        symbol: "MATIC".to_string(),
        decimals: 18,
    }
}

pub fn matic() -> Currency {
    Currency::coin(polygon())
}

pub fn usdc() -> Currency {
    Currency::token("usd-coin", polygon(), USDC_POLYGON_CONTRACT, "USDC", 6)
}

pub fn provider_info(id: &str) -> ProviderInfo {
    ProviderInfo {
        id: id.to_string(),
        name: id.to_uppercase(),
        provider_type: ProviderType::Dex,
        image_large: Some(format!("https://img.test/{id}-large.png")),
        image_small: None,
        terms_of_use: None,
        privacy_policy: None,
    }
}

pub fn provider(id: &str) -> ExpressProvider {
    provider_info(id).into()
}

/// Quote of `from_amount` USDC into `to_amount` MATIC, both in display units.
pub fn usdc_to_matic_quote(from_amount: u64, to_amount: u64) -> QuoteResponse {
    QuoteResponse {
        from_amount: u128::from(from_amount) * 10u128.pow(6),
        from_decimals: 6,
        to_amount: u128::from(to_amount) * 10u128.pow(18),
        to_decimals: 18,
        fee_amount: None,
        allowance_contract: None,
    }
}

pub fn api_error(
    code: u32,
    min_amount: Option<u128>,
    max_amount: Option<u128>,
    decimals: Option<u32>,
) -> ExpressApiError {
    ExpressApiError::Api(ExpressApiErrorBody {
        code: ExpressApiErrorCode::from(code),
        description: Some(format!("error {code}")),
        min_amount,
        max_amount,
        decimals,
    })
}

/// In-memory [`ExpressApiService`] answering from configured responses.
#[derive(Default)]
pub struct MockExpressApi {
    providers: Mutex<Vec<ProviderInfo>>,
    pairs: Mutex<Vec<PairInfo>>,
    pairs_error: Mutex<Option<ExpressApiError>>,
    quotes: Mutex<HashMap<String, Result<QuoteResponse, ExpressApiError>>>,
    exchange_data_errors: Mutex<HashMap<String, ExpressApiError>>,
    quote_requests: Mutex<Vec<ExchangeQuoteRequest>>,
    data_requests: Mutex<Vec<ExchangeDataRequest>>,
    pairs_calls: AtomicUsize,
    providers_calls: AtomicUsize,
}

impl MockExpressApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&self, id: &str) -> &Self {
        self.providers.lock().unwrap().push(provider_info(id));
        self
    }

    pub fn add_pair(&self, from: &Currency, to: &Currency, provider_ids: &[&str]) -> &Self {
        self.pairs.lock().unwrap().push(PairInfo {
            from: from.express_asset(),
            to: to.express_asset(),
            providers: provider_ids
                .iter()
                .map(|id| PairProvider {
                    provider_id: (*id).to_string(),
                    rate_types: vec![RateType::Float],
                })
                .collect(),
        });
        self
    }

    pub fn set_pairs_error(&self, error: ExpressApiError) -> &Self {
        *self.pairs_error.lock().unwrap() = Some(error);
        self
    }

    pub fn set_quote(&self, provider_id: &str, quote: Result<QuoteResponse, ExpressApiError>) -> &Self {
        debug!("Set quote for {provider_id}: {quote:?}");
        self.quotes
            .lock()
            .unwrap()
            .insert(provider_id.to_string(), quote);
        self
    }

    pub fn set_exchange_data_error(&self, provider_id: &str, error: ExpressApiError) -> &Self {
        self.exchange_data_errors
            .lock()
            .unwrap()
            .insert(provider_id.to_string(), error);
        self
    }

    pub fn quote_requests(&self) -> Vec<ExchangeQuoteRequest> {
        self.quote_requests.lock().unwrap().clone()
    }

    pub fn data_requests(&self) -> Vec<ExchangeDataRequest> {
        self.data_requests.lock().unwrap().clone()
    }

    pub fn pairs_calls(&self) -> usize {
        self.pairs_calls.load(Ordering::SeqCst)
    }

    pub fn providers_calls(&self) -> usize {
        self.providers_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExpressApiService for MockExpressApi {
    async fn assets(&self, request: AssetsRequest) -> Result<Vec<AssetInfo>, ExpressApiError> {
        Ok(request
            .tokens_list
            .into_iter()
            .map(|asset| AssetInfo {
                contract_address: asset.contract_address,
                network: asset.network,
                token: None,
                name: None,
                symbol: None,
                decimals: 18,
                is_active: true,
                exchange_available: true,
            })
            .collect())
    }

    async fn pairs(&self, request: PairsRequest) -> Result<Vec<PairInfo>, ExpressApiError> {
        self.pairs_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.pairs_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .iter()
            .filter(|pair| request.from.contains(&pair.from) && request.to.contains(&pair.to))
            .cloned()
            .collect())
    }

    async fn providers(&self) -> Result<Vec<ProviderInfo>, ExpressApiError> {
        self.providers_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.providers.lock().unwrap().clone())
    }

    async fn exchange_quote(
        &self,
        request: ExchangeQuoteRequest,
    ) -> Result<QuoteResponse, ExpressApiError> {
        self.quote_requests.lock().unwrap().push(request.clone());
        self.quotes
            .lock()
            .unwrap()
            .get(&request.provider_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(ExpressApiError::Request {
                    reason: format!("no quote configured for {}", request.provider_id),
                    code: Some(500),
                })
            })
    }

    async fn exchange_data(
        &self,
        request: ExchangeDataRequest,
    ) -> Result<ExchangeDataResponse, ExpressApiError> {
        self.data_requests.lock().unwrap().push(request.clone());
        if let Some(error) = self
            .exchange_data_errors
            .lock()
            .unwrap()
            .get(&request.provider_id)
        {
            return Err(error.clone());
        }
        let to_amount = self
            .quotes
            .lock()
            .unwrap()
            .get(&request.provider_id)
            .and_then(|quote| quote.as_ref().ok())
            .map_or(0, |quote| quote.to_amount);
        Ok(ExchangeDataResponse {
            tx_id: format!("tx-{}", request.provider_id),
            tx_type: TransactionType::Swap,
            from_amount: request.from_amount,
            from_decimals: request.from_decimals,
            to_amount,
            to_decimals: request.to_decimals,
            tx_from: None,
            tx_to: "0xrouter".to_string(),
            tx_data: Some("0xdeadbeef".to_string()),
            tx_extra_id: None,
            tx_value: 0,
            external_tx_id: None,
            external_tx_url: None,
        })
    }

    async fn exchange_status(
        &self,
        request: ExchangeStatusRequest,
    ) -> Result<StatusResponse, ExpressApiError> {
        Ok(StatusResponse {
            provider_id: request.tx_id,
            external_tx_id: None,
            external_tx_status: ExchangeStatus::New,
            external_tx_url: None,
            refund_network: None,
            refund_contract_address: None,
        })
    }
}

/// Wallet with one address per network. Balances and allowances are unlimited
/// unless configured.
#[derive(Default)]
pub struct MockWallet {
    balances: Mutex<HashMap<String, Decimal>>,
    allowances: Mutex<HashMap<(String, String), Decimal>>,
    allowance_calls: AtomicUsize,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address_for(currency: &Currency) -> String {
        format!("0xwallet-{}", currency.blockchain.network_id)
    }

    pub fn set_balance(&self, currency: &Currency, balance: Decimal) -> &Self {
        self.balances
            .lock()
            .unwrap()
            .insert(currency.id.clone(), balance);
        self
    }

    pub fn set_allowance(&self, currency: &Currency, spender: &str, allowance: Decimal) -> &Self {
        self.allowances
            .lock()
            .unwrap()
            .insert((currency.id.clone(), spender.to_string()), allowance);
        self
    }

    pub fn allowance_calls(&self) -> usize {
        self.allowance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExpressWallet for MockWallet {
    async fn address(&self, currency: &Currency) -> Result<String, WalletError> {
        Ok(Self::address_for(currency))
    }

    async fn balance(&self, currency: &Currency) -> Result<Decimal, WalletError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&currency.id)
            .copied()
            .unwrap_or(Decimal::MAX))
    }

    async fn allowance(&self, currency: &Currency, spender: &str) -> Result<Decimal, WalletError> {
        self.allowance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(currency.id.clone(), spender.to_string()))
            .copied()
            .unwrap_or(Decimal::MAX))
    }
}

pub struct MockFiatRatesService {
    rates: HashMap<String, Decimal>,
    fetch_count: AtomicUsize,
}

impl MockFiatRatesService {
    pub fn new(rates: HashMap<String, Decimal>) -> Self {
        Self {
            rates,
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FiatRatesService for MockFiatRatesService {
    async fn fetch_rates(
        &self,
        currency_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, RatesError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        Ok(currency_ids
            .iter()
            .filter_map(|id| self.rates.get(id).map(|rate| (id.clone(), *rate)))
            .collect())
    }
}
