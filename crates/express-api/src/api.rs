use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    AssetInfo, AssetsRequest, ExchangeDataRequest, ExchangeDataResponse, ExchangeQuoteRequest,
    ExchangeStatusRequest, ExpressApiError, PairInfo, PairsRequest, ProviderInfo, QuoteResponse,
    StatusResponse, cache::CacheStore, config::ExpressApiConfig,
};

const PROVIDERS_CACHE_KEY: &str = "providers";
const PROVIDERS_TTL_MS: u32 = 10 * 60 * 1000;

/// Typed boundary to the Express exchange backend.
///
/// Every operation either returns the decoded response or fails with an
/// [`ExpressApiError`]. Implementations perform no retries.
#[async_trait::async_trait]
pub trait ExpressApiService: Send + Sync {
    /// Fetches backend metadata for the given assets.
    async fn assets(&self, request: AssetsRequest) -> Result<Vec<AssetInfo>, ExpressApiError>;

    /// Fetches the pairs available between the given source and destination assets.
    async fn pairs(&self, request: PairsRequest) -> Result<Vec<PairInfo>, ExpressApiError>;

    /// Fetches the provider catalog.
    async fn providers(&self) -> Result<Vec<ProviderInfo>, ExpressApiError>;

    /// Requests a non-binding quote from a single provider.
    async fn exchange_quote(
        &self,
        request: ExchangeQuoteRequest,
    ) -> Result<QuoteResponse, ExpressApiError>;

    /// Requests the signable transaction payload from a single provider.
    async fn exchange_data(
        &self,
        request: ExchangeDataRequest,
    ) -> Result<ExchangeDataResponse, ExpressApiError>;

    /// Polls the status of a previously created exchange.
    async fn exchange_status(
        &self,
        request: ExchangeStatusRequest,
    ) -> Result<StatusResponse, ExpressApiError>;
}

pub struct ExpressApiClient {
    pub(crate) config: ExpressApiConfig,
    pub(crate) cache_store: Arc<CacheStore>,
    pub(crate) http_client: reqwest::Client,
}

impl ExpressApiClient {
    pub fn new(
        config: ExpressApiConfig,
        cache_store: Arc<CacheStore>,
    ) -> Result<Self, ExpressApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            cache_store,
            http_client,
        })
    }
}

#[async_trait::async_trait]
impl ExpressApiService for ExpressApiClient {
    async fn assets(&self, request: AssetsRequest) -> Result<Vec<AssetInfo>, ExpressApiError> {
        self.post_request("assets", &request).await
    }

    async fn pairs(&self, request: PairsRequest) -> Result<Vec<PairInfo>, ExpressApiError> {
        self.post_request("pairs", &request).await
    }

    async fn providers(&self) -> Result<Vec<ProviderInfo>, ExpressApiError> {
        if let Some(providers) = self
            .cache_store
            .get::<Vec<ProviderInfo>>(PROVIDERS_CACHE_KEY)
            .await?
        {
            debug!("Using cached provider catalog");
            return Ok(providers);
        }
        let providers: Vec<ProviderInfo> = self.get_request("providers", None::<()>).await?;
        self.cache_store
            .set(PROVIDERS_CACHE_KEY, &providers, PROVIDERS_TTL_MS.into())
            .await?;
        Ok(providers)
    }

    async fn exchange_quote(
        &self,
        request: ExchangeQuoteRequest,
    ) -> Result<QuoteResponse, ExpressApiError> {
        self.get_request("exchange-quote", Some(request)).await
    }

    async fn exchange_data(
        &self,
        request: ExchangeDataRequest,
    ) -> Result<ExchangeDataResponse, ExpressApiError> {
        self.get_request("exchange-data", Some(request)).await
    }

    async fn exchange_status(
        &self,
        request: ExchangeStatusRequest,
    ) -> Result<StatusResponse, ExpressApiError> {
        self.get_request("exchange-status", Some(request)).await
    }
}
