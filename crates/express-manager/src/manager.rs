use std::sync::Arc;

use express_api::{
    ExchangeDataRequest, ExchangeQuoteRequest, ExpressApiError, ExpressApiErrorBody,
    ExpressApiErrorCode, ExpressApiService, PairsRequest, QuoteResponse,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Currency, ExpressAvailableQuote, ExpressManagerConfig, ExpressManagerError,
    ExpressManagerListener, ExpressManagerRestriction, ExpressManagerState, ExpressProvider,
    ExpressQuote, ExpressTransactionData, ExpressWallet, QuoteState, StateEmitter, SwappingPair,
    models::from_smallest_units,
    provider_selection::{aggregate_restriction, select_best_quote},
    utils::expiring_cell::ExpiringCell,
};

/// Coordinates pair, amount and provider selection of a swap session and
/// resolves them into an [`ExpressManagerState`].
///
/// Every mutating operation re-resolves the state, stores it as the last state
/// and emits it to the registered listeners. Business restrictions are returned
/// as [`ExpressManagerState::Restriction`], only infrastructure failures and
/// invalid input are errors. A failed call leaves the last state unchanged.
#[async_trait::async_trait]
pub trait ExpressManager: Send + Sync {
    async fn get_pair(&self) -> Option<SwappingPair>;

    /// Replaces the pair. A pinned provider that does not support the new pair
    /// is unpinned, and an amount with more fractional digits than the new
    /// source currency allows is cleared.
    async fn update_pair(
        &self,
        pair: SwappingPair,
    ) -> Result<ExpressManagerState, ExpressManagerError>;

    async fn get_amount(&self) -> Option<Decimal>;

    /// Replaces the amount, in source currency display units. `None` and zero
    /// resolve to [`ExpressManagerState::Idle`].
    async fn update_amount(
        &self,
        amount: Option<Decimal>,
    ) -> Result<ExpressManagerState, ExpressManagerError>;

    /// Quote of the provider the last resolution selected.
    async fn get_selected_quote(&self) -> Option<ExpressAvailableQuote>;

    /// Outcomes of every provider quoted by the last resolution, in catalog order.
    async fn get_all_quotes(&self) -> Vec<ExpressAvailableQuote>;

    /// Pins the provider. Resolution then uses only this provider.
    async fn update_selected_provider(
        &self,
        provider: ExpressProvider,
    ) -> Result<ExpressManagerState, ExpressManagerError>;

    /// Re-resolves the current inputs, reusing quotes that are still fresh.
    async fn update(&self) -> Result<ExpressManagerState, ExpressManagerError>;

    async fn get_state(&self) -> ExpressManagerState;

    async fn add_listener(&self, listener: Box<dyn ExpressManagerListener>) -> String;

    async fn remove_listener(&self, id: &str) -> bool;
}

/// Providers able to swap a pair, or the reason there are none.
#[derive(Clone, Debug)]
enum PairRoute {
    NoRoute,
    NoProvidersAvailable,
    Providers(Vec<ExpressProvider>),
}

/// Quote outcome of a single provider, keeping the original error.
#[derive(Clone, Debug)]
struct ProviderQuote {
    provider: ExpressProvider,
    result: Result<QuoteState, ExpressManagerError>,
}

impl ProviderQuote {
    fn available(&self) -> ExpressAvailableQuote {
        ExpressAvailableQuote {
            provider: self.provider.clone(),
            state: match &self.result {
                Ok(state) => state.clone(),
                Err(e) => QuoteState::Error(e.to_string()),
            },
        }
    }
}

#[derive(Default)]
struct SessionState {
    pair: Option<SwappingPair>,
    amount: Option<Decimal>,
    pinned_provider: Option<ExpressProvider>,
    /// Provider catalog, fetched once per session
    catalog: Option<Vec<ExpressProvider>>,
    pair_route: Option<(SwappingPair, PairRoute)>,
    quotes: ExpiringCell<Vec<ProviderQuote>>,
    last_quotes: Vec<ProviderQuote>,
    selected_provider_id: Option<String>,
}

impl SessionState {
    fn clear_quotes(&mut self) {
        self.quotes.clear();
        self.last_quotes.clear();
        self.selected_provider_id = None;
    }
}

pub struct CommonExpressManager {
    api: Arc<dyn ExpressApiService>,
    wallet: Arc<dyn ExpressWallet>,
    config: ExpressManagerConfig,
    session: Mutex<SessionState>,
    last_state: RwLock<ExpressManagerState>,
    emitter: StateEmitter,
}

impl CommonExpressManager {
    pub fn new(
        api: Arc<dyn ExpressApiService>,
        wallet: Arc<dyn ExpressWallet>,
        config: ExpressManagerConfig,
    ) -> Self {
        Self {
            api,
            wallet,
            config,
            session: Mutex::new(SessionState::default()),
            last_state: RwLock::new(ExpressManagerState::Idle),
            emitter: StateEmitter::new(),
        }
    }

    /// Resolves the session and publishes the result.
    ///
    /// Runs with the session locked, so listeners must not call back into the manager.
    async fn resolve_and_publish(
        &self,
        session: &mut SessionState,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let state = self.resolve(session).await?;
        debug!("Resolved state: {state:?}");
        *self.last_state.write().await = state.clone();
        self.emitter.emit(&state).await;
        Ok(state)
    }

    async fn resolve(
        &self,
        session: &mut SessionState,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let (Some(pair), Some(amount)) = (session.pair.clone(), session.amount) else {
            session.clear_quotes();
            return Ok(ExpressManagerState::Idle);
        };
        if amount.is_zero() {
            session.clear_quotes();
            return Ok(ExpressManagerState::Idle);
        }

        let quotes = if let Some(quotes) = session.quotes.get() {
            debug!("Reusing {} fresh quote(s)", quotes.len());
            quotes
        } else {
            let providers = match self.candidate_providers(session, &pair).await? {
                PairRoute::Providers(providers) => providers,
                PairRoute::NoRoute => {
                    session.clear_quotes();
                    return Ok(ExpressManagerState::Restriction(
                        ExpressManagerRestriction::NoRoute,
                    ));
                }
                PairRoute::NoProvidersAvailable => {
                    session.clear_quotes();
                    return Ok(ExpressManagerState::Restriction(
                        ExpressManagerRestriction::NoProvidersAvailable,
                    ));
                }
            };
            let quotes = self.request_quotes(&pair, amount, providers).await?;
            // Rounds where every provider failed are retried on the next update
            if quotes.iter().any(|q| q.result.is_ok()) {
                session.quotes.set(quotes.clone(), self.config.quote_ttl_ms);
            }
            quotes
        };

        let available: Vec<ExpressAvailableQuote> =
            quotes.iter().map(ProviderQuote::available).collect();
        session.last_quotes = quotes;

        if let Some((provider, quote)) = select_best_quote(&available) {
            info!(
                "Selected provider {} expecting {} {}",
                provider.id,
                quote.expect_amount,
                pair.destination().symbol
            );
            session.selected_provider_id = Some(provider.id.clone());
            return self.ready_state(&pair, amount, provider, quote).await;
        }

        session.selected_provider_id = session.pinned_provider.as_ref().map(|p| p.id.clone());
        if let Some(restriction) = aggregate_restriction(&available) {
            info!("No provider can swap {amount} {}: {restriction:?}", pair.source().symbol);
            return Ok(ExpressManagerState::Restriction(restriction));
        }
        match session
            .last_quotes
            .iter()
            .find_map(|q| q.result.as_ref().err())
        {
            Some(e) => Err(e.clone()),
            None => Ok(ExpressManagerState::Restriction(
                ExpressManagerRestriction::NoProvidersAvailable,
            )),
        }
    }

    async fn catalog(
        &self,
        session: &mut SessionState,
    ) -> Result<Vec<ExpressProvider>, ExpressManagerError> {
        if let Some(catalog) = &session.catalog {
            return Ok(catalog.clone());
        }
        let catalog: Vec<ExpressProvider> = self
            .api
            .providers()
            .await?
            .into_iter()
            .map(ExpressProvider::from)
            .collect();
        debug!("Loaded provider catalog with {} provider(s)", catalog.len());
        session.catalog = Some(catalog.clone());
        Ok(catalog)
    }

    /// Providers supporting the exact pair, in catalog order.
    async fn pair_route(
        &self,
        session: &mut SessionState,
        pair: &SwappingPair,
    ) -> Result<PairRoute, ExpressManagerError> {
        if let Some((cached_pair, route)) = &session.pair_route
            && cached_pair == pair
        {
            return Ok(route.clone());
        }

        let catalog = self.catalog(session).await?;
        let source = pair.source().express_asset();
        let destination = pair.destination().express_asset();
        let pairs = self
            .api
            .pairs(PairsRequest {
                from: vec![source.clone()],
                to: vec![destination.clone()],
            })
            .await?;
        let provider_ids: Vec<String> = pairs
            .into_iter()
            .filter(|info| info.from == source && info.to == destination)
            .flat_map(|info| info.providers)
            .map(|provider| provider.provider_id)
            .collect();

        let route = if provider_ids.is_empty() {
            PairRoute::NoRoute
        } else {
            let providers: Vec<ExpressProvider> = catalog
                .into_iter()
                .filter(|provider| provider_ids.contains(&provider.id))
                .collect();
            if providers.is_empty() {
                PairRoute::NoProvidersAvailable
            } else {
                PairRoute::Providers(providers)
            }
        };
        debug!(
            "Route for {} -> {}: {route:?}",
            pair.source().symbol,
            pair.destination().symbol
        );
        session.pair_route = Some((pair.clone(), route.clone()));
        Ok(route)
    }

    /// Narrows the pair route down to the pinned provider, if any.
    async fn candidate_providers(
        &self,
        session: &mut SessionState,
        pair: &SwappingPair,
    ) -> Result<PairRoute, ExpressManagerError> {
        let providers = match self.pair_route(session, pair).await? {
            PairRoute::Providers(providers) => providers,
            other => return Ok(other),
        };
        let Some(pinned) = &session.pinned_provider else {
            return Ok(PairRoute::Providers(providers));
        };
        Ok(match providers.into_iter().find(|p| p.id == pinned.id) {
            Some(provider) => PairRoute::Providers(vec![provider]),
            None => {
                debug!("Pinned provider {} does not support the pair", pinned.id);
                PairRoute::NoRoute
            }
        })
    }

    async fn request_quotes(
        &self,
        pair: &SwappingPair,
        amount: Decimal,
        providers: Vec<ExpressProvider>,
    ) -> Result<Vec<ProviderQuote>, ExpressManagerError> {
        let source = pair.source();
        let destination = pair.destination();
        let from_amount = source.to_smallest_units(amount)?;
        let source_asset = source.express_asset();
        let destination_asset = destination.express_asset();
        debug!(
            "Requesting quotes for {amount} {} from {} provider(s)",
            source.symbol,
            providers.len()
        );

        let requests = providers.into_iter().map(|provider| {
            let request = ExchangeQuoteRequest {
                from_contract_address: source_asset.contract_address.clone(),
                from_network: source_asset.network.clone(),
                to_contract_address: destination_asset.contract_address.clone(),
                to_network: destination_asset.network.clone(),
                from_amount,
                from_decimals: source.decimals,
                to_decimals: destination.decimals,
                provider_id: provider.id.clone(),
                rate_type: self.config.rate_type,
            };
            async move {
                let response = self.api.exchange_quote(request).await;
                let result = quote_state(source, response);
                if let Err(e) = &result {
                    warn!("Quote from provider {} failed: {e}", provider.id);
                }
                ProviderQuote { provider, result }
            }
        });
        Ok(join_all(requests).await)
    }

    /// Runs the wallet checks for the selected quote and fetches its transaction data.
    async fn ready_state(
        &self,
        pair: &SwappingPair,
        amount: Decimal,
        provider: &ExpressProvider,
        quote: &ExpressQuote,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let source = pair.source();
        let destination = pair.destination();

        if let Some(spender) = quote.allowance_contract.as_ref().filter(|_| source.is_token()) {
            let allowance = self.wallet.allowance(source, spender).await?;
            if allowance < amount {
                debug!("Allowance {allowance} of {spender} does not cover {amount}");
                return Ok(ExpressManagerState::Restriction(
                    ExpressManagerRestriction::NotEnoughAllowance {
                        spender: Some(spender.clone()),
                        allowance: Some(allowance),
                    },
                ));
            }
        }

        let balance = self.wallet.balance(source).await?;
        if balance < amount {
            debug!("Balance {balance} does not cover {amount}");
            return Ok(ExpressManagerState::Restriction(
                ExpressManagerRestriction::NotEnoughBalanceForSwapping { required: amount },
            ));
        }

        let refund_address = self.wallet.address(source).await?;
        let to_address = self.wallet.address(destination).await?;
        let source_asset = source.express_asset();
        let destination_asset = destination.express_asset();
        let response = self
            .api
            .exchange_data(ExchangeDataRequest {
                from_contract_address: source_asset.contract_address,
                from_network: source_asset.network,
                to_contract_address: destination_asset.contract_address,
                to_network: destination_asset.network,
                from_amount: source.to_smallest_units(amount)?,
                from_decimals: source.decimals,
                to_decimals: destination.decimals,
                provider_id: provider.id.clone(),
                rate_type: self.config.rate_type,
                to_address,
                refund_address: Some(refund_address),
                request_id: Uuid::new_v4().to_string(),
            })
            .await?;

        let data = ExpressTransactionData {
            provider_id: provider.id.clone(),
            tx_id: response.tx_id,
            tx_type: response.tx_type,
            source_address: response.tx_from,
            destination_address: response.tx_to,
            tx_data: response.tx_data,
            tx_value: response.tx_value,
            from_amount: from_smallest_units(response.from_amount, response.from_decimals)?,
            to_amount: from_smallest_units(response.to_amount, response.to_decimals)?,
            extra_destination_id: response.tx_extra_id,
            external_tx_id: response.external_tx_id,
            external_tx_url: response.external_tx_url,
        };
        info!("Swap {} ready with provider {}", data.tx_id, data.provider_id);
        Ok(ExpressManagerState::Ready(data))
    }
}

fn quote_state(
    source: &Currency,
    response: Result<QuoteResponse, ExpressApiError>,
) -> Result<QuoteState, ExpressManagerError> {
    match response {
        Ok(response) => Ok(QuoteState::Quote(ExpressQuote {
            from_amount: from_smallest_units(response.from_amount, response.from_decimals)?,
            expect_amount: from_smallest_units(response.to_amount, response.to_decimals)?,
            fee: response
                .fee_amount
                .map(|fee| from_smallest_units(fee, response.to_decimals))
                .transpose()?,
            allowance_contract: response.allowance_contract,
        })),
        Err(ExpressApiError::Api(body)) => match restriction_from_api_error(&body, source)? {
            Some(restriction) => Ok(QuoteState::Restriction(restriction)),
            None => Err(ExpressApiError::Api(body).into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// Maps the backend error codes that describe a business restriction.
///
/// Limits are expressed in `decimals` when the backend sends them, in the
/// source currency decimals otherwise.
fn restriction_from_api_error(
    body: &ExpressApiErrorBody,
    source: &Currency,
) -> Result<Option<ExpressManagerRestriction>, ExpressManagerError> {
    let decimals = body.decimals.unwrap_or(source.decimals);
    let restriction = match (body.code, body.min_amount, body.max_amount) {
        (ExpressApiErrorCode::ExchangeTooSmallAmount, Some(min_amount), _) => {
            Some(ExpressManagerRestriction::TooSmallAmount {
                min_amount: from_smallest_units(min_amount, decimals)?,
            })
        }
        (ExpressApiErrorCode::ExchangeTooBigAmount, _, Some(max_amount)) => {
            Some(ExpressManagerRestriction::TooBigAmount {
                max_amount: from_smallest_units(max_amount, decimals)?,
            })
        }
        (ExpressApiErrorCode::ExchangeNotEnoughAllowance, _, _) => {
            Some(ExpressManagerRestriction::NotEnoughAllowance {
                spender: None,
                allowance: None,
            })
        }
        _ => None,
    };
    Ok(restriction)
}

fn validate_amount(
    amount: Option<Decimal>,
    source: Option<&Currency>,
) -> Result<(), ExpressManagerError> {
    let Some(amount) = amount else {
        return Ok(());
    };
    match source {
        Some(source) => source.to_smallest_units(amount).map(|_| ()),
        None if amount.is_sign_negative() && !amount.is_zero() => Err(
            ExpressManagerError::InvalidAmount(format!("{amount} is negative")),
        ),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl ExpressManager for CommonExpressManager {
    async fn get_pair(&self) -> Option<SwappingPair> {
        self.session.lock().await.pair.clone()
    }

    async fn update_pair(
        &self,
        pair: SwappingPair,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let mut session = self.session.lock().await;
        debug!(
            "Updating pair to {} -> {}",
            pair.source().symbol,
            pair.destination().symbol
        );
        if let Some(amount) = session.amount
            && pair.source().to_smallest_units(amount).is_err()
        {
            info!(
                "Clearing amount {amount} not representable in {}",
                pair.source().symbol
            );
            session.amount = None;
        }
        session.pair = Some(pair.clone());
        session.pair_route = None;
        session.clear_quotes();

        if let Some(pinned) = session.pinned_provider.clone() {
            let route = self.pair_route(&mut session, &pair).await?;
            let supported = matches!(
                &route,
                PairRoute::Providers(providers) if providers.iter().any(|p| p.id == pinned.id)
            );
            if !supported {
                info!("Unpinning provider {} not supporting the new pair", pinned.id);
                session.pinned_provider = None;
            }
        }

        self.resolve_and_publish(&mut session).await
    }

    async fn get_amount(&self) -> Option<Decimal> {
        self.session.lock().await.amount
    }

    async fn update_amount(
        &self,
        amount: Option<Decimal>,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let mut session = self.session.lock().await;
        validate_amount(amount, session.pair.as_ref().map(SwappingPair::source))?;
        debug!("Updating amount to {amount:?}");
        session.amount = amount;
        session.clear_quotes();
        self.resolve_and_publish(&mut session).await
    }

    async fn get_selected_quote(&self) -> Option<ExpressAvailableQuote> {
        let session = self.session.lock().await;
        let selected = session.selected_provider_id.as_ref()?;
        session
            .last_quotes
            .iter()
            .find(|q| &q.provider.id == selected)
            .map(ProviderQuote::available)
    }

    async fn get_all_quotes(&self) -> Vec<ExpressAvailableQuote> {
        self.session
            .lock()
            .await
            .last_quotes
            .iter()
            .map(ProviderQuote::available)
            .collect()
    }

    async fn update_selected_provider(
        &self,
        provider: ExpressProvider,
    ) -> Result<ExpressManagerState, ExpressManagerError> {
        let mut session = self.session.lock().await;
        debug!("Pinning provider {}", provider.id);
        session.pinned_provider = Some(provider);
        session.clear_quotes();
        self.resolve_and_publish(&mut session).await
    }

    async fn update(&self) -> Result<ExpressManagerState, ExpressManagerError> {
        let mut session = self.session.lock().await;
        self.resolve_and_publish(&mut session).await
    }

    async fn get_state(&self) -> ExpressManagerState {
        self.last_state.read().await.clone()
    }

    async fn add_listener(&self, listener: Box<dyn ExpressManagerListener>) -> String {
        self.emitter.add_listener(listener).await
    }

    async fn remove_listener(&self, id: &str) -> bool {
        self.emitter.remove_listener(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        str::FromStr,
        sync::{Arc, Mutex as StdMutex},
    };

    use super::*;
    use crate::test_utils::{
        MockExpressApi, MockWallet, api_error, matic, provider, usdc, usdc_to_matic_quote,
    };

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn usdc_matic() -> SwappingPair {
        SwappingPair::new(usdc(), matic()).unwrap()
    }

    /// Catalog `a`, `b`, `c`; USDC -> MATIC supported by `a` and `b`.
    fn setup_with_config(
        config: ExpressManagerConfig,
    ) -> (Arc<MockExpressApi>, Arc<MockWallet>, CommonExpressManager) {
        let api = Arc::new(MockExpressApi::new());
        api.add_provider("a").add_provider("b").add_provider("c");
        api.add_pair(&usdc(), &matic(), &["a", "b"]);
        let wallet = Arc::new(MockWallet::new());
        let manager = CommonExpressManager::new(api.clone(), wallet.clone(), config);
        (api, wallet, manager)
    }

    fn setup() -> (Arc<MockExpressApi>, Arc<MockWallet>, CommonExpressManager) {
        setup_with_config(ExpressManagerConfig::default())
    }

    fn ready(state: &ExpressManagerState) -> &ExpressTransactionData {
        match state {
            ExpressManagerState::Ready(data) => data,
            other => panic!("Expected ready state, got {other:?}"),
        }
    }

    struct RecordingListener {
        states: Arc<StdMutex<Vec<ExpressManagerState>>>,
    }

    #[async_trait::async_trait]
    impl ExpressManagerListener for RecordingListener {
        async fn on_state(&self, state: ExpressManagerState) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[tokio::test]
    async fn test_best_quote_wins() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));

        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert_eq!(state, ExpressManagerState::Idle);

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        let data = ready(&state);
        assert_eq!(data.provider_id, "b");
        assert_eq!(data.to_amount, Decimal::from(655));
        assert_eq!(data.from_amount, Decimal::from(1000));

        let selected = manager.get_selected_quote().await.unwrap();
        assert_eq!(selected.provider.id, "b");
        assert_eq!(
            selected.state.quote().unwrap().expect_amount,
            Decimal::from(655)
        );

        let all: Vec<String> = manager
            .get_all_quotes()
            .await
            .into_iter()
            .map(|q| q.provider.id)
            .collect();
        assert_eq!(all, vec!["a", "b"]);
        assert_eq!(manager.get_state().await, state);
    }

    #[tokio::test]
    async fn test_quote_and_exchange_requests() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let quote_requests = api.quote_requests();
        assert_eq!(quote_requests.len(), 2);
        for request in &quote_requests {
            assert_eq!(request.from_amount, 1_000_000_000);
            assert_eq!(request.from_decimals, 6);
            assert_eq!(request.to_decimals, 18);
            assert_eq!(request.to_contract_address, "0");
        }

        let data_requests = api.data_requests();
        assert_eq!(data_requests.len(), 1);
        let request = &data_requests[0];
        assert_eq!(request.provider_id, "b");
        assert_eq!(request.to_address, MockWallet::address_for(&matic()));
        assert_eq!(
            request.refund_address,
            Some(MockWallet::address_for(&usdc()))
        );
        assert!(Uuid::parse_str(&request.request_id).is_ok());
    }

    #[tokio::test]
    async fn test_minimum_of_minimums() {
        let (api, _, manager) = setup();
        api.set_quote("a", Err(api_error(2210, Some(25_000_000), None, None)))
            .set_quote("b", Err(api_error(2210, Some(10_000_000), None, Some(6))));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1))).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::TooSmallAmount {
                min_amount: Decimal::from(10)
            })
        );
        assert!(api.data_requests().is_empty());
    }

    #[tokio::test]
    async fn test_maximum_of_maximums() {
        let (api, _, manager) = setup();
        api.set_quote("a", Err(api_error(2220, None, Some(5_000_000_000), None)))
            .set_quote("b", Err(api_error(2220, None, Some(9_000_000_000), None)));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager
            .update_amount(Some(Decimal::from(100_000)))
            .await
            .unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::TooBigAmount {
                max_amount: Decimal::from(9000)
            })
        );
    }

    #[tokio::test]
    async fn test_restriction_wins_over_errors() {
        let (api, _, manager) = setup();
        api.set_quote(
            "a",
            Err(ExpressApiError::Request {
                reason: "timeout".to_string(),
                code: None,
            }),
        )
        .set_quote("b", Err(api_error(2210, Some(10_000_000), None, None)));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1))).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::TooSmallAmount {
                min_amount: Decimal::from(10)
            })
        );
        let all = manager.get_all_quotes().await;
        assert!(matches!(all[0].state, QuoteState::Error(_)));
        assert!(matches!(all[1].state, QuoteState::Restriction(_)));
    }

    #[tokio::test]
    async fn test_failed_provider_is_skipped() {
        let (api, _, manager) = setup();
        api.set_quote("a", Err(api_error(2250, None, None, None)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 640)));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(ready(&state).provider_id, "b");
    }

    #[tokio::test]
    async fn test_pinned_provider_not_supporting_pair_is_no_route() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)))
            .set_quote("c", Ok(usdc_to_matic_quote(1000, 700)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        let requests_before = api.quote_requests().len();

        let state = manager.update_selected_provider(provider("c")).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::NoRoute)
        );
        assert_eq!(api.quote_requests().len(), requests_before);
        assert!(manager.get_selected_quote().await.is_none());
    }

    #[tokio::test]
    async fn test_pinned_provider_is_the_only_one_quoted() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_selected_provider(provider("a")).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(ready(&state).provider_id, "a");
        assert!(api.quote_requests().iter().all(|r| r.provider_id == "a"));
        assert_eq!(manager.get_all_quotes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pinned_provider_error_does_not_fall_back() {
        let (api, _, manager) = setup();
        api.set_quote("a", Err(api_error(2250, None, None, None)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_selected_provider(provider("a")).await.unwrap();

        let err = manager
            .update_amount(Some(Decimal::from(1000)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpressManagerError::Api(ExpressApiError::Api(_))));
        let selected = manager.get_selected_quote().await.unwrap();
        assert_eq!(selected.provider.id, "a");
        assert!(matches!(selected.state, QuoteState::Error(_)));
    }

    #[tokio::test]
    async fn test_update_pair_unpins_unsupporting_provider() {
        let (api, _, manager) = setup();
        api.add_pair(&matic(), &usdc(), &["b"]);
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_selected_provider(provider("a")).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let state = manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready(&state).provider_id, "b");
    }

    #[tokio::test]
    async fn test_no_amount_or_zero_is_idle() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let state = manager.update_amount(None).await.unwrap();
        assert_eq!(state, ExpressManagerState::Idle);
        assert!(manager.get_all_quotes().await.is_empty());
        assert!(manager.get_selected_quote().await.is_none());

        let state = manager.update_amount(Some(Decimal::ZERO)).await.unwrap();
        assert_eq!(state, ExpressManagerState::Idle);
        assert_eq!(manager.get_state().await, ExpressManagerState::Idle);
    }

    #[tokio::test]
    async fn test_update_is_idempotent_and_reuses_fresh_quotes() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        let first = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        let quote_requests = api.quote_requests().len();

        let second = manager.update().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.quote_requests().len(), quote_requests);
    }

    #[tokio::test]
    async fn test_update_requotes_expired_quotes() {
        let (api, _, manager) = setup_with_config(ExpressManagerConfig {
            quote_ttl_ms: 0,
            ..Default::default()
        });
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        let first = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let second = manager.update().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.quote_requests().len(), 4);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_quotes() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(api.quote_requests().len(), 4);
    }

    #[tokio::test]
    async fn test_decoding_error_propagates_and_keeps_state() {
        let (api, _, manager) = setup();
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)))
            .set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        let ready_state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let decoding = ExpressApiError::Decoding("missing field `toAmount`".to_string());
        api.set_quote("a", Err(decoding.clone()))
            .set_quote("b", Err(decoding.clone()));
        let err = manager
            .update_amount(Some(Decimal::from(2000)))
            .await
            .unwrap_err();
        assert_eq!(err, ExpressManagerError::Api(decoding));
        assert_eq!(manager.get_state().await, ready_state);
        assert_eq!(manager.get_amount().await, Some(Decimal::from(2000)));
    }

    #[tokio::test]
    async fn test_pairs_error_propagates() {
        let (api, _, manager) = setup();
        api.set_pairs_error(ExpressApiError::Request {
            reason: "connection refused".to_string(),
            code: None,
        });
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();

        let err = manager.update_pair(usdc_matic()).await.unwrap_err();
        assert!(matches!(
            err,
            ExpressManagerError::Api(ExpressApiError::Request { .. })
        ));
        assert_eq!(manager.get_state().await, ExpressManagerState::Idle);
    }

    #[tokio::test]
    async fn test_exchange_data_error_propagates() {
        let (api, _, manager) = setup();
        api.set_quote("b", Ok(usdc_to_matic_quote(1000, 655)))
            .set_exchange_data_error("b", api_error(2110, None, None, None));
        manager.update_pair(usdc_matic()).await.unwrap();

        let err = manager
            .update_amount(Some(Decimal::from(1000)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpressManagerError::Api(ExpressApiError::Api(_))));
        assert_eq!(manager.get_state().await, ExpressManagerState::Idle);
    }

    #[tokio::test]
    async fn test_unlisted_pair_is_no_route() {
        let (api, _, manager) = setup();
        manager.update_amount(Some(Decimal::from(1))).await.unwrap();
        let state = manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::NoRoute)
        );
        assert!(api.quote_requests().is_empty());
    }

    #[tokio::test]
    async fn test_pair_without_catalog_provider_has_no_providers() {
        let (api, _, manager) = setup();
        api.add_pair(&matic(), &usdc(), &["retired"]);
        manager.update_amount(Some(Decimal::from(1))).await.unwrap();
        let state = manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::NoProvidersAvailable)
        );
    }

    #[tokio::test]
    async fn test_not_enough_allowance() {
        let (api, wallet, manager) = setup();
        let mut quote = usdc_to_matic_quote(1000, 655);
        quote.allowance_contract = Some("0xspender".to_string());
        api.set_quote("b", Ok(quote));
        wallet.set_allowance(&usdc(), "0xspender", Decimal::from(500));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::NotEnoughAllowance {
                spender: Some("0xspender".to_string()),
                allowance: Some(Decimal::from(500)),
            })
        );
        assert!(api.data_requests().is_empty());

        wallet.set_allowance(&usdc(), "0xspender", Decimal::from(1000));
        let state = manager.update().await.unwrap();
        assert_eq!(ready(&state).provider_id, "b");
    }

    #[tokio::test]
    async fn test_backend_allowance_restriction() {
        let (api, _, manager) = setup();
        api.set_quote("a", Err(api_error(2230, None, None, None)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_selected_provider(provider("a")).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(ExpressManagerRestriction::NotEnoughAllowance {
                spender: None,
                allowance: None,
            })
        );
    }

    #[tokio::test]
    async fn test_native_coin_skips_allowance() {
        let (api, wallet, manager) = setup();
        api.add_pair(&matic(), &usdc(), &["a"]);
        let mut quote = usdc_to_matic_quote(1000, 655);
        quote.allowance_contract = Some("0xspender".to_string());
        api.set_quote("a", Ok(quote));
        manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();

        let state = manager.update_amount(Some(Decimal::from(10))).await.unwrap();
        assert!(matches!(state, ExpressManagerState::Ready(_)));
        assert_eq!(wallet.allowance_calls(), 0);
    }

    #[tokio::test]
    async fn test_not_enough_balance() {
        let (api, wallet, manager) = setup();
        api.set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        wallet.set_balance(&usdc(), dec("999.99"));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(
            state,
            ExpressManagerState::Restriction(
                ExpressManagerRestriction::NotEnoughBalanceForSwapping {
                    required: Decimal::from(1000)
                }
            )
        );
    }

    #[tokio::test]
    async fn test_invalid_amount_is_rejected_before_any_change() {
        let (api, _, manager) = setup();
        api.set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_pair(usdc_matic()).await.unwrap();
        manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        let quote_requests = api.quote_requests().len();

        let err = manager
            .update_amount(Some(dec("0.0000001")))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpressManagerError::InvalidAmount(_)));
        let err = manager.update_amount(Some(dec("-5"))).await.unwrap_err();
        assert!(matches!(err, ExpressManagerError::InvalidAmount(_)));

        assert_eq!(manager.get_amount().await, Some(Decimal::from(1000)));
        assert_eq!(api.quote_requests().len(), quote_requests);
    }

    #[tokio::test]
    async fn test_catalog_is_fetched_once() {
        let (api, _, manager) = setup();
        api.add_pair(&matic(), &usdc(), &["a"]);
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 640)));
        manager.update_amount(Some(Decimal::from(1))).await.unwrap();

        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert_eq!(ready(&state).provider_id, "a");
        let state = manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready(&state).provider_id, "a");
        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert_eq!(ready(&state).provider_id, "a");

        assert_eq!(api.providers_calls(), 1);
        assert_eq!(api.pairs_calls(), 3);
        // `a` and `b`, then `a`, then `a` and `b` again
        assert_eq!(api.quote_requests().len(), 5);
    }

    #[tokio::test]
    async fn test_amount_too_precise_for_new_source_is_cleared() {
        let (api, _, manager) = setup();
        api.add_pair(&matic(), &usdc(), &["a"]);
        api.set_quote("a", Ok(usdc_to_matic_quote(1000, 655)));
        manager
            .update_pair(SwappingPair::new(matic(), usdc()).unwrap())
            .await
            .unwrap();
        manager.update_amount(Some(dec("0.0000001"))).await.unwrap();

        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert_eq!(state, ExpressManagerState::Idle);
        assert_eq!(manager.get_amount().await, None);
        assert_eq!(manager.update().await.unwrap(), ExpressManagerState::Idle);

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(ready(&state).provider_id, "a");
    }

    #[tokio::test]
    async fn test_amount_set_without_pair_is_checked_on_pair_update() {
        let (api, _, manager) = setup();
        api.set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        manager.update_amount(Some(dec("0.0000001"))).await.unwrap();

        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert_eq!(state, ExpressManagerState::Idle);
        assert_eq!(manager.get_amount().await, None);
        assert!(api.quote_requests().is_empty());

        manager.update_amount(Some(dec("1000.5"))).await.unwrap();
        let state = manager.update_pair(usdc_matic()).await.unwrap();
        assert!(matches!(state, ExpressManagerState::Ready(_)));
        assert_eq!(manager.get_amount().await, Some(dec("1000.5")));
    }

    #[tokio::test]
    async fn test_large_amounts_reach_ready() {
        let (api, _, manager) = setup();
        let mut quote = usdc_to_matic_quote(1000, 100_000_000_000);
        quote.fee_amount = Some(10u128.pow(29).saturating_add(1));
        api.set_quote("a", Ok(quote));
        manager.update_pair(usdc_matic()).await.unwrap();

        let state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(ready(&state).to_amount, Decimal::from(100_000_000_000u64));
        let selected = manager.get_selected_quote().await.unwrap();
        let quote = selected.state.quote().unwrap();
        assert_eq!(quote.expect_amount, Decimal::from(100_000_000_000u64));
        assert_eq!(quote.fee, Some(Decimal::from(100_000_000_000u64)));
    }

    #[tokio::test]
    async fn test_listeners_receive_written_states() {
        let (api, _, manager) = setup();
        api.set_quote("b", Ok(usdc_to_matic_quote(1000, 655)));
        let states = Arc::new(StdMutex::new(Vec::new()));
        let id = manager
            .add_listener(Box::new(RecordingListener {
                states: states.clone(),
            }))
            .await;

        manager.update_pair(usdc_matic()).await.unwrap();
        let ready_state = manager.update_amount(Some(Decimal::from(1000))).await.unwrap();
        assert_eq!(
            *states.lock().unwrap(),
            vec![ExpressManagerState::Idle, ready_state]
        );

        assert!(manager.remove_listener(&id).await);
        manager.update_amount(None).await.unwrap();
        assert_eq!(states.lock().unwrap().len(), 2);
    }
}
