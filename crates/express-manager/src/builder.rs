use std::sync::Arc;

use express_api::{CacheStore, ExpressApiClient, ExpressApiConfig, ExpressApiService};

use crate::{CommonExpressManager, ExpressManagerConfig, ExpressManagerError, ExpressWallet};

/// Builder for creating `CommonExpressManager` instances with customizable components.
#[derive(Clone)]
pub struct ExpressManagerBuilder {
    config: ExpressManagerConfig,
    wallet: Arc<dyn ExpressWallet>,
    api_service: Option<Arc<dyn ExpressApiService>>,
    api_config: Option<ExpressApiConfig>,
}

impl ExpressManagerBuilder {
    /// Creates a new `ExpressManagerBuilder`.
    /// Arguments:
    /// - `config`: The manager configuration.
    /// - `wallet`: The wallet providing addresses, balances and allowances.
    pub fn new(config: ExpressManagerConfig, wallet: Arc<dyn ExpressWallet>) -> Self {
        ExpressManagerBuilder {
            config,
            wallet,
            api_service: None,
            api_config: None,
        }
    }

    /// Sets the Express API service to be used by the manager.
    #[must_use]
    pub fn with_api_service(mut self, api_service: Arc<dyn ExpressApiService>) -> Self {
        self.api_service = Some(api_service);
        self
    }

    /// Sets the configuration of the default HTTP Express API client.
    /// Ignored when an API service is set.
    #[must_use]
    pub fn with_api_config(mut self, api_config: ExpressApiConfig) -> Self {
        self.api_config = Some(api_config);
        self
    }

    pub fn build(self) -> Result<CommonExpressManager, ExpressManagerError> {
        let api_service: Arc<dyn ExpressApiService> = match (self.api_service, self.api_config) {
            (Some(service), _) => service,
            (None, Some(api_config)) => Arc::new(ExpressApiClient::new(
                api_config,
                Arc::new(CacheStore::default()),
            )?),
            (None, None) => {
                return Err(ExpressManagerError::invalid_input(
                    "Either an API service or an API config is required",
                ));
            }
        };
        Ok(CommonExpressManager::new(
            api_service,
            self.wallet,
            self.config,
        ))
    }
}
