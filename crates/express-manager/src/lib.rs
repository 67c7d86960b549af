mod builder;
mod error;
mod events;
mod logger;
mod manager;
mod models;
mod provider_selection;
mod rates;
mod utils;
mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use builder::ExpressManagerBuilder;
pub use error::{ExpressManagerError, RatesError, WalletError};
pub use events::{ExpressManagerListener, StateEmitter};
pub use logger::{LogEntry, Logger, init_logging};
pub use manager::{CommonExpressManager, ExpressManager};
pub use models::*;
pub use rates::{CommonRatesRepository, FiatRatesService, RatesRepository, SwappingRatesProvider};
pub use wallet::ExpressWallet;

pub use express_api::{ExpressApiConfig, ExpressApiCredentials, ExpressEnvironment, RateType};
