mod api;
mod cache;
mod config;
mod error;
mod http;
mod models;

pub use api::{ExpressApiClient, ExpressApiService};
pub use cache::CacheStore;
pub use config::*;
pub use error::{ExpressApiError, ExpressApiErrorBody, ExpressApiErrorCode};
pub use models::*;
