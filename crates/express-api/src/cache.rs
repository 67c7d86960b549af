use std::collections::HashMap;

use tokio::sync::Mutex;
use web_time::{SystemTime, UNIX_EPOCH};

use crate::ExpressApiError;

struct CacheItem {
    data: String,
    expiration: u128,
}

/// In-memory store of serialized responses with a per-item TTL.
pub struct CacheStore {
    cache: Mutex<HashMap<String, CacheItem>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl CacheStore {
    pub async fn get<D>(&self, key: &str) -> Result<Option<D>, ExpressApiError>
    where
        D: serde::de::DeserializeOwned,
    {
        let cache = self.cache.lock().await;
        let Some(item) = cache.get(key) else {
            return Ok(None);
        };
        if item.expiration < now_ms()? {
            return Ok(None);
        }
        let res = serde_json::from_str(&item.data).map_err(|e| {
            ExpressApiError::Decoding(format!("Failed to deserialize cache item: {e}"))
        })?;
        Ok(Some(res))
    }

    pub async fn set<S>(&self, key: &str, data: &S, ttl_ms: u128) -> Result<(), ExpressApiError>
    where
        S: serde::Serialize,
    {
        let data = serde_json::to_string(data).map_err(|e| {
            ExpressApiError::Decoding(format!("Failed to serialize cache item: {e}"))
        })?;
        let expiration = now_ms()?.saturating_add(ttl_ms);
        let mut cache = self.cache.lock().await;
        cache.insert(key.to_string(), CacheItem { data, expiration });
        Ok(())
    }
}

fn now_ms() -> Result<u128, ExpressApiError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ExpressApiError::Request {
            reason: format!("System time error: {e}"),
            code: None,
        })?
        .as_millis())
}
