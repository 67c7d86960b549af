use web_time::{SystemTime, UNIX_EPOCH};

/// A slot holding a value until its time-to-live runs out.
///
/// After expiration `get()` returns `None` until a new value is set. Callers
/// own the synchronization, the manager keeps it behind its session lock.
pub(crate) struct ExpiringCell<T> {
    inner: Option<(T, u128)>, // (value, expiration_ms)
}

impl<T> ExpiringCell<T> {
    pub fn new() -> Self {
        Self { inner: None }
    }

    pub fn clear(&mut self) {
        self.inner = None;
    }
}

impl<T> Default for ExpiringCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ExpiringCell<T> {
    /// Returns the cached value if it exists and hasn't expired.
    pub fn get(&self) -> Option<T> {
        let (value, expiration) = self.inner.as_ref()?;
        if now_ms()? < *expiration {
            Some(value.clone())
        } else {
            None
        }
    }

    /// Sets a new value with the specified TTL in milliseconds.
    pub fn set(&mut self, value: T, ttl_ms: u128) {
        let expiration = now_ms().map_or(0, |now| now.saturating_add(ttl_ms));
        self.inner = Some((value, expiration));
    }
}

fn now_ms() -> Option<u128> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis())
}
