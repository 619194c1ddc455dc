//! HTTP Client Pool for maintaining persistent connections per base URL.
//!
//! Clients talking to the same endpoint share a single `reqwest::Client`,
//! along with its keep-alive connections and TLS sessions.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// Global HTTP client pool, lazily initialized on first access.
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create a shared HTTP client for the given base URL.
///
/// `timeout` only applies when the client is first created; later callers
/// get the pooled instance as-is.
pub fn get_http_client(base_url: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(base_url) {
        return Ok(client.clone());
    }

    let client = reqwest::ClientBuilder::new()
        .user_agent(concat!("cloudswarm/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(timeout)
        .build()?;

    log::debug!("cloudswarm::clients::http_pool: new client for {}", base_url);
    pool.insert(base_url.to_string(), client.clone());
    Ok(client)
}

/// Whether a client for `base_url` is already pooled.
pub fn is_pooled(base_url: &str) -> bool {
    HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .contains_key(base_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_base_url_reuses_entry() {
        get_http_client("http://pool-test.local", Duration::from_secs(5)).unwrap();
        get_http_client("http://pool-test.local", Duration::from_secs(9)).unwrap();
        let pool = HTTP_CLIENT_POOL.lock().unwrap();
        assert_eq!(
            pool.keys().filter(|k| k.as_str() == "http://pool-test.local").count(),
            1
        );
        drop(pool);
        assert!(is_pooled("http://pool-test.local"));
        assert!(!is_pooled("http://never-requested.local"));
    }
}
