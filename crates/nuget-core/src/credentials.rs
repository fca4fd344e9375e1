//! Feed credentials.
//!
//! Configured passwords win. Otherwise a [`CredentialStore`] is asked for
//! the feed; it caches one answer per truncated feed URL, filled from an
//! optional external [`CredentialProvider`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Username and password for HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// External source of credentials, such as a credential-provider process.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Look up credentials for a truncated feed URL. `Ok(None)` means the
    /// provider has nothing for this feed.
    async fn get_credentials(&self, feed_url: &str) -> Result<Option<Credentials>>;
}

type CacheCell = Arc<OnceCell<Option<Credentials>>>;

/// Per-feed credential cache.
#[derive(Default)]
pub struct CredentialStore {
    provider: Option<Arc<dyn CredentialProvider>>,
    cache: Mutex<HashMap<String, CacheCell>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider: Some(provider),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the cache for a feed, bypassing the provider.
    pub async fn insert(&self, feed_url: &str, credentials: Credentials) {
        let key = truncate_feed_url(feed_url);
        let cell = Arc::new(OnceCell::new_with(Some(Some(credentials))));
        self.cache.lock().await.insert(key, cell);
    }

    /// Credentials for a request to `url`: the configured ones when they carry
    /// a password, else whatever the store knows for the feed.
    pub async fn resolve(&self, configured: Option<&Credentials>, url: &str) -> Option<Credentials> {
        match configured {
            Some(creds) if creds.has_password() => Some(creds.clone()),
            _ => self.lookup(url).await,
        }
    }

    /// Cached lookup. A provider error is logged, left uncached and treated as
    /// "no credentials".
    pub async fn lookup(&self, url: &str) -> Option<Credentials> {
        let key = truncate_feed_url(url);
        let cell = {
            let mut cache = self.cache.lock().await;
            cache.entry(key.clone()).or_default().clone()
        };

        let result = cell
            .get_or_try_init(|| async {
                match self.provider {
                    Some(ref provider) => {
                        debug!("Requesting credentials for {}", key);
                        provider.get_credentials(&key).await
                    }
                    None => Ok(None),
                }
            })
            .await;

        match result {
            Ok(credentials) => credentials.clone(),
            Err(e) => {
                warn!("Credential provider failed for {}: {}; continuing anonymously", key, e);
                None
            }
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

/// Cache key for a feed: query and fragment dropped, a trailing OData
/// function segment such as `FindPackagesById()` removed, no trailing slash.
pub fn truncate_feed_url(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    let trimmed = base.trim_end_matches('/');
    let without_function = match trimmed.rsplit_once('/') {
        Some((head, last)) if last.ends_with(')') => head,
        _ => trimmed,
    };
    without_function.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NugetError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn get_credentials(&self, feed_url: &str) -> Result<Option<Credentials>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NugetError::Other("provider exited with code 1".into()));
            }
            Ok(Some(Credentials::new("ci", format!("token-for-{}", feed_url))))
        }
    }

    #[test]
    fn test_truncate_feed_url() {
        assert_eq!(
            truncate_feed_url("https://feed.example/api/v2/FindPackagesById()?id='A'"),
            "https://feed.example/api/v2"
        );
        assert_eq!(
            truncate_feed_url("https://feed.example/api/v2/Packages(Id='A',Version='1.0.0')"),
            "https://feed.example/api/v2"
        );
        assert_eq!(
            truncate_feed_url("https://feed.example/v3/index.json"),
            "https://feed.example/v3/index.json"
        );
        assert_eq!(
            truncate_feed_url("https://feed.example/api/v2/"),
            "https://feed.example/api/v2"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_configured_password_wins() {
        let store = CredentialStore::new();
        let configured = Credentials::new("user", "secret");
        let resolved = store
            .resolve(Some(&configured), "https://feed.example/api/v2")
            .await;
        assert_eq!(resolved, Some(configured));

        let no_password = Credentials::new("user", "");
        assert_eq!(
            store.resolve(Some(&no_password), "https://feed.example/api/v2").await,
            None
        );
    }

    #[tokio::test]
    async fn test_provider_called_once_per_feed() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let store = CredentialStore::with_provider(provider.clone());

        let first = store
            .lookup("https://feed.example/api/v2/FindPackagesById()?id='A'")
            .await
            .unwrap();
        let second = store
            .lookup("https://feed.example/api/v2/Search()")
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.password, "token-for-https://feed.example/api/v2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_anonymous_and_retried() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let store = CredentialStore::with_provider(provider.clone());
        assert!(store.lookup("https://feed.example/api/v2").await.is_none());
        assert!(store.lookup("https://feed.example/api/v2").await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_seeded_credentials() {
        let store = CredentialStore::new();
        store
            .insert("https://feed.example/api/v2/", Credentials::new("a", "b"))
            .await;
        let found = store.lookup("https://feed.example/api/v2/Search()").await;
        assert_eq!(found, Some(Credentials::new("a", "b")));
    }
}
