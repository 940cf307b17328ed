//! Bearer credentials for registry calls
//!
//! [`CredentialCache`] hands out a valid access token to any number of
//! concurrent callers. Reads go through a lock-free snapshot; refreshes are
//! single-flight behind a mutex, so at most one token exchange is in flight
//! no matter how many callers find the token stale at the same time.
//!
//! Grants shorter than twice the buffer refresh at half their lifetime
//! instead.
//!
//! ```text
//! No token ──request──▶ Valid ──(now ≥ expires_at − buffer)──▶ Needs refresh
//!                         ▲                                        │
//!                         └──────────────── request ───────────────┘
//! ```

pub mod client_credentials;

pub use client_credentials::ClientCredentialsProvider;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Refresh this long before the token actually expires
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(30);

/// Result of one token exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Source of fresh access tokens (one network exchange per call)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<TokenGrant>;
}

/// An access token and the instant it stops being accepted
#[derive(Debug, Clone)]
pub struct TokenState {
    access_token: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl TokenState {
    pub fn new(access_token: impl Into<String>, issued_at: Instant, expires_at: Instant) -> Self {
        Self {
            access_token: access_token.into(),
            issued_at,
            expires_at,
        }
    }

    fn from_grant(grant: TokenGrant, acquired_at: Instant) -> Self {
        Self::new(grant.access_token, acquired_at, acquired_at + grant.expires_in)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn lifetime(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.issued_at)
    }

    /// Usable at `now` without entering the refresh window.
    ///
    /// The window never exceeds half the token's lifetime.
    pub fn is_valid_at(&self, now: Instant, refresh_buffer: Duration) -> bool {
        let buffer = refresh_buffer.min(self.lifetime() / 2);
        now.checked_add(buffer)
            .is_some_and(|deadline| deadline < self.expires_at)
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe cache of the current bearer token
pub struct CredentialCache {
    provider: Box<dyn TokenProvider>,
    state: ArcSwapOption<TokenState>,
    refresh: Mutex<()>,
    refresh_buffer: Duration,
}

impl CredentialCache {
    pub fn new(provider: impl TokenProvider + 'static) -> Self {
        Self::with_refresh_buffer(provider, DEFAULT_REFRESH_BUFFER)
    }

    pub fn with_refresh_buffer(provider: impl TokenProvider + 'static, refresh_buffer: Duration) -> Self {
        Self {
            provider: Box::new(provider),
            state: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
            refresh_buffer,
        }
    }

    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Return a token that stays valid beyond the refresh buffer.
    pub async fn get_valid_token(&self) -> Result<String> {
        let state = self.valid_state().await?;
        Ok(state.access_token.clone())
    }

    /// Same as [`get_valid_token`](Self::get_valid_token) but returns the full state
    pub async fn valid_state(&self) -> Result<Arc<TokenState>> {
        let seen = self.state.load_full();
        if let Some(state) = seen.as_ref().filter(|s| s.is_valid_at(Instant::now(), self.refresh_buffer)) {
            return Ok(Arc::clone(state));
        }

        let _guard = self.refresh.lock().await;

        // a token stored while we waited is accepted until it expires
        if let Some(state) = self.state.load_full() {
            let now = Instant::now();
            let replaced = !seen.as_ref().is_some_and(|s| Arc::ptr_eq(s, &state));
            if state.is_valid_at(now, self.refresh_buffer) || (replaced && !state.is_expired_at(now)) {
                debug!("token refreshed by a concurrent caller");
                return Ok(state);
            }
        }

        debug!("requesting a new access token");
        let grant = self.provider.fetch_token().await.map_err(|e| match e {
            SyncError::Authentication(_) => e,
            other => SyncError::Authentication(other.to_string()),
        })?;

        let state = Arc::new(TokenState::from_grant(grant, Instant::now()));
        debug!(
            expires_in_secs = state.expires_at.saturating_duration_since(Instant::now()).as_secs(),
            "access token refreshed"
        );
        self.state.store(Some(Arc::clone(&state)));
        Ok(state)
    }

    /// Drop the cached token so the next call refreshes
    pub fn invalidate(&self) {
        self.state.store(None);
    }

    /// Drop `rejected` only if it is still the cached token.
    ///
    /// Returns whether it was dropped; a token refreshed by another caller
    /// in the meantime is kept.
    pub fn invalidate_if_current(&self, rejected: &Arc<TokenState>) -> bool {
        let previous = self.state.compare_and_swap(rejected, None);
        previous.as_ref().is_some_and(|p| Arc::ptr_eq(p, rejected))
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("refresh_buffer", &self.refresh_buffer)
            .field("has_token", &self.state.load().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts exchanges and takes a while to answer, like a real endpoint
    struct SlowProvider {
        calls: Arc<AtomicUsize>,
        latency: Duration,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenProvider for SlowProvider {
        async fn fetch_token(&self) -> Result<TokenGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            Ok(TokenGrant {
                access_token: format!("token-{}", n),
                expires_in: self.lifetime,
            })
        }
    }

    fn grant(token: &str, secs: u64) -> TokenGrant {
        TokenGrant {
            access_token: token.to_string(),
            expires_in: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_reused_until_refresh_window() {
        let mut provider = MockTokenProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(grant("first", 300)));
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(grant("second", 300)));

        let cache = CredentialCache::new(provider);
        assert_eq!(cache.get_valid_token().await.unwrap(), "first");

        // t=100: well before the buffer, no exchange
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "first");

        // t=271: inside the 30s buffer, exactly one exchange
        tokio::time::advance(Duration::from_secs(171)).await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "second");
        assert_eq!(cache.get_valid_token().await.unwrap(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_exchange() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(CredentialCache::new(SlowProvider {
            calls: Arc::clone(&calls),
            latency: Duration::from_millis(200),
            lifetime: Duration::from_secs(300),
        }));

        // warm the cache, then move close to expiry
        cache.get_valid_token().await.unwrap();
        tokio::time::advance(Duration::from_secs(280)).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move {
                let state = cache.valid_state().await.unwrap();
                (state, Instant::now())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (state, received_at) = joined.unwrap();
            assert_eq!(state.access_token(), "token-2");
            assert!(state.expires_at() > received_at + DEFAULT_REFRESH_BUFFER);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let mut provider = MockTokenProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(SyncError::Network("connection refused".into())));
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(grant("recovered", 300)));

        let cache = CredentialCache::new(provider);
        match cache.get_valid_token().await {
            Err(SyncError::Authentication(message)) => assert!(message.contains("connection refused")),
            other => panic!("expected authentication error, got {:?}", other),
        }
        assert_eq!(cache.get_valid_token().await.unwrap(), "recovered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_fetch_token()
            .times(2)
            .returning(|| Ok(grant("t", 300)));

        let cache = CredentialCache::new(provider);
        cache.get_valid_token().await.unwrap();
        cache.invalidate();
        cache.get_valid_token().await.unwrap();
    }

    #[test]
    fn test_token_state_validity_window() {
        let now = Instant::now();
        let state = TokenState::new("t", now, now + Duration::from_secs(300));
        let buffer = Duration::from_secs(30);
        assert!(state.is_valid_at(now + Duration::from_secs(100), buffer));
        assert!(state.is_valid_at(now + Duration::from_secs(269), buffer));
        assert!(!state.is_valid_at(now + Duration::from_secs(270), buffer));
        assert!(!state.is_valid_at(now + Duration::from_secs(271), buffer));
    }

    #[test]
    fn test_short_lifetime_caps_refresh_window_at_half() {
        let now = Instant::now();
        let state = TokenState::new("t", now, now + Duration::from_secs(20));
        let buffer = Duration::from_secs(30);
        assert!(state.is_valid_at(now, buffer));
        assert!(state.is_valid_at(now + Duration::from_secs(9), buffer));
        assert!(!state.is_valid_at(now + Duration::from_secs(10), buffer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lived_grant_still_single_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(CredentialCache::new(SlowProvider {
            calls: Arc::clone(&calls),
            latency: Duration::from_millis(50),
            lifetime: Duration::from_secs(20),
        }));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move { cache.get_valid_token().await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "token-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // reused until half the lifetime has passed
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_rejection_keeps_newer_token() {
        let mut provider = MockTokenProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(grant("first", 300)));
        provider
            .expect_fetch_token()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(grant("second", 300)));

        let cache = CredentialCache::new(provider);
        let first = cache.valid_state().await.unwrap();
        cache.invalidate();
        let second = cache.valid_state().await.unwrap();

        // a late 401 for the old token leaves the new one in place
        assert!(!cache.invalidate_if_current(&first));
        assert_eq!(cache.get_valid_token().await.unwrap(), "second");

        assert!(cache.invalidate_if_current(&second));
    }
}
