//! Access token cache with single-flight refresh.
//!
//! The short-lived access token lives only in memory. The refresh token and
//! the last known admin profile live in client storage so a session survives
//! restarts. When the access token is missing or about to expire, the first
//! caller starts a refresh and every concurrent caller awaits that same
//! refresh instead of starting its own.

use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::clock::Clock;
use crate::models::AdminUser;
use crate::storage::{ClientStore, StorageError, REFRESH_TOKEN_KEY, USER_KEY};

/// Tokens expiring within this window count as expired (10 seconds)
pub const DEFAULT_REFRESH_BUFFER_MS: i64 = 10_000;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Expiry of a JWT in epoch milliseconds, read without verifying the signature
pub fn token_expiry_ms(token: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    Some(data.claims.exp.saturating_mul(1000))
}

/// Whether `token` should be treated as expired at `now_ms`.
///
/// A token is expired once less than `buffer_ms` of its lifetime remains.
/// A missing or undecodable token is always expired.
pub fn is_expired_at(token: Option<&str>, now_ms: i64, buffer_ms: i64) -> bool {
    match token.and_then(token_expiry_ms) {
        Some(expiry_ms) => expiry_ms < now_ms.saturating_add(buffer_ms),
        None => true,
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

struct InflightRefresh {
    generation: u64,
    future: RefreshFuture,
}

struct TokenState {
    access_token: RwLock<Option<String>>,
    store: Arc<dyn ClientStore>,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    buffer_ms: i64,
    refresh: Mutex<Option<InflightRefresh>>,
    generation: AtomicU64,
}

/// Owns the credential pair and hands out valid access tokens.
///
/// Cheap to clone; clones share the same cache and in-flight refresh.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<TokenState>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn ClientStore>,
        backend: Arc<dyn Backend>,
        clock: Arc<dyn Clock>,
        buffer_ms: i64,
    ) -> Self {
        Self {
            inner: Arc::new(TokenState {
                access_token: RwLock::new(None),
                store,
                backend,
                clock,
                buffer_ms,
                refresh: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// The cached access token, without checking its expiry
    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.inner.access_token.write() = token;
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn set_refresh_token(&self, token: Option<&str>) -> Result<(), StorageError> {
        match token {
            Some(token) => self.inner.store.set(REFRESH_TOKEN_KEY, token),
            None => self.inner.store.remove(REFRESH_TOKEN_KEY),
        }
    }

    /// The admin profile saved at the last login or restore
    pub fn stored_user(&self) -> Option<AdminUser> {
        let raw = self.inner.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored user");
                None
            }
        }
    }

    pub fn set_stored_user(&self, user: Option<&AdminUser>) -> Result<(), StorageError> {
        match user {
            Some(user) => self.inner.store.set(USER_KEY, &serde_json::to_string(user)?),
            None => self.inner.store.remove(USER_KEY),
        }
    }

    pub fn is_access_token_expired(&self) -> bool {
        let token = self.inner.access_token.read();
        is_expired_at(token.as_deref(), self.inner.clock.now_ms(), self.inner.buffer_ms)
    }

    /// A usable access token, refreshing it first if needed.
    ///
    /// Returns `None` when there is no refresh token or the refresh failed.
    pub async fn ensure_valid_token(&self) -> Option<String> {
        if let Some(token) = self.unexpired_token() {
            return Some(token);
        }
        self.refresh_or_join().await
    }

    fn unexpired_token(&self) -> Option<String> {
        let token = self.inner.access_token.read();
        if is_expired_at(token.as_deref(), self.inner.clock.now_ms(), self.inner.buffer_ms) {
            None
        } else {
            token.clone()
        }
    }

    /// Join the in-flight refresh, or start one.
    ///
    /// The token is checked again under the slot lock: a refresh that
    /// finished after the caller saw an expired token must not be repeated.
    async fn refresh_or_join(&self) -> Option<String> {
        let (generation, refresh) = {
            let mut slot = self.inner.refresh.lock();
            match slot.as_ref() {
                Some(inflight) => (inflight.generation, inflight.future.clone()),
                None => {
                    if let Some(token) = self.unexpired_token() {
                        return Some(token);
                    }
                    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = refresh_access_token(self.inner.clone()).boxed().shared();
                    *slot = Some(InflightRefresh {
                        generation,
                        future: future.clone(),
                    });
                    (generation, future)
                }
            }
        };

        let token = refresh.await;

        let mut slot = self.inner.refresh.lock();
        if slot.as_ref().is_some_and(|inflight| inflight.generation == generation) {
            *slot = None;
        }
        token
    }

    /// Forget the access token and remove both persisted keys
    pub fn clear_all(&self) {
        *self.inner.access_token.write() = None;
        for key in [REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.inner.store.remove(key) {
                warn!(key, error = %e, "Failed to clear client storage");
            }
        }
        debug!("Cleared stored credentials");
    }
}

async fn refresh_access_token(state: Arc<TokenState>) -> Option<String> {
    let Some(refresh_token) = state.store.get(REFRESH_TOKEN_KEY) else {
        debug!("No refresh token stored, cannot refresh");
        return None;
    };

    debug!("Refreshing access token");
    let reply = match state.backend.refresh(&refresh_token).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            return None;
        }
    };

    let access_token = match reply.access_token {
        Some(token) if reply.success => token,
        _ => {
            warn!(
                error = reply.error.as_deref().unwrap_or("no access token returned"),
                "Token refresh rejected"
            );
            return None;
        }
    };

    *state.access_token.write() = Some(access_token.clone());
    if let Some(rotated) = reply.refresh_token.as_deref() {
        if let Err(e) = state.store.set(REFRESH_TOKEN_KEY, rotated) {
            warn!(error = %e, "Failed to store rotated refresh token");
        }
    }
    Some(access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::MemoryBackendConfig;
    use crate::storage::MemoryStore;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000_000;

    fn token_expiring_at(exp_secs: i64) -> String {
        encode(
            &Header::default(),
            &json!({ "sub": "admin", "exp": exp_secs }),
            &EncodingKey::from_secret(b"unrelated"),
        )
        .unwrap()
    }

    struct Fixture {
        tokens: TokenManager,
        backend: Arc<MemoryBackend>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(latency: Option<Duration>) -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let config = MemoryBackendConfig::default();
        let mut backend = MemoryBackend::from_config(&config, clock.clone());
        if let Some(latency) = latency {
            backend = backend.with_latency(latency);
        }
        let backend = Arc::new(backend);
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(
            store.clone(),
            backend.clone(),
            clock.clone(),
            DEFAULT_REFRESH_BUFFER_MS,
        );
        Fixture {
            tokens,
            backend,
            store,
            clock,
        }
    }

    async fn sign_in(fixture: &Fixture) {
        let reply = fixture.backend.login("admin@localhost", "admin").await.unwrap();
        fixture
            .tokens
            .set_refresh_token(reply.refresh_token.as_deref())
            .unwrap();
        fixture.tokens.set_access_token(reply.access_token);
    }

    #[test]
    fn test_expiry_buffer_boundary() {
        let exp_secs = NOW / 1000 + 600;
        let token = token_expiring_at(exp_secs);
        let exp_ms = exp_secs * 1000;

        assert_eq!(token_expiry_ms(&token), Some(exp_ms));
        // 1ms less than the buffer remains
        assert!(is_expired_at(Some(&token), exp_ms - 9_999, 10_000));
        // 1ms more than the buffer remains
        assert!(!is_expired_at(Some(&token), exp_ms - 10_001, 10_000));
    }

    #[test]
    fn test_missing_or_malformed_token_is_expired() {
        assert!(is_expired_at(None, NOW, 0));
        assert!(is_expired_at(Some("not-a-jwt"), NOW, 0));
        assert!(is_expired_at(Some("a.b.c"), NOW, 0));

        let no_exp = encode(
            &Header::default(),
            &json!({ "sub": "admin" }),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();
        assert!(is_expired_at(Some(&no_exp), NOW, 0));
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let fixture = fixture(None);
        sign_in(&fixture).await;
        let cached = fixture.tokens.access_token();

        assert_eq!(fixture.tokens.ensure_valid_token().await, cached);
        assert_eq!(fixture.backend.calls().refresh(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let fixture = fixture(Some(Duration::from_millis(50)));
        sign_in(&fixture).await;
        let stale = fixture.tokens.access_token();
        fixture.clock.advance(15 * 60 * 1000);
        assert!(fixture.tokens.is_access_token_expired());

        let callers = (0..10).map(|_| {
            let tokens = fixture.tokens.clone();
            tokio::spawn(async move { tokens.ensure_valid_token().await })
        });
        let results: Vec<Option<String>> = futures::future::join_all(callers)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(fixture.backend.calls().refresh(), 1);
        let first = results[0].clone().expect("refresh should succeed");
        assert_ne!(Some(first.clone()), stale);
        assert!(results.iter().all(|token| token.as_deref() == Some(first.as_str())));
        assert_eq!(fixture.tokens.access_token(), Some(first));

        // The slot is free again: a later expiry triggers a second refresh
        fixture.clock.advance(15 * 60 * 1000);
        assert!(fixture.tokens.ensure_valid_token().await.is_some());
        assert_eq!(fixture.backend.calls().refresh(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_caller_joins_inflight_refresh() {
        let fixture = fixture(Some(Duration::from_millis(50)));
        sign_in(&fixture).await;
        fixture.tokens.set_access_token(None);

        let mut first = tokio_test::task::spawn(fixture.tokens.ensure_valid_token());
        let mut second = tokio_test::task::spawn(fixture.tokens.ensure_valid_token());
        tokio_test::assert_pending!(first.poll());
        tokio_test::assert_pending!(second.poll());
        assert_eq!(fixture.backend.calls().refresh(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let a = tokio_test::assert_ready!(first.poll());
        let b = tokio_test::assert_ready!(second.poll());

        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(fixture.backend.calls().refresh(), 1);
    }

    #[tokio::test]
    async fn test_late_caller_reuses_token_from_finished_refresh() {
        let fixture = fixture(None);
        sign_in(&fixture).await;
        fixture.clock.advance(15 * 60 * 1000);
        assert!(fixture.tokens.is_access_token_expired());

        // One caller refreshes to completion and frees the slot
        let fresh = fixture.tokens.ensure_valid_token().await;
        assert!(fresh.is_some());
        assert_eq!(fixture.backend.calls().refresh(), 1);

        // A caller that saw the stale token before that refresh stored its
        // result now finds an empty slot and a valid token
        assert_eq!(fixture.tokens.refresh_or_join().await, fresh);
        assert_eq!(fixture.backend.calls().refresh(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rotates_stored_refresh_token() {
        let fixture = fixture(None);
        sign_in(&fixture).await;
        let before = fixture.tokens.refresh_token();
        fixture.tokens.set_access_token(None);

        assert!(fixture.tokens.ensure_valid_token().await.is_some());
        assert!(fixture.tokens.refresh_token().is_some());
        assert_ne!(fixture.tokens.refresh_token(), before);
    }

    #[tokio::test]
    async fn test_no_refresh_token_yields_none() {
        let fixture = fixture(None);

        assert!(fixture.tokens.ensure_valid_token().await.is_none());
        assert_eq!(fixture.backend.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_rejected_or_failed_refresh_yields_none() {
        let fixture = fixture(None);
        sign_in(&fixture).await;
        fixture.tokens.set_access_token(None);

        fixture.backend.revoke_refresh_tokens();
        assert!(fixture.tokens.ensure_valid_token().await.is_none());

        fixture.backend.set_offline(true);
        assert!(fixture.tokens.ensure_valid_token().await.is_none());
        assert_eq!(fixture.backend.calls().refresh(), 2);
    }

    #[tokio::test]
    async fn test_clear_all_removes_everything() {
        let fixture = fixture(None);
        sign_in(&fixture).await;
        fixture
            .tokens
            .set_stored_user(Some(&AdminUser::new("admin", "admin@localhost")))
            .unwrap();
        assert_eq!(fixture.store.len(), 2);

        fixture.tokens.clear_all();

        assert!(fixture.store.is_empty());
        assert!(fixture.tokens.access_token().is_none());
        assert!(fixture.tokens.stored_user().is_none());
    }
}
