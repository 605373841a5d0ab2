//! Owns the name->Session map, issues and verifies signed tokens, and
//! enforces the per-session inactivity TTL. One mutex guards the map and
//! timer arm/cancel; it is never held across store I/O.
//!
//! Each session gets one cancellable delayed eviction, implemented here as
//! an abortable `tokio::spawn`'d task rather than a shared min-heap
//! dispatcher - simpler to get right at this scale, and `resolve` resets
//! the deadline by aborting and respawning rather than bumping a generation
//! counter.

use crate::error::CoreError;
use crate::session::Session;
use crate::store::{StoreError, VariableStore};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    username: String,
}

struct Entry {
    session: Arc<Session>,
    timer: JoinHandle<()>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, Entry>>,
    store: Arc<dyn VariableStore>,
    signing_key: Vec<u8>,
    ttl: Duration,
}

pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

fn spawn_timer(inner: Arc<RegistryInner>, username: String) -> JoinHandle<()> {
    let ttl = inner.ttl;
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let mut map = inner.sessions.lock().await;
        if map.remove(&username).is_some() {
            tracing::debug!(%username, "session evicted after inactivity TTL");
        }
    })
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn VariableStore>, signing_key: Vec<u8>, ttl: Duration) -> Self {
        SessionRegistry {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                store,
                signing_key,
                ttl,
            }),
        }
    }

    fn issue_token(&self, username: &str) -> String {
        let claims = Claims {
            username: username.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.inner.signing_key),
        )
        .expect("HS256 token encoding cannot fail for a well-formed secret")
    }

    fn decode_token(&self, token: &str) -> Result<String, CoreError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.inner.signing_key),
            &validation,
        )
        .map_err(|_| CoreError::InvalidToken)?;
        Ok(data.claims.username)
    }

    async fn fresh_guest_username(&self) -> String {
        loop {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("system clock is after the epoch")
                .as_nanos();
            let candidate = format!("Guest_{nanos}");
            let map = self.inner.sessions.lock().await;
            if !map.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// `connect() -> (session, token)`.
    pub async fn connect(&self) -> (Arc<Session>, String) {
        let username = self.fresh_guest_username().await;
        let session = Arc::new(Session::new_guest(username.clone()));
        let timer = spawn_timer(self.inner.clone(), username.clone());
        {
            let mut map = self.inner.sessions.lock().await;
            map.insert(
                username.clone(),
                Entry {
                    session: session.clone(),
                    timer,
                },
            );
        }
        let token = self.issue_token(&username);
        (session, token)
    }

    /// `resolve(token) -> session | reject`, resetting the TTL on success.
    pub async fn resolve(&self, token: &str) -> Result<Arc<Session>, CoreError> {
        let username = self.decode_token(token)?;
        let mut map = self.inner.sessions.lock().await;
        let entry = map.get_mut(&username).ok_or(CoreError::InvalidToken)?;
        entry.timer.abort();
        entry.timer = spawn_timer(self.inner.clone(), username.clone());
        Ok(entry.session.clone())
    }

    /// Renames `session`'s map entry from its current username to
    /// `new_username` under a single lock acquisition. Returns `false`
    /// (without mutating anything) if another live session already holds
    /// `new_username`.
    async fn rename(&self, session: &Arc<Session>, new_username: &str) -> Result<bool, CoreError> {
        let mut map = self.inner.sessions.lock().await;
        if map.contains_key(new_username) {
            return Ok(false);
        }
        let old_username = session.username().await;
        let entry = map.remove(&old_username).ok_or(CoreError::InvalidToken)?;
        session.set_username(new_username.to_string()).await;
        map.insert(new_username.to_string(), entry);
        Ok(true)
    }

    /// `login(session, username, passwd) -> newToken | fail`. Business
    /// failures (bad credentials, reserved name, name already live) resolve
    /// to `Ok(None)` - only registry/store malfunctions are `Err`, matching
    /// the HTTP contract's `{token: str | null}` 200 response.
    pub async fn login(
        &self,
        session: &Arc<Session>,
        username: &str,
        passwd: &str,
    ) -> Result<Option<String>, CoreError> {
        if username == "Guest" {
            return Ok(None);
        }
        match self.inner.store.verify(username, passwd).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) | Err(StoreError::WrongPassword(_)) => return Ok(None),
            Err(other) => return Err(CoreError::Store(other)),
        }
        if !self.rename(session, username).await? {
            return Ok(None);
        }
        session.set_logged_in(true).await;
        Ok(Some(self.issue_token(username)))
    }

    /// `register(session, username, passwd) -> newToken | fail`.
    pub async fn register(
        &self,
        session: &Arc<Session>,
        username: &str,
        passwd: &str,
    ) -> Result<Option<String>, CoreError> {
        if username == "Guest" {
            return Ok(None);
        }
        match self.inner.store.insert_default(username, passwd).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Ok(None),
            Err(other) => return Err(CoreError::Store(other)),
        }
        if !self.rename(session, username).await? {
            return Ok(None);
        }
        session.set_logged_in(true).await;
        Ok(Some(self.issue_token(username)))
    }

    /// `evict(username)`: cancels the timer and removes the entry.
    pub async fn evict(&self, username: &str) {
        let mut map = self.inner.sessions.lock().await;
        if let Some(entry) = map.remove(username) {
            entry.timer.abort();
        }
    }

    pub fn store(&self) -> &Arc<dyn VariableStore> {
        &self.inner.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{VariableSchema, VariableValue};
    use crate::store_memory::MemoryStore;

    fn registry() -> SessionRegistry {
        let mut schema = VariableSchema::new();
        schema.declare("balance", VariableValue::Int(0)).unwrap();
        let store: Arc<dyn VariableStore> = Arc::new(MemoryStore::new(schema));
        SessionRegistry::new(store, b"test-secret".to_vec(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn connect_then_resolve_returns_same_session() {
        let reg = registry();
        let (session, token) = reg.connect().await;
        let resolved = reg.resolve(&token).await.unwrap();
        assert_eq!(resolved.username().await, session.username().await);
    }

    #[tokio::test]
    async fn resolve_rejects_forged_token() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("not-a-jwt").await.unwrap_err(),
            CoreError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn resolve_rejects_token_for_evicted_session() {
        let reg = registry();
        let (_session, token) = reg.connect().await;
        let username = reg.resolve(&token).await.unwrap().username().await;
        reg.evict(&username).await;
        assert!(matches!(
            reg.resolve(&token).await.unwrap_err(),
            CoreError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn register_then_login_renames_session() {
        let reg = registry();
        let (session, _token) = reg.connect().await;
        let new_token = reg.register(&session, "alice", "pw").await.unwrap();
        assert!(new_token.is_some());
        assert_eq!(session.username().await, "alice");
        assert!(session.is_logged_in().await);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_username() {
        let reg = registry();
        let (session1, _) = reg.connect().await;
        reg.register(&session1, "alice", "pw").await.unwrap();

        let (session2, _) = reg.connect().await;
        let result = reg.register(&session2, "alice", "pw2").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn login_rejects_guest_username() {
        let reg = registry();
        let (session, _) = reg.connect().await;
        let result = reg.login(&session, "Guest", "").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let reg = registry();
        let (session1, _) = reg.connect().await;
        reg.register(&session1, "alice", "pw").await.unwrap();

        let (session2, _) = reg.connect().await;
        let result = reg.login(&session2, "alice", "wrong").await.unwrap();
        assert!(result.is_none());
    }
}
