//! Password-gated page sessions.
//!
//! Sessions live in memory only; a restart logs everyone out.

use crate::config::AuthConfig;
use axum::http::{header, HeaderMap};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "voicegate_session";

const SESSION_ID_BYTES: usize = 32;

/// In-memory session table with sliding expiry.
#[derive(Clone, Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Arc<Mutex<HashMap<String, Instant>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("session table lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Opens a new session and returns its id.
    ///
    /// # Errors
    ///
    /// Fails when the OS random source is unavailable.
    pub fn create(&self) -> Result<String, rand::Error> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rngs::OsRng.try_fill_bytes(&mut bytes)?;
        let id = hex::encode(bytes);

        let now = Instant::now();
        let mut sessions = self.lock();
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.insert(id.clone(), now + self.ttl);
        Ok(id)
    }

    /// Whether `id` names a live session. A live session's expiry is pushed
    /// out by another full TTL.
    pub fn touch(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.lock();
        match sessions.get_mut(id) {
            Some(expires_at) if *expires_at > now => {
                *expires_at = now + self.ttl;
                true
            }
            Some(_) => {
                sessions.remove(id);
                false
            }
            None => false,
        }
    }
}

/// Page password gate.
#[derive(Debug)]
pub struct PageGate {
    passwords: Vec<String>,
    development: bool,
    pub sessions: SessionStore,
}

impl PageGate {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            passwords: config.passwords(),
            development: config.is_development(),
            sessions: SessionStore::new(Duration::from_secs(config.session_ttl_seconds)),
        }
    }

    /// Development deployments skip the password check.
    pub fn is_bypassed(&self) -> bool {
        self.development
    }

    pub fn accepts(&self, password: &str) -> bool {
        !password.is_empty() && self.passwords.iter().any(|valid| valid == password)
    }

    /// Whether the request carries a live session cookie.
    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        session_id(headers).is_some_and(|id| self.sessions.touch(id))
    }

    /// `Set-Cookie` value for a freshly opened session.
    pub fn cookie(&self, id: &str) -> String {
        format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.sessions.ttl().as_secs()
        )
    }
}

/// Extracts the session id from the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate(passwords: &[&str], app_env: &str) -> PageGate {
        PageGate::new(&AuthConfig {
            page_passwords: passwords.iter().map(|p| p.to_string()).collect(),
            app_env: app_env.to_string(),
            session_ttl_seconds: 60,
        })
    }

    #[test]
    fn only_configured_passwords_are_accepted() {
        let gate = gate(&["alpha", "beta"], "production");
        assert!(gate.accepts("alpha"));
        assert!(gate.accepts("beta"));
        assert!(!gate.accepts("gamma"));
        assert!(!gate.accepts(""));
        assert!(!gate.is_bypassed());
    }

    #[test]
    fn development_bypasses_the_gate() {
        assert!(gate(&[], "Development").is_bypassed());
    }

    #[test]
    fn sessions_expire() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create().unwrap();
        assert!(!store.touch(&id));

        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().unwrap();
        assert_eq!(id.len(), SESSION_ID_BYTES * 2);
        assert!(store.touch(&id));
        assert!(!store.touch("unknown"));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("lang=en; voicegate_session=abc123"),
        );
        assert_eq!(session_id(&headers), Some("abc123"));

        let mut empty = HeaderMap::new();
        empty.append(header::COOKIE, HeaderValue::from_static("voicegate_session="));
        assert_eq!(session_id(&empty), None);
    }
}
