//! Email verification codes.
//!
//! Signup issues a six digit code per email; the verify endpoint checks it.
//! Keys are normalized (trimmed, lower-cased) so the lookup is
//! case-insensitive. A second `issue` for the same email replaces the first
//! code. Successful checks leave the entry in place until it expires.

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::normalize_email;

#[derive(Debug)]
struct VerificationEntry {
    code: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct VerificationCodeStore {
    entries: Mutex<HashMap<String, VerificationEntry>>,
}

impl VerificationCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh code for `email`, valid for `ttl`.
    pub async fn issue(&self, email: &str, ttl: Duration) -> String {
        self.issue_at(email, ttl, Instant::now()).await
    }

    pub async fn issue_at(&self, email: &str, ttl: Duration, now: Instant) -> String {
        let code = generate_code();
        let key = normalize_email(email);
        debug!(email = %key, ttl_seconds = ttl.as_secs(), "issuing verification code");
        // a ttl past the clock's range yields a code that is already expired
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| {
            warn!(ttl_seconds = ttl.as_secs(), "verification code ttl out of range");
            now
        });
        self.entries.lock().await.insert(
            key,
            VerificationEntry {
                code: code.clone(),
                expires_at,
            },
        );
        code
    }

    /// Check `code` against the live entry for `email`.
    ///
    /// Returns `false` when there is no entry, the code differs or the entry
    /// has expired. Never mutates the store.
    pub async fn verify(&self, email: &str, code: &str) -> bool {
        self.verify_at(email, code, Instant::now()).await
    }

    pub async fn verify_at(&self, email: &str, code: &str, now: Instant) -> bool {
        let key = normalize_email(email);
        let entries = self.entries.lock().await;
        entries
            .get(&key)
            .is_some_and(|entry| entry.code == code && now < entry.expires_at)
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    pub async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Uniform six digit code in `100000..=999999`.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}
