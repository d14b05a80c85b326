//! PKCE exchange state for the OAuth authorization-code flow.
//!
//! The authorize step stores `state -> code_verifier`; the callback redeems it
//! exactly once. Redemption removes the entry under the same lock that reads
//! it, so two callbacks racing on one `state` cannot both get the verifier.
//! Entries older than [`PKCE_TTL`] read as absent and are removed on sight.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const PKCE_TTL: Duration = Duration::from_secs(5 * 60);

/// Challenges are always SHA-256, named the way the auth backend spells it.
pub const CODE_CHALLENGE_METHOD: &str = "s256";

#[derive(Debug)]
struct PkceEntry {
    code_verifier: String,
    created_at: Instant,
}

impl PkceEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

#[derive(Debug)]
pub struct PkceStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, PkceEntry>>,
}

impl Default for PkceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(PKCE_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn store(&self, state: &str, code_verifier: &str) {
        self.store_at(state, code_verifier, Instant::now()).await;
    }

    pub async fn store_at(&self, state: &str, code_verifier: &str, now: Instant) {
        self.entries.lock().await.insert(
            state.to_string(),
            PkceEntry {
                code_verifier: code_verifier.to_string(),
                created_at: now,
            },
        );
    }

    /// Redeem the verifier for `state`. Single use: the entry is gone after
    /// this call whether it was fresh or expired.
    pub async fn retrieve(&self, state: &str) -> Option<String> {
        self.retrieve_at(state, Instant::now()).await
    }

    pub async fn retrieve_at(&self, state: &str, now: Instant) -> Option<String> {
        let entry = self.entries.lock().await.remove(state)?;
        if entry.is_fresh(now, self.ttl) {
            Some(entry.code_verifier)
        } else {
            debug!("discarding expired PKCE state");
            None
        }
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now()).await
    }

    pub async fn cleanup_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Material for one authorization request.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceChallenge {
    /// Generate a new state/verifier pair from the OS CSPRNG.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn generate() -> Result<Self> {
        let code_verifier = random_token().context("failed to generate PKCE verifier")?;
        let state = random_token().context("failed to generate OAuth state")?;
        let code_challenge = code_challenge(&code_verifier);
        Ok(Self {
            state,
            code_verifier,
            code_challenge,
        })
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
#[must_use]
pub fn code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

fn random_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}
