//! Process-local, TTL-bounded stores for the verification and OAuth flows.

pub mod pkce;
pub mod verification;

pub use pkce::{PkceChallenge, PkceStore, CODE_CHALLENGE_METHOD, PKCE_TTL};
pub use verification::VerificationCodeStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, Instrument};

/// Normalize an email for use as a store key.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Periodically drop expired entries from both stores.
///
/// Expiry is enforced on read, so this only bounds memory.
pub fn spawn_cleanup(
    codes: Arc<VerificationCodeStore>,
    pkce: Arc<PkceStore>,
    every: Duration,
) -> JoinHandle<()> {
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };

    tokio::spawn(
        async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;

                let codes_removed = codes.purge_expired().await;
                let pkce_removed = pkce.cleanup().await;

                if codes_removed > 0 || pkce_removed > 0 {
                    debug!(codes_removed, pkce_removed, "expired store entries removed");
                }
            }
        }
        .instrument(tracing::info_span!("stores.cleanup")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn cleanup_task_purges_expired_entries() {
        let codes = Arc::new(VerificationCodeStore::new());
        let pkce = Arc::new(PkceStore::with_ttl(Duration::ZERO));
        codes.issue("old@x.com", Duration::ZERO).await;
        pkce.store("stale", "v").await;

        // the first tick fires immediately
        let handle = spawn_cleanup(codes.clone(), pkce.clone(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(codes.is_empty().await);
        assert!(pkce.is_empty().await);
        handle.abort();
    }
}
