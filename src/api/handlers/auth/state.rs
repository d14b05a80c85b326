//! Auth flow configuration and the in-memory stores behind it.

use std::sync::Arc;
use std::time::Duration;

use crate::stores::{PkceStore, VerificationCodeStore};

const DEFAULT_VERIFICATION_CODE_TTL_SECONDS: u64 = 10 * 60;
const OAUTH_CALLBACK_PATH: &str = "/auth/callback";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    verification_code_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            verification_code_ttl_seconds: DEFAULT_VERIFICATION_CODE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_verification_code_ttl_seconds(mut self, seconds: u64) -> Self {
        self.verification_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn verification_code_ttl(&self) -> Duration {
        Duration::from_secs(self.verification_code_ttl_seconds)
    }

    /// Where the OAuth provider sends the browser back to.
    pub(crate) fn oauth_redirect_url(&self) -> String {
        format!("{}{OAUTH_CALLBACK_PATH}", self.frontend_base_url)
    }
}

#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    codes: Arc<VerificationCodeStore>,
    pkce: Arc<PkceStore>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, codes: Arc<VerificationCodeStore>, pkce: Arc<PkceStore>) -> Self {
        Self {
            config,
            codes,
            pkce,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codes(&self) -> &Arc<VerificationCodeStore> {
        &self.codes
    }

    #[must_use]
    pub fn pkce(&self) -> &Arc<PkceStore> {
        &self.pkce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new("https://hearts.cards/".to_string());
        assert_eq!(config.frontend_base_url(), "https://hearts.cards");
        assert_eq!(config.verification_code_ttl(), Duration::from_secs(600));
        assert_eq!(
            config.oauth_redirect_url(),
            "https://hearts.cards/auth/callback"
        );

        let config = config.with_verification_code_ttl_seconds(60);
        assert_eq!(config.verification_code_ttl(), Duration::from_secs(60));
    }
}
