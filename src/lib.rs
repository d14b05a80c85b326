//! # Hearts (greeting card studio API)
//!
//! `hearts` is the HTTP backend behind the card studio. Users register, keep a
//! list of the people they send cards to ("hearts"), generate card copy and
//! artwork, pay for subscriptions and have printed cards mailed.
//!
//! ## Collaborators
//!
//! Almost every route is a thin adapter in front of one external service:
//! the auth/database backend, the payment processor, the transactional email
//! sender, the card template renderer, the address validator, the AI content
//! service and the print fulfillment API. Clients for each live in
//! [`upstream`].
//!
//! ## Short-lived state
//!
//! Two flows need state that outlives a single request:
//!
//! - **Email verification codes:** six digit codes emailed on signup, keyed by
//!   the normalized email and valid until their expiry.
//! - **PKCE exchanges:** the OAuth `state` maps to the code verifier for five
//!   minutes and can be redeemed once.
//!
//! Both live in process memory ([`stores`]). A deployment running more than
//! one instance must pin an OAuth flow to a single instance.

pub mod api;
pub mod cli;
pub mod stores;
pub mod upstream;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
