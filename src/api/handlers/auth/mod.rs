//! Auth handlers: password signup with emailed codes, password login, and
//! OAuth sign-in with PKCE.
//!
//! Verification codes and PKCE verifiers live in process-local stores (see
//! [`crate::stores`]), so a flow must finish on the instance that started it.

pub(crate) mod login;
pub(crate) mod oauth;
pub(crate) mod principal;
pub(crate) mod signup;
mod state;
pub(crate) mod types;
pub(crate) mod verification;

pub use principal::{require_auth, Principal};
pub use state::{AuthConfig, AuthState};
