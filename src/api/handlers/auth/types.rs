//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub user_id: String,
    pub email: String,
    /// False when the code could not be emailed; the client may call resend.
    pub verification_sent: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// OAuth provider name, e.g. `google`.
    pub provider: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_debug_hides_password() {
        let request = LoginRequest {
            email: "ana@hearts.cards".to_string(),
            password: "hunter22".to_string(),
        };
        let rendered = format!("{request:?}");
        assert!(rendered.contains("ana@hearts.cards"));
        assert!(!rendered.contains("hunter22"));
    }
}
