//! Auth and database backend (GoTrue-style auth, PostgREST-style tables).
//!
//! Requests carry the project `apikey` header. Table access is authorized
//! either as the signed-in user (their access token) or as the service role,
//! which bypasses row level security and is reserved for server-side updates
//! such as marking an email verified or applying payment webhooks.

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::instrument;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{check, decode, http_client, transport, Endpoint, UpstreamError};

const SERVICE: &str = "backend";

/// Who a table request runs as.
#[derive(Clone, Copy, Debug)]
pub enum BackendAuth<'a> {
    User(&'a str),
    Service,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: AuthUser,
}

/// One `column = value` equality filter.
pub type Filter<'a> = (&'a str, String);

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    endpoint: Endpoint,
    service_key: SecretString,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("endpoint", &self.endpoint)
            .field("service_key", &"***")
            .finish()
    }
}

impl BackendClient {
    /// `endpoint` carries the public (anon) key; `service_key` authorizes
    /// server-side table writes.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Endpoint,
        service_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http_client(SERVICE, timeout)?,
            endpoint,
            service_key,
        })
    }

    fn authorize(&self, request: RequestBuilder, auth: BackendAuth<'_>) -> RequestBuilder {
        let bearer = match auth {
            BackendAuth::User(token) => token,
            BackendAuth::Service => self.service_key.expose_secret(),
        };
        let apikey = match auth {
            BackendAuth::User(_) => self.endpoint.api_key(),
            BackendAuth::Service => self.service_key.expose_secret(),
        };
        request.header("apikey", apikey).bearer_auth(bearer)
    }

    /// Register a new account. `metadata` lands in the user's metadata.
    #[instrument(skip(self, password, metadata))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthUser, UpstreamError> {
        let url = self.endpoint.url("/auth/v1/signup")?;
        let response = self
            .client
            .post(url)
            .header("apikey", self.endpoint.api_key())
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        // Depending on the project settings the user comes back bare or
        // wrapped in a session.
        let body: Value = decode(SERVICE, response).await?;
        let user = body.get("user").cloned().unwrap_or(body);
        serde_json::from_value(user).map_err(|e| UpstreamError::payload(SERVICE, e.to_string()))
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, UpstreamError> {
        let mut url = self.endpoint.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", self.endpoint.api_key())
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    /// Redeem an OAuth authorization code with the PKCE verifier.
    #[instrument(skip(self, auth_code, code_verifier))]
    pub async fn exchange_code_for_session(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<Session, UpstreamError> {
        let mut url = self.endpoint.url("/auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "pkce");

        let response = self
            .client
            .post(url)
            .header("apikey", self.endpoint.api_key())
            .json(&json!({ "auth_code": auth_code, "code_verifier": code_verifier }))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    /// URL the browser is sent to for a third-party OAuth sign-in.
    ///
    /// # Errors
    /// Returns an error if the backend URL cannot be joined.
    pub fn authorize_url(
        &self,
        provider: &str,
        redirect_to: &str,
        code_challenge: &str,
        code_challenge_method: &str,
    ) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint.url("/auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", code_challenge_method);
        Ok(url)
    }

    /// Resolve the user behind an access token.
    #[instrument(skip(self, access_token))]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, UpstreamError> {
        let url = self.endpoint.url("/auth/v1/user")?;
        let response = self
            .authorize(self.client.get(url), BackendAuth::User(access_token))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    fn table_url(&self, table: &str, filters: &[Filter<'_>]) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint.url(&format!("/rest/v1/{table}"))?;
        if !filters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (column, value) in filters {
                query.append_pair(column, &format!("eq.{value}"));
            }
        }
        Ok(url)
    }

    #[instrument(skip(self, auth))]
    pub async fn select(
        &self,
        table: &str,
        auth: BackendAuth<'_>,
        filters: &[Filter<'_>],
    ) -> Result<Vec<Value>, UpstreamError> {
        let mut url = self.table_url(table, filters)?;
        url.query_pairs_mut().append_pair("select", "*");

        let response = self
            .authorize(self.client.get(url), auth)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    #[instrument(skip(self, auth, row))]
    pub async fn insert(
        &self,
        table: &str,
        auth: BackendAuth<'_>,
        row: &Value,
    ) -> Result<Value, UpstreamError> {
        let url = self.table_url(table, &[])?;
        let response = self
            .authorize(self.client.post(url), auth)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let rows: Vec<Value> = decode(SERVICE, response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| UpstreamError::payload(SERVICE, format!("insert into {table} returned no rows")))
    }

    /// Patch every row matching `filters`, returning the updated rows.
    #[instrument(skip(self, auth, patch))]
    pub async fn update(
        &self,
        table: &str,
        auth: BackendAuth<'_>,
        filters: &[Filter<'_>],
        patch: &Value,
    ) -> Result<Vec<Value>, UpstreamError> {
        if filters.is_empty() {
            // never patch a whole table
            return Err(UpstreamError::payload(SERVICE, "update without filters"));
        }

        let url = self.table_url(table, filters)?;
        let response = self
            .authorize(self.client.patch(url), auth)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        decode(SERVICE, response).await
    }

    /// Ping the auth health endpoint.
    pub async fn health(&self) -> Result<(), UpstreamError> {
        let url = self.endpoint.url("/auth/v1/health")?;
        let response = self
            .client
            .get(url)
            .header("apikey", self.endpoint.api_key())
            .send()
            .await
            .map_err(transport(SERVICE))?;
        check(SERVICE, response).await.map(|_| ())
    }
}
