//! Hearts: the people a user sends cards to.
//!
//! Rows are read and written with the caller's own access token, and every
//! query is also filtered on `user_id`, so a heart owned by someone else
//! reads as missing (404).

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::require_auth;
use super::{missing_payload, upstream_error_response, Upstreams};
use crate::upstream::{
    backend::{BackendAuth, BackendClient},
    UpstreamError,
};

const TABLE: &str = "hearts";

/// Writable heart columns. All optional so the same type serves create and
/// patch; `name` is required on create.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct HeartFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl HeartFields {
    fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_object().map(serde_json::Map::is_empty))
            .unwrap_or(true)
    }

    /// Check the values that are present.
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Name is required".to_string());
            }
        }
        if let Some(birthday) = &self.birthday {
            if !valid_date(birthday) {
                return Err("Birthday must be YYYY-MM-DD".to_string());
            }
        }
        Ok(())
    }
}

fn valid_date(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    let (year, month, day) = match parts.as_slice() {
        [year, month, day] => (*year, *month, *day),
        _ => return false,
    };
    let digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    if !(digits(year, 4) && digits(month, 2) && digits(day, 2)) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12)) && matches!(day.parse::<u8>(), Ok(1..=31))
}

/// Fetch one heart if `user_id` owns it.
pub(crate) async fn fetch_owned_heart(
    backend: &BackendClient,
    access_token: &str,
    user_id: Uuid,
    heart_id: Uuid,
) -> Result<Option<Value>, UpstreamError> {
    let rows = backend
        .select(
            TABLE,
            BackendAuth::User(access_token),
            &[("id", heart_id.to_string()), ("user_id", user_id.to_string())],
        )
        .await?;
    Ok(rows.into_iter().next())
}

#[utoipa::path(
    get,
    path = "/v1/hearts",
    responses(
        (status = 200, description = "Hearts owned by the caller", body = [Object]),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "hearts"
)]
pub async fn list_hearts(headers: HeaderMap, upstreams: Extension<Arc<Upstreams>>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    match upstreams
        .backend
        .select(
            TABLE,
            BackendAuth::User(&principal.access_token),
            &[("user_id", principal.user_id.to_string())],
        )
        .await
    {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => upstream_error_response("list hearts", &err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/hearts",
    request_body = HeartFields,
    responses(
        (status = 201, description = "Heart created", body = Object),
        (status = 400, description = "Invalid heart", body = String),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "hearts"
)]
pub async fn create_heart(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    payload: Option<Json<HeartFields>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let fields: HeartFields = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if fields.name.is_none() {
        return (StatusCode::BAD_REQUEST, "Name is required".to_string()).into_response();
    }
    if let Err(message) = fields.validate() {
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    let mut row = match serde_json::to_value(&fields) {
        Ok(row) => row,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid heart: {err}")).into_response()
        }
    };
    row["user_id"] = Value::String(principal.user_id.to_string());

    match upstreams
        .backend
        .insert(TABLE, BackendAuth::User(&principal.access_token), &row)
        .await
    {
        Ok(heart) => {
            info!(user_id = %principal.user_id, "heart created");
            (StatusCode::CREATED, Json(heart)).into_response()
        }
        Err(err) => upstream_error_response("create heart", &err),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/hearts/{id}",
    params(("id" = Uuid, Path, description = "Heart id")),
    request_body = HeartFields,
    responses(
        (status = 200, description = "Heart updated", body = Object),
        (status = 400, description = "Invalid update", body = String),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "No heart with this id for the caller", body = String)
    ),
    tag = "hearts"
)]
pub async fn update_heart(
    headers: HeaderMap,
    upstreams: Extension<Arc<Upstreams>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<HeartFields>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &upstreams.backend).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    let fields: HeartFields = match payload {
        Some(Json(payload)) => payload,
        None => return missing_payload(),
    };

    if fields.is_empty() {
        return (StatusCode::BAD_REQUEST, "Nothing to update".to_string()).into_response();
    }
    if let Err(message) = fields.validate() {
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    let patch = match serde_json::to_value(&fields) {
        Ok(patch) => patch,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid heart: {err}")).into_response()
        }
    };

    match upstreams
        .backend
        .update(
            TABLE,
            BackendAuth::User(&principal.access_token),
            &[("id", id.to_string()), ("user_id", principal.user_id.to_string())],
            &patch,
        )
        .await
    {
        Ok(rows) => match rows.into_iter().next() {
            Some(heart) => (StatusCode::OK, Json(heart)).into_response(),
            None => (StatusCode::NOT_FOUND, "Heart not found".to_string()).into_response(),
        },
        Err(err) => upstream_error_response("update heart", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn empty_patch_is_detected() {
        assert!(HeartFields::default().is_empty());
        let fields = HeartFields {
            notes: Some("likes tulips".to_string()),
            ..HeartFields::default()
        };
        assert!(!fields.is_empty());
    }

    #[test]
    fn validation_checks_present_values() {
        let blank_name = HeartFields {
            name: Some("  ".to_string()),
            ..HeartFields::default()
        };
        assert!(blank_name.validate().is_err());

        let bad_birthday = HeartFields {
            birthday: Some("1990-13-01".to_string()),
            ..HeartFields::default()
        };
        assert!(bad_birthday.validate().is_err());

        let ok = HeartFields {
            name: Some("Ana".to_string()),
            birthday: Some("1990-02-28".to_string()),
            ..HeartFields::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn dates() {
        assert!(valid_date("2000-01-31"));
        assert!(!valid_date("2000-1-31"));
        assert!(!valid_date("2000-01-32"));
        assert!(!valid_date("01/31/2000"));
        assert!(!valid_date("2000-01-31-1"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: Result<HeartFields, _> =
            serde_json::from_value(json!({"name": "Ana", "user_id": "someone-else"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn only_present_fields_are_serialized() -> Result<()> {
        let fields = HeartFields {
            name: Some("Ana".to_string()),
            city: Some("Lisbon".to_string()),
            ..HeartFields::default()
        };
        assert_eq!(
            serde_json::to_value(&fields)?,
            json!({"name": "Ana", "city": "Lisbon"})
        );
        Ok(())
    }
}
