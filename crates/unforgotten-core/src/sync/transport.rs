//! Remote note transport boundary.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::models::{Note, RemoteNote};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

/// External session collaborator.
///
/// The transport consults the current access token per request and never
/// manages or refreshes the session itself.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed-token session, for CLI and test use.
pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: normalize_text_option(token),
        }
    }
}

impl SessionProvider for StaticSession {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Per-operation backend calls. No retries live here; retry policy belongs
/// to the scheduler.
#[async_trait]
pub trait NoteTransport: Send + Sync {
    /// Upsert by `remote_id` when present, insert otherwise. Returns the
    /// server-side record including the assigned id.
    async fn push(&self, note: &Note) -> Result<RemoteNote>;

    /// Idempotent delete: an unknown or already-deleted id is not an error.
    async fn delete_remote(&self, remote_id: &str) -> Result<()>;

    /// All records for the account with `updated_at > since`, including
    /// soft-deleted ones so the merge engine can propagate deletions.
    async fn fetch_changes_since(&self, since: i64, account_id: &str) -> Result<Vec<RemoteNote>>;
}

/// HTTP implementation of [`NoteTransport`].
pub struct HttpNoteTransport {
    endpoint: String,
    client: reqwest::Client,
    session: Arc<dyn SessionProvider>,
}

impl HttpNoteTransport {
    pub fn new(endpoint: impl Into<String>, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Network(error.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            session,
        })
    }

    fn bearer(&self) -> Result<String> {
        self.session
            .access_token()
            .ok_or_else(|| Error::Auth("no active session".to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(Error::Auth(message))
        } else {
            Err(Error::Network(message))
        }
    }
}

#[async_trait]
impl NoteTransport for HttpNoteTransport {
    async fn push(&self, note: &Note) -> Result<RemoteNote> {
        let body = serde_json::json!({
            "id": note.remote_id,
            "account_id": note.account_id,
            "title": note.title,
            "content": note.content(),
            "theme": note.theme,
            "is_pinned": note.is_pinned,
            "updated_at": note.updated_at,
        });

        let response = self
            .client
            .post(format!("{}/v1/notes", self.endpoint))
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json::<RemoteNote>()
            .await
            .map_err(|error| Error::Network(format!("invalid push response: {error}")))
    }

    async fn delete_remote(&self, remote_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/v1/notes/{remote_id}", self.endpoint))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;

        if is_delete_success(response.status()) {
            return Ok(());
        }

        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_changes_since(&self, since: i64, account_id: &str) -> Result<Vec<RemoteNote>> {
        let response = self
            .client
            .get(format!("{}/v1/notes/changes", self.endpoint))
            .query(&[
                ("since", since.to_string()),
                ("account_id", account_id.to_string()),
            ])
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|error| Error::Network(error.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json::<Vec<RemoteNote>>()
            .await
            .map_err(|error| Error::Network(format!("invalid changes response: {error}")))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

/// Deleting an already-deleted or unknown id is success.
fn is_delete_success(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("endpoint must not be empty".to_string()))?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_endpoint_strips_trailing_slash() {
        assert_eq!(
            normalize_endpoint(" https://api.example.com/ ".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let body = r#"{"message": "token expired", "error": "unauthorized"}"#;
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, body),
            "token expired (401)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body_then_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn delete_treats_not_found_as_success() {
        assert!(is_delete_success(StatusCode::OK));
        assert!(is_delete_success(StatusCode::NO_CONTENT));
        assert!(is_delete_success(StatusCode::NOT_FOUND));
        assert!(!is_delete_success(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_delete_success(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn static_session_normalizes_token() {
        assert_eq!(StaticSession::new(None).access_token(), None);
        assert_eq!(
            StaticSession::new(Some("  ".to_string())).access_token(),
            None
        );
        assert_eq!(
            StaticSession::new(Some(" abc ".to_string())).access_token(),
            Some("abc".to_string())
        );
    }
}
