//! HTTP client for the control API.
//!
//! Used by `session-board-ctl` (wrapper, list and kill commands) and by
//! the integration tests.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::models::session::{NewSession, Session, SessionStatus, StatusPatch};
use crate::store::StoreStats;
use crate::{AppError, Result};

/// Default control API location.
pub const DEFAULT_URL: &str = "http://localhost:8080";

/// Request timeout used by wrappers so telemetry never stalls real work.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Thin typed wrapper over `reqwest` for the control API routes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    /// Build a client for `base_url` with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `POST /task`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures or unexpected status.
    pub async fn register(&self, registration: &NewSession) -> Result<Session> {
        let response = self
            .http
            .post(self.url("/task"))
            .json(registration)
            .send()
            .await;
        decode(response).await
    }

    /// `PATCH /task/{id}`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, `AppError::Http`
    /// otherwise.
    pub async fn patch(&self, id: &str, patch: &StatusPatch) -> Result<Session> {
        let response = self
            .http
            .patch(self.url(&format!("/task/{id}")))
            .json(patch)
            .send()
            .await;
        decode(response).await
    }

    /// Shorthand for a status-only patch.
    ///
    /// # Errors
    ///
    /// See [`patch`](Self::patch).
    pub async fn set_status(
        &self,
        id: &str,
        status: SessionStatus,
        exit_code: Option<i32>,
    ) -> Result<Session> {
        self.patch(
            id,
            &StatusPatch {
                status: Some(status),
                exit_code,
            },
        )
        .await
    }

    /// `GET /task/{id}`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, `AppError::Http`
    /// otherwise.
    pub async fn get(&self, id: &str) -> Result<Session> {
        let response = self.http.get(self.url(&format!("/task/{id}"))).send().await;
        decode(response).await
    }

    /// `GET /tasks`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures or unexpected status.
    pub async fn list(&self) -> Result<Vec<Session>> {
        let response = self.http.get(self.url("/tasks")).send().await;
        decode(response).await
    }

    /// `POST /task/{id}/kill`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, `AppError::Http`
    /// otherwise.
    pub async fn kill(&self, id: &str) -> Result<Session> {
        let response = self
            .http
            .post(self.url(&format!("/task/{id}/kill")))
            .send()
            .await;
        decode(response).await
    }

    /// `GET /stats`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` on transport failures or unexpected status.
    pub async fn stats(&self) -> Result<StoreStats> {
        let response = self.http.get(self.url("/stats")).send().await;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(
    response: std::result::Result<reqwest::Response, reqwest::Error>,
) -> Result<T> {
    let response = response.map_err(|err| AppError::Http(format!("request failed: {err}")))?;
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| AppError::Http(format!("invalid response body: {err}")));
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|v| v.as_str()).map(str::to_owned))
        .unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::BAD_REQUEST => AppError::BadRequest(message),
        _ => AppError::Http(message),
    })
}
