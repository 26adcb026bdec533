// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless client for the remote cloud API. SPEC_FULL.md §4.8. Every
//! call is a single request/response round trip; no connection state is
//! kept between calls beyond the base URL and (when linked) the bearer
//! secret.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequestBody {
    pub machine_name: String,
    pub os: String,
    pub arch: String,
    pub agents_detected: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequestResponse {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LinkStatus {
    Linked {
        linked: bool,
        #[serde(rename = "machineId")]
        machine_id: String,
        #[serde(rename = "tunnelToken")]
        tunnel_token: Option<String>,
        #[serde(rename = "tunnelUrl")]
        tunnel_url: Option<String>,
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "apiSecret")]
        api_secret: Option<String>,
    },
    Pending {
        linked: bool,
    },
}

impl LinkStatus {
    pub fn is_linked(&self) -> bool {
        matches!(self, LinkStatus::Linked { linked: true, .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProjection {
    pub id: String,
    pub agent: String,
    pub project_path: String,
    pub project_name: String,
    pub status: String,
    pub last_message: Option<String>,
    pub last_activity_at: String,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub tunnel_url: Option<String>,
    pub agents_detected: Vec<String>,
    pub sessions: Vec<SessionProjection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNotification {
    pub machine_id: String,
    pub session_id: String,
    pub request_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub description: String,
    pub risk_level: String,
}

/// Thin wrapper over a [`reqwest::Client`] pointed at one base URL.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder, api_secret: Option<&str>) -> reqwest::RequestBuilder {
        let builder = builder.header("Content-Type", "application/json");
        match api_secret {
            Some(secret) => builder.bearer_auth(secret),
            None => builder,
        }
    }

    pub async fn create_link_request(
        &self,
        body: &LinkRequestBody,
    ) -> DaemonResult<LinkRequestResponse> {
        let response = self
            .authed(self.http.post(self.url("/api/machines/link-request")), None)
            .json(body)
            .send()
            .await
            .map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
        parse_2xx_json(response).await
    }

    pub async fn link_status(&self, code: &str) -> DaemonResult<LinkStatus> {
        let encoded = urlencoding_minimal(code);
        let response = self
            .authed(self.http.get(self.url(&format!("/api/machines/link-status/{encoded}"))), None)
            .send()
            .await
            .map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Err(DaemonError::LinkRequestGone);
        }
        parse_2xx_json(response).await
    }

    pub async fn heartbeat(
        &self,
        machine_id: &str,
        api_secret: Option<&str>,
        body: &HeartbeatBody,
    ) -> DaemonResult<()> {
        let response = self
            .authed(
                self.http.post(self.url(&format!("/api/machines/{machine_id}/heartbeat"))),
                api_secret,
            )
            .json(body)
            .send()
            .await
            .map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 401 {
            tracing::warn!("heartbeat rejected with 401, re-link needed");
        } else if !status.is_success() {
            tracing::warn!(status = %status, "heartbeat failed");
        }
        Ok(())
    }

    pub async fn validate_token(
        &self,
        token: &str,
        machine_id: &str,
    ) -> DaemonResult<ValidateTokenResponse> {
        let response = self
            .authed(self.http.post(self.url("/api/daemon/validate-token")), None)
            .json(&serde_json::json!({ "token": token, "machineId": machine_id }))
            .send()
            .await
            .map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
        if !response.status().is_success() {
            return Ok(ValidateTokenResponse { valid: false, user_id: None });
        }
        parse_2xx_json(response).await
    }

    pub async fn forward_approval(
        &self,
        api_secret: Option<&str>,
        body: &ApprovalNotification,
    ) -> DaemonResult<()> {
        let response = self
            .authed(self.http.post(self.url("/api/notifications/approval")), api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "approval forward failed");
        }
        Ok(())
    }
}

async fn parse_2xx_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> DaemonResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DaemonError::RemoteApi(format!("{status}: {body}")));
    }
    let value: Value =
        response.json().await.map_err(|e| DaemonError::RemoteApi(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| DaemonError::RemoteApi(e.to_string()))
}

/// Percent-encode the handful of characters a link code or its container
/// can plausibly contain, without pulling in a URL crate for one call site.
fn urlencoding_minimal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod rest_tests;
