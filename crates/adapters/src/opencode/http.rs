// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client for OpenCode's local server, used when service discovery
//! (§4.6, in the daemon crate) has located one. Every request carries
//! `x-opencode-directory` set to the session's project directory.

use crate::contract::AdapterError;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub url: String,
    pub version: Option<String>,
}

#[derive(Clone)]
pub struct OpenCodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenCodeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    async fn check(resp: reqwest::Response) -> Result<Value, AdapterError> {
        let status = resp.status();
        if status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
        } else {
            let status_code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(AdapterError::ApiError { status: status_code, body })
        }
    }

    pub async fn create_session(&self, directory: &str) -> Result<String, AdapterError> {
        let resp = self
            .http
            .post(format!("{}/session/", self.base_url))
            .header("x-opencode-directory", directory)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| AdapterError::Other(e.to_string()))?;
        let body = Self::check(resp).await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AdapterError::Other("OpenCode did not return a session id".into()))
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        directory: &str,
        text: &str,
    ) -> Result<(), AdapterError> {
        let resp = self
            .http
            .post(format!("{}/session/{}/message", self.base_url, session_id))
            .header("x-opencode-directory", directory)
            .header("Content-Type", "application/json")
            .json(&json!({ "parts": [{ "type": "text", "text": text }] }))
            .send()
            .await
            .map_err(|e| AdapterError::Other(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn abort(&self, session_id: &str, directory: &str) -> Result<(), AdapterError> {
        let resp = self
            .http
            .post(format!("{}/session/{}/abort", self.base_url, session_id))
            .header("x-opencode-directory", directory)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| AdapterError::Other(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn reply_permission(
        &self,
        request_id: &str,
        directory: &str,
        reply: &str,
        message: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut body = json!({ "reply": reply });
        if let Some(message) = message {
            body["message"] = json!(message);
        }
        let resp = self
            .http
            .post(format!("{}/permission/{}/reply", self.base_url, request_id))
            .header("x-opencode-directory", directory)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Other(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }
}
