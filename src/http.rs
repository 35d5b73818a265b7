//! Authenticated JSON requests against the Barndoor API

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::error::{BarndoorError, Result};
use crate::utils::truncate_body;

/// Bearer-authenticated HTTP client bound to one API base URL
#[derive(Clone)]
pub(crate) struct ApiHttp {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl std::fmt::Debug for ApiHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiHttp")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ApiHttp {
    pub(crate) fn new(
        base: &str,
        token: String,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| BarndoorError::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, &[], None).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<T> {
        self.request(Method::POST, path, query, Some(body)).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%method, %url, "Barndoor API request");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BarndoorError::connection(&url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BarndoorError::connection(&url, e))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), %url, "Barndoor API error response");
            return Err(BarndoorError::http(status.as_u16(), &url, truncate_body(&text)));
        }

        serde_json::from_str(&text).map_err(|e| BarndoorError::decode(&url, e.to_string()))
    }
}
