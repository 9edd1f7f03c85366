//! reqwest implementation of the admin API client

use super::{GatewayApi, GatewayResponse};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

/// HTTP client for the gateway's admin API
///
/// No retries happen here; a failed call surfaces immediately.
#[derive(Clone)]
pub struct AdminClient {
    base_url: String,
    http: reqwest::Client,
    max_log_body_size: usize,
}

impl AdminClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Url::parse(&config.admin_url).map_err(|e| {
            Error::Validation(format!("invalid admin URL {}: {}", config.admin_url, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.admin_url.trim_end_matches('/').to_string(),
            http,
            max_log_body_size: config.max_log_body_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GatewayApi for AdminClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Gateway API request: {} {}", method, url);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            let data = serde_json::to_vec(body).map_err(|e| {
                error!("Failed to serialize request body for {} {}: {}", method, url, e);
                Error::Transport(format!("serialize request body: {}", e))
            })?;
            debug!("Request body: {}", body_preview(&data, self.max_log_body_size));
            request = request.header(CONTENT_TYPE, "application/json").body(data);
        }

        let response = request.send().await.map_err(|e| {
            error!("HTTP request failed for {} {}: {}", method, url, e);
            Error::Transport(format!("{} {}: {}", method, url, e))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            error!("Failed to read response body from {} {}: {}", method, url, e);
            Error::Transport(format!("read response from {}: {}", url, e))
        })?;

        debug!("Gateway API response: {}", status);
        if !body.is_empty() {
            debug!("Response body: {}", body_preview(&body, self.max_log_body_size));
        }

        if status.as_u16() >= 400 {
            let text = String::from_utf8_lossy(&body).into_owned();
            error!("Gateway API error {} for {} {}: {}", status.as_u16(), method, url, text);
            return Err(Error::Gateway {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(GatewayResponse { body, headers })
    }
}

/// Bounded, char-safe preview of a body for logging; `max == 0` disables the bound
pub(crate) fn body_preview(data: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(data);
    if max == 0 || text.chars().count() <= max {
        return text.into_owned();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_preview_truncates() {
        assert_eq!(body_preview(b"abcdef", 3), "abc...");
        assert_eq!(body_preview(b"abc", 3), "abc");
        assert_eq!(body_preview(b"abcdef", 0), "abcdef");
        assert_eq!(body_preview(b"", 10), "");
    }

    #[test]
    fn test_body_preview_is_char_safe() {
        let text = "héllo wörld";
        assert_eq!(body_preview(text.as_bytes(), 2), "hé...");
    }

    #[test]
    fn test_rejects_bad_admin_url() {
        let config = GatewayConfig {
            admin_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(AdminClient::new(&config), Err(Error::Validation(_))));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = GatewayConfig {
            admin_url: "http://localhost:2019/".into(),
            ..Default::default()
        };
        let client = AdminClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:2019");
    }
}
