//! HTTP client shared by the feed sources.
//!
//! Wraps reqwest with:
//! - the configured request timeout (or none)
//! - HTTP Basic credentials per request
//! - non-success statuses turned into `NugetError::HttpStatus`
//! - every request and body read raced against a cancellation token

use crate::cancel::CancellationToken;
use crate::config::{ClientOptions, NetworkConfig};
use crate::credentials::Credentials;
use crate::error::{NugetError, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::debug;

/// HTTP client for feed requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client from the default options.
    pub fn new() -> Result<Self> {
        Self::with_options(&ClientOptions::default())
    }

    /// Create a client honouring `options`. A timeout of `-1` disables the
    /// per-request timeout.
    pub fn with_options(options: &ClientOptions) -> Result<Self> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| NetworkConfig::USER_AGENT.to_string());

        let mut builder = Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(user_agent);
        if let Some(timeout) = options.request_timeout()? {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| NugetError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })?;
        Ok(Self { client })
    }

    /// GET `url`, failing on any non-success status.
    pub async fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        cancel.check()?;
        let mut request = self.client.get(url);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        debug!("GET {}", url);
        let response = race(cancel, request.send())
            .await?
            .map_err(|e| NugetError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!("GET {} returned {}", url, status);
            return Err(NugetError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET `url` and return the body as text.
    pub async fn get_text(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let response = self.get(url, credentials, cancel).await?;
        race(cancel, response.text())
            .await?
            .map_err(|e| NugetError::from_reqwest(url, e))
    }

    /// GET `url` and deserialize a JSON body. A body that does not match `T`
    /// is a malformed response naming `url`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let text = self.get_text(url, credentials, cancel).await?;
        serde_json::from_str(&text).map_err(|e| NugetError::malformed(url, e.to_string()))
    }
}

/// Resolve `future` unless `cancel` fires first.
pub(crate) async fn race<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        output = future => Ok(output),
        _ = cancel.cancelled() => Err(NugetError::Cancelled),
    }
}
