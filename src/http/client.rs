//! Blocking HTTP client shared by the chart fetchers and enrichment sources.
//!
//! Maps transport failures, non-success statuses and undecodable bodies into
//! one [`HttpError`] taxonomy so callers can decide what is worth retrying.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur when calling an external service.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Service answered but the payload is unusable
    #[error("API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl HttpError {
    /// Whether retrying the same request could succeed.
    ///
    /// Network failures, timeouts, 5xx and 429 are transient; other 4xx,
    /// decoding and API errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network(_) | HttpError::Timeout(_) => true,
            HttpError::Http { status } => *status == 429 || (500..600).contains(status),
            HttpError::Serialization(_) | HttpError::Api { .. } | HttpError::InvalidUrl(_) => {
                false
            }
        }
    }

    /// The service definitively has no such resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::Http { status: 404 })
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            HttpError::Timeout(error)
        } else if let Some(status) = error.status() {
            HttpError::Http {
                status: status.as_u16(),
            }
        } else {
            HttpError::Network(error)
        }
    }
}

/// Thin wrapper around `reqwest::blocking::Client` with our timeouts and
/// user agent.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client sending `user_agent` on every request.
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(HttpError::Network)?;
        Ok(Self { client })
    }

    /// Starts a GET request after validating the URL.
    pub fn get(&self, url: &str) -> Result<RequestBuilder, HttpError> {
        Ok(self.client.get(parse_url(url)?))
    }

    /// Starts a POST request after validating the URL.
    pub fn post(&self, url: &str) -> Result<RequestBuilder, HttpError> {
        Ok(self.client.post(parse_url(url)?))
    }

    /// Sends the request and decodes a JSON body into `T`.
    pub fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HttpError> {
        let body = self.send_text(request)?;
        serde_json::from_str(&body).map_err(HttpError::Serialization)
    }

    /// Sends the request and returns the body as text.
    pub fn send_text(&self, request: RequestBuilder) -> Result<String, HttpError> {
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.text()?)
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url, HttpError> {
    reqwest::Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))
}
