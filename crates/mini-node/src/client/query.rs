//! HTTP query client for the node's gateway.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum QueryClientError {
    #[error("invalid node address {0}")]
    InvalidNode(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone)]
pub struct QueryClient {
    base: String,
    http: reqwest::Client,
}

impl QueryClient {
    pub fn new(node: &str) -> Result<Self, QueryClientError> {
        let base = node.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(QueryClientError::InvalidNode(node.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| QueryClientError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            base: base.to_string(),
            http,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, QueryClientError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "query");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| QueryClientError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryClientError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|source| QueryClientError::Http { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_address_without_scheme() {
        assert!(matches!(
            QueryClient::new("127.0.0.1:1317"),
            Err(QueryClientError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = QueryClient::new("http://127.0.0.1:1317/").unwrap();
        assert_eq!(client.base(), "http://127.0.0.1:1317");
    }
}
