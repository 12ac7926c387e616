//! HTTP client for the external tax enrichment provider.
//!
//! Calls `POST {TAX_API_URL}/v1/tax/enrich` with an
//! [`EnrichmentRequest`] and expects an [`EnrichmentResponse`]. Transport
//! failures are retried with exponential backoff; the engine's deadline
//! bounds the total time spent, after which the calculation falls back to
//! internal rates.

use std::time::Duration;

use vtax_engine::{EnrichmentError, EnrichmentRequest, EnrichmentResponse, TaxEnrichment};

use crate::config::EnrichmentConfig;

const ENRICH_PATH: &str = "v1/tax/enrich";

/// Maximum number of retry attempts after the initial request.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ClientInitError {
    #[error("TAX_API_TOKEN is not a valid header value")]
    InvalidToken,
    #[error("invalid enrichment URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Send a request, retrying transport errors with exponential backoff.
///
/// The caller inspects the response status; only [`reqwest::Error`]s are
/// retried.
async fn retry_send<F, Fut>(f: F) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..MAX_RETRIES {
        match f().await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "tax enrichment request failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    f().await
}

/// [`TaxEnrichment`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEnrichment {
    http: reqwest::Client,
    endpoint: url::Url,
}

impl HttpEnrichment {
    pub fn new(config: &EnrichmentConfig) -> Result<Self, ClientInitError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ClientInitError::InvalidToken)?,
            );
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http,
            endpoint: base.join(ENRICH_PATH)?,
        })
    }
}

impl TaxEnrichment for HttpEnrichment {
    fn provider(&self) -> &str {
        "tax-api"
    }

    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse, EnrichmentError> {
        let resp = retry_send(|| self.http.post(self.endpoint.clone()).json(request).send())
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(EnrichmentError::Rejected { status, body });
        }

        resp.json()
            .await
            .map_err(|e| EnrichmentError::Malformed(e.to_string()))
    }
}
