//! Hosted OCR parsing
//!
//! Documents never flow through this process as raw bytes: the workflow
//! hands the OCR service a signed download URL and gets normalized
//! markdown back, one entry per page.

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Trait for document parsing backends
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the document behind a (signed) URL into markdown
    async fn parse(&self, document_url: &str) -> Result<String>;
}

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the hosted OCR service
pub struct OcrClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    limiter: DirectRateLimiter,
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument<'a>,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
struct OcrDocument<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    document_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    markdown: String,
}

impl OcrClient {
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let rps = NonZeroU32::new(config.requests_per_sec).unwrap_or(nonzero!(1u32));
        let limiter = RateLimiter::direct(Quota::per_second(rps));

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            limiter,
        })
    }
}

#[async_trait]
impl DocumentParser for OcrClient {
    async fn parse(&self, document_url: &str) -> Result<String> {
        self.limiter.until_ready().await;

        debug!("Sending document to OCR model {}", self.model);

        let mut request = self.client.post(&self.url).json(&OcrRequest {
            model: &self.model,
            document: OcrDocument {
                kind: "document_url",
                document_url,
            },
            include_image_base64: false,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("OCR service throttled request".to_string()));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Config(format!(
                "OCR service rejected credentials ({})",
                status
            )));
        }
        if status.is_client_error() {
            // The service inspected the document and refused it; retrying
            // the same bytes cannot change the answer.
            let body = response.text().await.unwrap_or_default();
            return Err(Error::MalformedDocument(format!(
                "OCR service rejected document ({}): {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Parse(format!(
                "OCR service returned {}: {}",
                status, body
            )));
        }

        let payload: OcrResponse = response.json().await?;
        let markdown = payload
            .pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!("OCR returned {} pages", payload.pages.len());
        Ok(markdown)
    }
}
