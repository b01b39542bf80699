//! Object storage for uploaded document files
//!
//! The sync workflow never downloads document bytes itself: it asks this
//! adapter for a time-limited signed URL and passes that URL to the OCR
//! service. Uploads go through the same adapter so route handlers and the
//! worker share one signing path.

use crate::config::ObjectStoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a document under the given key
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Produce a time-limited signed download URL for a stored document
    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// S3-compatible object store using SigV4 query presigning
pub struct S3Store {
    client: Client,
    endpoint: Url,
    bucket: String,
    region: String,
    credentials: Option<(String, String)>,
}

impl S3Store {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;

        // Credentials are resolved here but only required when signing, so
        // read-only commands work on a machine without them.
        let credentials = match (
            std::env::var(&config.access_key_env),
            std::env::var(&config.secret_key_env),
        ) {
            (Ok(access_key), Ok(secret_key)) => Some((access_key, secret_key)),
            _ => None,
        };

        Ok(Self {
            client: Client::new(),
            endpoint,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            credentials,
        })
    }

    fn host(&self) -> Result<String> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| Error::ObjectStore(format!("Endpoint {} has no host", self.endpoint)))?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// Build a SigV4 query-presigned URL for the given method and key
    fn presign(&self, method: &str, key: &str, ttl: Duration) -> Result<String> {
        let (access_key, secret_key) = self.credentials.as_ref().ok_or_else(|| {
            Error::Config("Object store credentials are not configured".to_string())
        })?;

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", datestamp, self.region);
        let host = self.host()?;

        let canonical_uri = format!("/{}/{}", self.bucket, uri_encode(key, false));
        let query = [
            ("X-Amz-Algorithm", "AWS4-HMAC-SHA256".to_string()),
            ("X-Amz-Credential", format!("{}/{}", access_key, scope)),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", ttl.as_secs().to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ];
        let canonical_query = query
            .iter()
            .map(|(k, v)| format!("{}={}", k, uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            method, canonical_uri, canonical_query, host
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let date_key = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), &datestamp);
        let region_key = hmac_sha256(&date_key, &self.region);
        let service_key = hmac_sha256(&region_key, "s3");
        let signing_key = hmac_sha256(&service_key, "aws4_request");
        let signature = hex::encode(hmac_sha256(&signing_key, &string_to_sign));

        Ok(format!(
            "{}://{}{}?{}&X-Amz-Signature={}",
            self.endpoint.scheme(),
            host,
            canonical_uri,
            canonical_query,
            signature
        ))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.presign("PUT", key, Duration::from_secs(300))?;

        debug!("Uploading {} bytes to {}", bytes.len(), key);

        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ObjectStore(format!(
                "Upload of '{}' failed with {}: {}",
                key, status, body
            )));
        }
        Ok(())
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.presign("GET", key, ttl)
    }
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 percent-encoding as SigV4 wants it
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
