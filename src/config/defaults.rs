//! Default values for configuration

use std::path::PathBuf;

/// Default base directory (~/.ragsync)
pub fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragsync")
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default object store endpoint (S3-compatible)
pub fn default_object_store_endpoint() -> String {
    std::env::var("RAGSYNC_OBJECT_STORE_ENDPOINT")
        .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string())
}

/// Default object store bucket
pub fn default_object_store_bucket() -> String {
    "ragsync-uploads".to_string()
}

/// Default object store region
pub fn default_object_store_region() -> String {
    "us-east-1".to_string()
}

/// Default environment variable holding the object store access key
pub fn default_access_key_env() -> String {
    "RAGSYNC_OBJECT_STORE_ACCESS_KEY".to_string()
}

/// Default environment variable holding the object store secret key
pub fn default_secret_key_env() -> String {
    "RAGSYNC_OBJECT_STORE_SECRET_KEY".to_string()
}

/// Default TTL for signed download URLs, in seconds
pub fn default_signed_url_ttl_secs() -> u64 {
    3600
}

/// Default OCR service URL
pub fn default_parser_url() -> String {
    std::env::var("RAGSYNC_PARSER_URL").unwrap_or_else(|_| "https://api.mistral.ai/v1/ocr".to_string())
}

/// Default OCR model
pub fn default_parser_model() -> String {
    "mistral-ocr-latest".to_string()
}

/// Default environment variable holding the OCR API key
pub fn default_parser_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

/// Default OCR request timeout, in seconds
pub fn default_parser_timeout_secs() -> u64 {
    120
}

/// Default client-side cap on OCR requests per second
pub fn default_parser_requests_per_sec() -> u32 {
    2
}

/// Default embedding API base URL
pub fn default_embedding_api_base() -> String {
    std::env::var("RAGSYNC_EMBEDDING_API_BASE")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

/// Default environment variable holding the embedding API key
pub fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding request timeout, in seconds
pub fn default_embedding_timeout_secs() -> u64 {
    60
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    1500
}

/// Default minimum characters per chunk
pub fn default_chunk_min_chars() -> usize {
    100
}

/// Default: prefer heading boundaries
pub fn default_prefer_heading_boundaries() -> bool {
    true
}

/// Default scan interval, in seconds
pub fn default_scan_interval_secs() -> u64 {
    10
}

/// Default upper bound on entities enqueued per scan tick
pub fn default_scan_batch_limit() -> usize {
    10
}

/// Default runner poll interval, in seconds
pub fn default_runner_poll_secs() -> u64 {
    1
}

/// Default schedule-to-close timeout for one workflow step, in seconds
pub fn default_step_timeout_secs() -> u64 {
    180
}

/// Default first retry delay for external steps (parse, embed, index)
pub fn default_external_initial_secs() -> u64 {
    5
}

/// Default retry delay ceiling for external steps
pub fn default_external_max_secs() -> u64 {
    60
}

/// Default attempt budget for external steps
pub fn default_external_max_attempts() -> u32 {
    5
}

/// Default first retry delay for status-write steps
pub fn default_status_initial_secs() -> u64 {
    1
}

/// Default retry delay ceiling for status-write steps
pub fn default_status_max_secs() -> u64 {
    5
}

/// Default attempt budget for status-write steps
pub fn default_status_max_attempts() -> u32 {
    3
}
