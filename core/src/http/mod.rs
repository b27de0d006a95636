pub mod client;

pub use client::HttpClient;

use reqwest::header::SERVER;
use reqwest::Response;

/// What the engine keeps from a probe response.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub server: Option<String>,
    pub body: String,
    pub timing_ms: u128,
}

/// Extracts server name from response headers
pub(crate) fn extract_server(response: &Response) -> Option<String> {
    response.headers()
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
