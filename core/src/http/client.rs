use std::time::{Duration, Instant};

use rand::prelude::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy};
use url::Url;

use super::{extract_server, ProbeResponse};

/// GET-with-timeout transport used for probes and fingerprinting.
pub struct HttpClient {
    inner: Client,
    user_agents: Vec<&'static str>,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl HttpClient {
    pub fn new(
        timeout_seconds: u64,
        proxy_url: Option<&str>,
        custom_headers: &[(String, String)],
    ) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(timeout_seconds);

        // Targets are frequently lab hosts with self-signed certificates.
        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        let inner = builder.build()?;

        let mut default_headers = HeaderMap::new();
        for (key, val) in custom_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(val),
            ) {
                default_headers.insert(name, value);
            }
        }

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) \
             Gecko/20100101 Firefox/120.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
        ];

        Ok(Self {
            inner,
            user_agents,
            timeout,
            default_headers,
        })
    }

    /// Issues one GET and reads the whole body. Any transport failure,
    /// including a body that cannot be read before the timeout, is an error.
    pub async fn get(&self, url: &Url) -> Result<ProbeResponse, reqwest::Error> {
        let mut req = self.inner
            .get(url.as_str())
            .timeout(self.timeout);

        for (name, value) in self.default_headers.iter() {
            req = req.header(name, value);
        }

        if !self.default_headers.contains_key(USER_AGENT) {
            req = req.header(USER_AGENT, self.random_user_agent());
        }

        let start = Instant::now();
        let response = req.send().await?;
        let status_code = response.status().as_u16();
        let server = extract_server(&response);
        let body = response.text().await?;

        Ok(ProbeResponse {
            status_code,
            server,
            body,
            timing_ms: start.elapsed().as_millis(),
        })
    }

    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::rng();
        *self.user_agents.choose(&mut rng).unwrap_or(&"Mozilla/5.0")
    }
}
