use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use log::{info, warn};
use serde_json::{json, Value};
use tokio::sync::{Mutex, OnceCell};

use crate::core::Severity;

/// Served whenever the generator cannot produce guidance.
pub const FALLBACK_REMEDY: &str = "1. CRITICAL: Isolate the affected asset from the control network immediately.\n\
2. MANDATORY: Deploy server-side whitelisting and input sanitization.\n\
3. REQUIRED: Implement strict Use Control (FR 2) and Least Privilege.";

pub const DEFAULT_WORD_LIMIT: usize = 85;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Urgent,
    Professional,
}

impl Tone {
    pub fn for_severity(severity: Severity) -> Self {
        if severity.is_urgent() { Tone::Urgent } else { Tone::Professional }
    }

    fn label(&self) -> &'static str {
        match self {
            Tone::Urgent => "URGENT AND ALARMING",
            Tone::Professional => "PROFESSIONAL",
        }
    }
}

/// Everything a generator is told about the vulnerability type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemedyRequest {
    pub type_id: String,
    pub severity: Severity,
    pub tone: Tone,
    pub word_limit: usize,
}

impl RemedyRequest {
    pub fn new(type_id: &str, severity: Severity, word_limit: usize) -> Self {
        Self {
            type_id: type_id.to_string(),
            severity,
            tone: Tone::for_severity(severity),
            word_limit,
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "You are the lead cyber-response engineer for an industrial site. \
             A {severity} {vuln} vulnerability was confirmed on a production web interface. \
             Give a {tone} technical directive with the immediate countermeasures needed to \
             satisfy IEC 62443-3-3. Use commanding language such as 'IMMEDIATELY RESTRICT' \
             or 'MANDATORY REFACTOR'. Answer as a numbered list (1, 2, 3) in plain text: \
             no markdown, no bold, no asterisks. Stay under {limit} words.",
            severity = self.severity,
            vuln = self.type_id,
            tone = self.tone.label(),
            limit = self.word_limit,
        )
    }
}

/// External source of remediation guidance.
#[async_trait]
pub trait RemedyGenerator: Send + Sync {
    async fn generate(&self, request: &RemedyRequest) -> anyhow::Result<String>;

    /// Generator name for logs
    fn name(&self) -> &str;
}

/// Google Gemini `generateContent` client.
pub struct GeminiGenerator {
    api_key: Option<String>,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>, model: &str) -> anyhow::Result<Self> {
        Self::with_endpoint(api_key, model, GEMINI_ENDPOINT)
    }

    /// Reads the key from `GEMINI_API_KEY`.
    pub fn from_env(model: &str) -> anyhow::Result<Self> {
        let key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        Self::new(key, model)
    }

    pub fn with_endpoint(api_key: Option<String>, model: &str, endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client for Gemini API")?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl RemedyGenerator for GeminiGenerator {
    async fn generate(&self, request: &RemedyRequest) -> anyhow::Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY is not set");
        };

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt() }] }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Gemini API returned {}: {}", status, text);
        }

        let value: Value = response.json().await.context("Gemini response was not JSON")?;
        extract_candidate_text(&value).ok_or_else(|| anyhow!("Gemini response had no text candidate"))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn extract_candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() { None } else { Some(text) }
}

/// Fixed text, for offline runs and tests.
pub struct StaticGenerator {
    text: String,
}

impl StaticGenerator {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[async_trait]
impl RemedyGenerator for StaticGenerator {
    async fn generate(&self, _request: &RemedyRequest) -> anyhow::Result<String> {
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Removes rich-text markup so the text renders cleanly in tabular reports.
pub fn strip_markup(text: &str) -> String {
    text.replace("**", "")
        .replace('#', "")
        .replace('*', "-")
        .trim()
        .to_string()
}

/// Lazily resolved, memoized remediation text per vulnerability type.
///
/// The generator is called at most once per type id for the lifetime of the
/// cache, including when that call fails: the fallback is then remembered
/// for the type. Concurrent first lookups of one type share a single call.
pub struct RemediationCache {
    generator: Arc<dyn RemedyGenerator>,
    entries: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    timeout: Duration,
    pacing: Duration,
}

impl RemediationCache {
    pub fn new(generator: Arc<dyn RemedyGenerator>, timeout: Duration, pacing: Duration) -> Self {
        Self {
            generator,
            entries: Mutex::new(HashMap::new()),
            timeout,
            pacing,
        }
    }

    pub async fn get_remedy(&self, type_id: &str, severity: Severity) -> String {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(type_id.to_string()).or_default())
        };

        cell.get_or_init(|| self.resolve(type_id, severity)).await.clone()
    }

    pub async fn is_cached(&self, type_id: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.get(type_id).is_some_and(|cell| cell.initialized())
    }

    async fn resolve(&self, type_id: &str, severity: Severity) -> String {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        let request = RemedyRequest::new(type_id, severity, DEFAULT_WORD_LIMIT);
        let outcome = tokio::time::timeout(self.timeout, self.generator.generate(&request)).await;

        match outcome {
            Ok(Ok(text)) => {
                let clean = strip_markup(&text);
                if clean.is_empty() {
                    warn!("{} returned empty guidance for {}; using fallback", self.generator.name(), type_id);
                    FALLBACK_REMEDY.to_string()
                } else {
                    info!("Remediation for {} resolved via {}", type_id, self.generator.name());
                    clean
                }
            }
            Ok(Err(e)) => {
                warn!("Remediation lookup for {} failed: {:#}; using fallback", type_id, e);
                FALLBACK_REMEDY.to_string()
            }
            Err(_) => {
                warn!("Remediation lookup for {} timed out after {:?}; using fallback", type_id, self.timeout);
                FALLBACK_REMEDY.to_string()
            }
        }
    }
}
