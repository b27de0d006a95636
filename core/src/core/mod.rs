pub mod catalog;
pub mod engine;
pub mod mutator;
pub mod remediation;
pub mod report;
pub mod scanner;
pub mod sink;

use serde::{Deserialize, Serialize};

/// Severity label attached to a vulnerability type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// HIGH and CRITICAL findings get the urgent remediation tone.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Static metadata for a vulnerability type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityProfile {
    pub cvss_range: String,
    pub severity: Severity,
    pub description: String,
}

impl Default for SeverityProfile {
    fn default() -> Self {
        Self {
            cvss_range: "N/A".to_string(),
            severity: Severity::Info,
            description: "N/A".to_string(),
        }
    }
}

/// A raw positive probe, before severity and remediation are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub type_id: String,
    pub parameter_name: String,
    pub payload: String,
    pub proof_url: String,
    pub status_code: u16,
    pub server: Option<String>,
    pub timing_ms: u128,
}

/// A fully resolved finding, as reported to callers and written to the findings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "vuln_type")]
    pub type_id: String,
    #[serde(rename = "parameter")]
    pub parameter_name: String,
    pub payload: String,
    #[serde(rename = "poc_url")]
    pub proof_url: String,
    #[serde(flatten)]
    pub severity_profile: SeverityProfile,
    #[serde(rename = "remedy")]
    pub remedy_text: String,
}

impl Finding {
    pub fn from_detection(detection: Detection, profile: SeverityProfile, remedy_text: String) -> Self {
        Self {
            type_id: detection.type_id,
            parameter_name: detection.parameter_name,
            payload: detection.payload,
            proof_url: detection.proof_url,
            severity_profile: profile,
            remedy_text,
        }
    }

    /// Builds a curl command that reproduces this finding.
    pub fn to_curl(&self) -> String {
        format!("curl -X GET '{}' --insecure", self.proof_url)
    }
}
