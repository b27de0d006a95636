pub mod core;
pub mod error;
pub mod http;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use crate::core::catalog::{CatalogEntry, SignatureCatalog, VulnerabilityModule};
pub use crate::core::engine::InjectionEngine;
pub use crate::core::mutator::ParamTarget;
pub use crate::core::remediation::{
    GeminiGenerator, RemediationCache, RemedyGenerator, RemedyRequest, StaticGenerator, FALLBACK_REMEDY,
};
pub use crate::core::report::{write_rows, ReportRow, REPORT_COLUMNS};
pub use crate::core::scanner::{ScanStatus, ScanSummary, Scanner};
pub use crate::core::sink::FindingSink;
pub use crate::core::{Detection, Finding, Severity, SeverityProfile};
pub use crate::error::{ErrorKind, ScanError};
pub use crate::http::HttpClient;
pub use crate::utils::read_lines;

/// Shared scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub threads: usize,
    pub timeout: u64,
    pub output: String,
    pub json_output: String,
    pub proxy: String,
    pub headers: String,
    pub catalog: String,
    pub ai_remedies: bool,
    pub gemini_model: String,
    pub remedy_timeout: u64,
    pub remedy_pacing_ms: u64,
    pub fingerprint: bool,
    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            timeout: 7,
            output: "reports/security_audit_report.csv".to_string(),
            json_output: String::new(),
            proxy: String::new(),
            headers: String::new(),
            catalog: String::new(),
            ai_remedies: true,
            gemini_model: "gemini-2.5-flash".to_string(),
            remedy_timeout: 20,
            remedy_pacing_ms: 1500,
            fingerprint: true,
            verbose: false,
        }
    }
}

impl ScanConfig {
    /// One `Name: value` entry per line; values may contain `;` (cookies).
    pub fn header_list(&self) -> Vec<String> {
        if self.headers.is_empty() {
            Vec::new()
        } else {
            self.headers
                .lines()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
    }

    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        parse_custom_headers(&self.header_list())
    }

    pub fn proxy_ref(&self) -> Option<&str> {
        non_empty(&self.proxy)
    }

    pub fn output_ref(&self) -> Option<&str> {
        non_empty(&self.output)
    }

    pub fn json_output_ref(&self) -> Option<&str> {
        non_empty(&self.json_output)
    }

    pub fn catalog_ref(&self) -> Option<&str> {
        non_empty(&self.catalog)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

pub fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter().filter_map(|h| {
        let mut parts = h.splitn(2, ':');
        let key = parts.next()?.trim().to_string();
        let val = parts.next().unwrap_or("").trim().to_string();
        if key.is_empty() { return None; }
        Some((key, val))
    }).collect()
}

/// Output abstraction for the scan pipeline.
pub trait ScanEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_finding(&self, finding: &Finding);
    fn on_progress(&self, phase: &str, current: usize, total: usize);
}

pub type SinkRef = Arc<dyn ScanEventSink>;

/// Terminal output sink for CLI usage.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error"   => message.red().to_string(),
            "warn"    => message.yellow().to_string(),
            "phase"   => message.bright_cyan().bold().to_string(),
            _         => message.to_string(),
        };
        println!("{}", colored);
    }

    fn on_finding(&self, finding: &Finding) {
        use colored::*;
        println!(
            "\n{} {} found! Parameter: {}",
            "[*]".red().bold(),
            finding.type_id.red().bold(),
            finding.parameter_name.white()
        );
        println!("    Severity: {} (CVSS {})", finding.severity_profile.severity.to_string().magenta(), finding.severity_profile.cvss_range);
        println!("    PoC:      {}", finding.proof_url.white());
        println!("    Payload:  {}", finding.payload.bright_yellow());
        println!("    curl:     {}", finding.to_curl().dimmed());
        println!("{}", "──────────────────────────────────────────".dimmed());
    }

    fn on_progress(&self, phase: &str, current: usize, total: usize) {
        use colored::*;
        if total > 0 {
            println!("{}", format!("\n[!] {} ({}/{})", phase, current, total).bold());
        } else {
            println!("{}", format!("\n[!] {}", phase).bold());
        }
    }
}

/// Discards all events. For library callers that only want the summary.
pub struct SilentSink;

impl SilentSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for SilentSink {
    fn on_log(&self, _level: &str, _message: &str) {}
    fn on_finding(&self, _finding: &Finding) {}
    fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}
}
