use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::FutureExt;
use log::{info, warn};
use serde::Serialize;

use crate::core::catalog::SignatureCatalog;
use crate::core::engine::InjectionEngine;
use crate::core::mutator::ParamTarget;
use crate::core::remediation::{
    GeminiGenerator, RemediationCache, RemedyGenerator, StaticGenerator, FALLBACK_REMEDY,
};
use crate::core::sink::FindingSink;
use crate::core::{Detection, Finding};
use crate::error::{ErrorKind, ScanError};
use crate::http::HttpClient;
use crate::{ScanConfig, SinkRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Success,
    Error,
}

/// Outcome of one scan run. Zero findings is a successful outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub status: ScanStatus,
    pub target: String,
    pub finding_count: usize,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

impl ScanSummary {
    fn completed(target: &str, findings: Vec<Finding>, report_path: Option<PathBuf>) -> Self {
        let message = if findings.is_empty() {
            Some("No vulnerabilities detected.".to_string())
        } else {
            None
        };
        Self {
            status: ScanStatus::Success,
            target: target.to_string(),
            finding_count: findings.len(),
            findings,
            message,
            error_kind: None,
            report_path: report_path.map(|p| p.display().to_string()),
        }
    }

    fn failed(target: &str, err: ScanError) -> Self {
        Self {
            status: ScanStatus::Error,
            target: target.to_string(),
            finding_count: 0,
            findings: Vec::new(),
            message: Some(err.to_string()),
            error_kind: Some(err.kind()),
            report_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }

    /// Status an HTTP-facing wrapper should answer with.
    pub fn http_status(&self) -> u16 {
        match self.error_kind {
            None => 200,
            Some(kind) => kind.http_status(),
        }
    }
}

/// Runs every catalog module against one target and resolves the findings.
pub struct Scanner {
    catalog: Arc<SignatureCatalog>,
    client: Arc<HttpClient>,
    engine: InjectionEngine,
    remedies: Arc<RemediationCache>,
    events: SinkRef,
    table_path: Option<PathBuf>,
    fingerprint: bool,
}

impl Scanner {
    pub fn new(
        catalog: Arc<SignatureCatalog>,
        client: Arc<HttpClient>,
        remedies: Arc<RemediationCache>,
        events: SinkRef,
    ) -> Self {
        Self {
            catalog,
            engine: InjectionEngine::new(Arc::clone(&client), 1),
            client,
            remedies,
            events,
            table_path: None,
            fingerprint: false,
        }
    }

    /// Builds the full stack (catalog, transport, remediation) from a config.
    pub fn from_config(config: &ScanConfig, events: SinkRef) -> anyhow::Result<Self> {
        let catalog = match config.catalog_ref() {
            Some(path) => SignatureCatalog::load_from_file(path)?,
            None => SignatureCatalog::builtin(),
        };

        let client = HttpClient::new(config.timeout, config.proxy_ref(), &config.parsed_headers())
            .context("failed to build HTTP client")?;

        // Static remedies never leave the process, so they are not paced.
        let generator: Arc<dyn RemedyGenerator> = if config.ai_remedies {
            Arc::new(GeminiGenerator::from_env(&config.gemini_model)?)
        } else {
            Arc::new(StaticGenerator::new(FALLBACK_REMEDY))
        };
        let pacing = if config.ai_remedies {
            Duration::from_millis(config.remedy_pacing_ms)
        } else {
            Duration::ZERO
        };

        let remedies = RemediationCache::new(generator, Duration::from_secs(config.remedy_timeout), pacing);

        let mut scanner = Self::new(Arc::new(catalog), Arc::new(client), Arc::new(remedies), events)
            .with_concurrency(config.threads)
            .with_fingerprint(config.fingerprint);
        if let Some(path) = config.output_ref() {
            scanner = scanner.with_table(path);
        }
        Ok(scanner)
    }

    /// Parameters probed in parallel within one module.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.engine = InjectionEngine::new(Arc::clone(&self.client), limit);
        self
    }

    /// Mirrors findings into a CSV table that is reset at the start of every run.
    pub fn with_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.table_path = Some(path.into());
        self
    }

    pub fn with_fingerprint(mut self, enabled: bool) -> Self {
        self.fingerprint = enabled;
        self
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// Scans one target. Never panics and never returns a raw error: every
    /// failure is folded into an `error` summary.
    pub async fn scan(&self, target_url: &str) -> ScanSummary {
        let target_url = target_url.trim();

        let target = match ParamTarget::parse(target_url) {
            Ok(target) => target,
            Err(e) => {
                // A rejected run still starts a new session: no stale rows survive it.
                if let Err(reset) = self.open_sink() {
                    warn!("Could not reset findings table: {}", reset);
                }
                self.events.on_log("error", &format!("[!] {}", e));
                return ScanSummary::failed(target_url, e);
            }
        };

        match AssertUnwindSafe(self.run(&target)).catch_unwind().await {
            Ok(Ok((findings, table))) => {
                self.events.on_log(
                    "success",
                    &format!("[!] Audit Complete. {} Unique vulnerabilities logged.", findings.len()),
                );
                ScanSummary::completed(target_url, findings, table)
            }
            Ok(Err(e)) => {
                self.events.on_log("error", &format!("[!] {}", e));
                ScanSummary::failed(target_url, e)
            }
            Err(panic) => {
                let err = ScanError::Unhandled(panic_message(panic));
                self.events.on_log("error", &format!("[!] {}", err));
                ScanSummary::failed(target_url, err)
            }
        }
    }

    async fn run(&self, target: &ParamTarget) -> Result<(Vec<Finding>, Option<PathBuf>), ScanError> {
        let mut sink = self.open_sink()?;

        if self.fingerprint {
            self.fingerprint_server(target).await;
        }

        let modules = self.catalog.modules();
        for (i, module) in modules.iter().enumerate() {
            self.events.on_progress(&format!("Scanning for {}", module.type_id), i + 1, modules.len());

            for detection in self.engine.run_target(module, target).await {
                let finding = self.resolve(detection).await;
                self.events.on_finding(&finding);
                sink.append(finding)?;
            }
        }

        let table = sink.table_path().map(Path::to_path_buf);
        Ok((sink.drain(), table))
    }

    fn open_sink(&self) -> Result<FindingSink, ScanError> {
        match &self.table_path {
            Some(path) => FindingSink::with_table(path),
            None => Ok(FindingSink::in_memory()),
        }
    }

    async fn resolve(&self, detection: Detection) -> Finding {
        info!(
            "{} on '{}' (status {}, server {}, {}ms)",
            detection.type_id,
            detection.parameter_name,
            detection.status_code,
            detection.server.as_deref().unwrap_or("N/A"),
            detection.timing_ms
        );
        let profile = self.catalog.lookup(&detection.type_id);
        let remedy = self.remedies.get_remedy(&detection.type_id, profile.severity).await;
        Finding::from_detection(detection, profile, remedy)
    }

    async fn fingerprint_server(&self, target: &ParamTarget) {
        self.events.on_log("phase", "[!] Fingerprinting Server...");
        match self.client.get(target.url()).await {
            Ok(resp) => {
                self.events.on_log("success", &format!("[!] Status code: {}", resp.status_code));
                self.events.on_log(
                    "success",
                    &format!("[!] Server: {}", resp.server.as_deref().unwrap_or("Unknown")),
                );
            }
            Err(e) => {
                warn!("Fingerprint request to {} failed: {}", target.url(), e);
                self.events.on_log("warn", &format!("[!] Connection Failed: {}", e));
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::remediation::{RemedyRequest, FALLBACK_REMEDY};
    use crate::core::report::read_rows;
    use crate::core::Severity;
    use crate::{ScanEventSink, SilentSink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemedyGenerator for CountingGenerator {
        async fn generate(&self, request: &RemedyRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Fix {} ({})", request.type_id, request.severity))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn scanner_with(generator: Arc<dyn RemedyGenerator>) -> Scanner {
        let client = Arc::new(HttpClient::new(5, None, &[]).unwrap());
        let remedies = Arc::new(RemediationCache::new(generator, Duration::from_secs(2), Duration::ZERO));
        Scanner::new(Arc::new(SignatureCatalog::builtin()), client, remedies, SilentSink::new_ref())
    }

    fn scanner() -> Scanner {
        scanner_with(Arc::new(StaticGenerator::new("Apply input validation.")))
    }

    async fn clean_fallback(server: &MockServer) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Welcome</body></html>"))
            .with_priority(10)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_target_without_params_is_input_error_without_requests() {
        let server = MockServer::start().await;
        clean_fallback(&server).await;

        let summary = scanner()
            .with_fingerprint(true)
            .scan(&format!("{}/page.php", server.uri()))
            .await;

        assert_eq!(summary.status, ScanStatus::Error);
        assert_eq!(summary.error_kind, Some(ErrorKind::InputError));
        assert_eq!(summary.http_status(), 400);
        assert!(summary.message.unwrap().contains("must have parameters"));
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_clean_target_is_success_with_zero_findings() {
        let server = MockServer::start().await;
        clean_fallback(&server).await;

        let summary = scanner().scan(&format!("{}/page.php?id=1", server.uri())).await;

        assert_eq!(summary.status, ScanStatus::Success);
        assert_eq!(summary.finding_count, 0);
        assert_eq!(summary.http_status(), 200);
        assert_eq!(summary.message.as_deref(), Some("No vulnerabilities detected."));
        // 3 SQLi + 4 RCE + 2 XSS + 2 LFI payloads on one parameter
        assert_eq!(server.received_requests().await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_sqli_on_or_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id", "' OR '1'='1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Warning: You have an error in your SQL syntax"))
            .mount(&server)
            .await;
        clean_fallback(&server).await;

        let summary = scanner().scan(&format!("{}/page.php?id=1", server.uri())).await;

        assert_eq!(summary.finding_count, 1);
        let finding = &summary.findings[0];
        assert_eq!(finding.type_id, "SQLi");
        assert_eq!(finding.parameter_name, "id");
        assert_eq!(finding.payload, "' OR '1'='1");
        assert_eq!(finding.severity_profile.severity, Severity::High);
        assert_eq!(finding.severity_profile.cvss_range, "7.0 - 9.0");
        assert_eq!(finding.remedy_text, "Apply input validation.");
        assert!(finding.proof_url.starts_with(&server.uri()));
    }

    #[tokio::test]
    async fn test_xss_on_two_params_with_different_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id", "<script>alert(1)</script>"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p><script>alert(1)</script></p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("name", "\"><svg/onload=alert(1)>"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<input value=\"\"><svg/onload=alert(1)>\">"))
            .mount(&server)
            .await;
        clean_fallback(&server).await;

        let summary = scanner()
            .with_concurrency(2)
            .scan(&format!("{}/search?id=1&name=bob", server.uri()))
            .await;

        assert_eq!(summary.finding_count, 2);
        assert!(summary.findings.iter().all(|f| f.type_id == "XSS"));
        assert_eq!(summary.findings[0].parameter_name, "id");
        assert_eq!(summary.findings[0].payload, "<script>alert(1)</script>");
        assert_eq!(summary.findings[1].parameter_name, "name");
        assert_eq!(summary.findings[1].payload, "\"><svg/onload=alert(1)>");
    }

    #[tokio::test]
    async fn test_findings_follow_module_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("file", "../../../../etc/passwd"))
            .respond_with(ResponseTemplate::new(200).set_body_string("root:x:0:0:root:/root:/bin/bash"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("file", "'"))
            .respond_with(ResponseTemplate::new(500).set_body_string("SQLite error: near \"'\""))
            .mount(&server)
            .await;
        clean_fallback(&server).await;

        let summary = scanner().scan(&format!("{}/view?file=a.txt", server.uri())).await;

        let types: Vec<&str> = summary.findings.iter().map(|f| f.type_id.as_str()).collect();
        assert_eq!(types, vec!["SQLi", "LFI"]);
    }

    #[tokio::test]
    async fn test_remedy_generated_once_per_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("mysql_fetch_array() expects parameter 1"))
            .mount(&server)
            .await;

        let generator = Arc::new(CountingGenerator { calls: AtomicUsize::new(0) });
        let summary = scanner_with(generator.clone())
            .scan(&format!("{}/list?a=1&b=2&c=3", server.uri()))
            .await;

        assert_eq!(summary.finding_count, 3);
        assert!(summary.findings.iter().all(|f| f.remedy_text == "Fix SQLi (HIGH)"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consecutive_runs_do_not_mix_findings() {
        let vulnerable = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("PostgreSQL query failed"))
            .mount(&vulnerable)
            .await;
        let clean = MockServer::start().await;
        clean_fallback(&clean).await;

        let dir = tempdir().unwrap();
        let table = dir.path().join("reports").join("security_audit_report.csv");
        let scanner = scanner().with_table(&table);

        let first = scanner.scan(&format!("{}/p?id=1&q=2", vulnerable.uri())).await;
        assert_eq!(first.finding_count, 2);
        assert_eq!(read_rows(std::fs::File::open(&table).unwrap()).unwrap().len(), 2);
        assert_eq!(first.report_path, Some(table.display().to_string()));

        let second = scanner.scan(&format!("{}/p?id=1", clean.uri())).await;
        assert_eq!(second.finding_count, 0);
        assert!(read_rows(std::fs::File::open(&table).unwrap()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_target_clears_previous_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("PostgreSQL query failed"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let table = dir.path().join("security_audit_report.csv");
        let scanner = scanner().with_table(&table);

        let first = scanner.scan(&format!("{}/p?id=1", server.uri())).await;
        assert_eq!(first.finding_count, 1);
        assert_eq!(read_rows(std::fs::File::open(&table).unwrap()).unwrap().len(), 1);
        let requests_after_first = server.received_requests().await.unwrap().len();

        let second = scanner.scan(&format!("{}/p", server.uri())).await;
        assert_eq!(second.error_kind, Some(ErrorKind::InputError));
        assert!(read_rows(std::fs::File::open(&table).unwrap()).unwrap().is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), requests_after_first);
    }

    #[tokio::test]
    async fn test_static_remedies_skip_pacing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("You have an error in your SQL syntax"))
            .mount(&server)
            .await;

        let config = ScanConfig {
            ai_remedies: false,
            remedy_pacing_ms: 30_000,
            fingerprint: false,
            output: String::new(),
            ..ScanConfig::default()
        };
        let scanner = Scanner::from_config(&config, SilentSink::new_ref()).unwrap();

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            scanner.scan(&format!("{}/p?id=1", server.uri())),
        )
        .await
        .expect("offline remedies must not wait for pacing");

        assert_eq!(summary.finding_count, 1);
        assert_eq!(summary.findings[0].remedy_text, FALLBACK_REMEDY);
    }

    #[tokio::test]
    async fn test_unwritable_table_is_server_error() {
        let server = MockServer::start().await;
        clean_fallback(&server).await;
        let dir = tempdir().unwrap();

        let summary = scanner()
            .with_table(dir.path())
            .scan(&format!("{}/p?id=1", server.uri()))
            .await;

        assert_eq!(summary.status, ScanStatus::Error);
        assert_eq!(summary.error_kind, Some(ErrorKind::SinkPersistenceError));
        assert_eq!(summary.http_status(), 500);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_not_a_failure() {
        let summary = scanner()
            .with_fingerprint(true)
            .scan("http://127.0.0.1:9/page.php?id=1")
            .await;

        assert!(summary.is_success());
        assert_eq!(summary.finding_count, 0);
    }

    #[tokio::test]
    async fn test_fingerprint_adds_one_request() {
        let server = MockServer::start().await;
        clean_fallback(&server).await;

        scanner()
            .with_fingerprint(true)
            .scan(&format!("{}/page.php?id=1", server.uri()))
            .await;

        assert_eq!(server.received_requests().await.unwrap().len(), 12);
    }

    struct PanickingSink;

    impl ScanEventSink for PanickingSink {
        fn on_log(&self, _level: &str, _message: &str) {}
        fn on_finding(&self, _finding: &Finding) {}
        fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {
            panic!("progress renderer crashed");
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_unhandled_error() {
        let client = Arc::new(HttpClient::new(5, None, &[]).unwrap());
        let remedies = Arc::new(RemediationCache::new(
            Arc::new(StaticGenerator::new(FALLBACK_REMEDY)),
            Duration::from_secs(1),
            Duration::ZERO,
        ));
        let scanner = Scanner::new(Arc::new(SignatureCatalog::builtin()), client, remedies, Arc::new(PanickingSink));

        let summary = scanner.scan("http://127.0.0.1:9/?id=1").await;

        assert_eq!(summary.error_kind, Some(ErrorKind::UnhandledError));
        assert_eq!(summary.http_status(), 500);
        assert!(summary.message.unwrap().contains("progress renderer crashed"));
    }

    #[tokio::test]
    async fn test_summary_json_shape() {
        let server = MockServer::start().await;
        clean_fallback(&server).await;

        let summary = scanner().scan(&format!("{}/page.php?id=1", server.uri())).await;
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["status"], "success");
        assert_eq!(json["finding_count"], 0);
        assert!(json["findings"].as_array().unwrap().is_empty());
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn test_from_config_with_custom_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"[{"type_id":"SSTI","payloads":["{{7*7}}"],"pattern":"\\b49\\b","cvss_range":"8.0 - 9.0","severity":"HIGH","description":"Template Injection"}]"#,
        )
        .unwrap();

        let config = ScanConfig {
            catalog: path.display().to_string(),
            ai_remedies: false,
            output: String::new(),
            ..ScanConfig::default()
        };
        let scanner = Scanner::from_config(&config, SilentSink::new_ref()).unwrap();
        assert_eq!(scanner.catalog().modules().len(), 1);
        assert_eq!(scanner.catalog().lookup("SSTI").severity, Severity::High);
        assert!(scanner.table_path.is_none());
    }
}
