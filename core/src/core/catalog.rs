use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::core::{Severity, SeverityProfile};

/// One vulnerability class: the payloads to try, in priority order, and the
/// response-body signature that confirms it.
#[derive(Debug, Clone)]
pub struct VulnerabilityModule {
    pub type_id: String,
    pub payloads: Vec<String>,
    pub detection_pattern: Regex,
}

impl VulnerabilityModule {
    pub fn new(type_id: &str, payloads: &[&str], pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            type_id: type_id.to_string(),
            payloads: payloads.iter().map(|p| p.to_string()).collect(),
            detection_pattern: compile_pattern(pattern)?,
        })
    }

    /// Case-insensitive signature match against a response body.
    pub fn matches(&self, body: &str) -> bool {
        self.detection_pattern.is_match(body)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Serialized form of a catalog entry, used by `--catalog` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub type_id: String,
    pub payloads: Vec<String>,
    pub pattern: String,
    pub cvss_range: String,
    pub severity: Severity,
    pub description: String,
}

const BUILTIN: &[(&str, &[&str], &str, &str, Severity, &str)] = &[
    (
        "SQLi",
        &["'", "''", "' OR '1'='1"],
        r"SQL syntax|mysql_fetch|PostgreSQL|SQLite",
        "7.0 - 9.0",
        Severity::High,
        "SQL Injection",
    ),
    (
        "RCE",
        &[";uname -a", "&& dir", "|id", "${@print(md5(zigoo))}"],
        r"root:x:0:0|Linux version|uid=\d+|Directory of|4c7cb1f3dab125cadfdc987597c1c9aa",
        "9.0 - 10.0",
        Severity::Critical,
        "Remote Code Execution",
    ),
    (
        "XSS",
        &["<script>alert(1)</script>", "\"><svg/onload=alert(1)>"],
        r"<script>alert\(1\)</script>|<svg/onload=alert\(1\)>",
        "4.0 - 7.0",
        Severity::Medium,
        "Cross-Site Scripting",
    ),
    (
        "LFI",
        &["../../../../etc/passwd", r"..\..\win.ini"],
        r"root:x:0:0|\[extensions\]",
        "6.0 - 8.0",
        Severity::High,
        "Local File Inclusion",
    ),
];

/// Immutable table of vulnerability modules and their severity profiles.
///
/// Built once at startup and shared by reference; modules are kept in
/// declaration order, which is also the order the scanner runs them in.
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    modules: Vec<VulnerabilityModule>,
    profiles: HashMap<String, SeverityProfile>,
}

impl SignatureCatalog {
    /// The default SQLi / RCE / XSS / LFI catalog.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(type_id, payloads, pattern, cvss, severity, desc)| CatalogEntry {
                type_id: type_id.to_string(),
                payloads: payloads.iter().map(|p| p.to_string()).collect(),
                pattern: pattern.to_string(),
                cvss_range: cvss.to_string(),
                severity: *severity,
                description: desc.to_string(),
            })
            .collect();

        Self::from_entries(entries).expect("built-in signature catalog is valid")
    }

    /// Builds a catalog, rejecting duplicate ids, empty payload sets and bad patterns.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> anyhow::Result<Self> {
        if entries.is_empty() {
            bail!("catalog declares no vulnerability modules");
        }

        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(entries.len());
        let mut profiles = HashMap::with_capacity(entries.len());

        for entry in entries {
            if !seen.insert(entry.type_id.clone()) {
                bail!("duplicate vulnerability type '{}'", entry.type_id);
            }
            if entry.payloads.is_empty() {
                bail!("vulnerability type '{}' has no payloads", entry.type_id);
            }
            let detection_pattern = compile_pattern(&entry.pattern)
                .with_context(|| format!("invalid detection pattern for '{}'", entry.type_id))?;

            profiles.insert(
                entry.type_id.clone(),
                SeverityProfile {
                    cvss_range: entry.cvss_range,
                    severity: entry.severity,
                    description: entry.description,
                },
            );
            modules.push(VulnerabilityModule {
                type_id: entry.type_id,
                payloads: entry.payloads,
                detection_pattern,
            });
        }

        Ok(Self { modules, profiles })
    }

    /// Loads a catalog from a JSON array of entries.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let data = fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read catalog file '{}'", path))?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse catalog file '{}'", path))?;
        Self::from_entries(entries)
    }

    /// Total lookup: unknown types get the default INFO profile.
    pub fn lookup(&self, type_id: &str) -> SeverityProfile {
        self.profiles.get(type_id).cloned().unwrap_or_default()
    }

    pub fn modules(&self) -> &[VulnerabilityModule] {
        &self.modules
    }

    pub fn payload_count(&self) -> usize {
        self.modules.iter().map(|m| m.payloads.len()).sum()
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
