//! Tabular export of findings for the report rendering pipeline.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::core::Finding;

/// Fixed column set consumed by report renderers.
pub const REPORT_COLUMNS: [&str; 7] = [
    "Vulnerability Type",
    "CVSS Range",
    "Severity",
    "POC URL",
    "Payload",
    "Description",
    "AI Suggested Remedy",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Vulnerability Type")]
    pub vuln_type: String,
    #[serde(rename = "CVSS Range")]
    pub cvss_range: String,
    #[serde(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "POC URL")]
    pub poc_url: String,
    #[serde(rename = "Payload")]
    pub payload: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "AI Suggested Remedy")]
    pub remedy: String,
}

impl From<&Finding> for ReportRow {
    fn from(finding: &Finding) -> Self {
        Self {
            vuln_type: finding.type_id.clone(),
            cvss_range: finding.severity_profile.cvss_range.clone(),
            severity: finding.severity_profile.severity.to_string(),
            poc_url: finding.proof_url.clone(),
            payload: finding.payload.clone(),
            description: finding.severity_profile.description.clone(),
            remedy: finding.remedy_text.clone(),
        }
    }
}

/// Writes the header and one row per finding, in order.
pub fn write_rows<W: Write>(findings: &[Finding], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(REPORT_COLUMNS)?;
    for finding in findings {
        wtr.serialize(ReportRow::from(finding))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ReportRow>, csv::Error> {
    csv::Reader::from_reader(reader).deserialize().collect()
}
