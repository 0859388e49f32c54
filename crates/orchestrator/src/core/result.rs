use crate::core::{Finding, SeverityHistogram};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The completed-scan document. Produced exactly once per job by the
/// pipeline and handed to the registry; nothing mutates it afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: String,

    /// Redacted description of what was scanned (URL without credentials,
    /// or the local path).
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    pub findings: Vec<Finding>,

    pub total_findings: usize,

    pub by_severity: SeverityHistogram,

    /// Bounded risk score in [0, 10].
    pub risk_score: f64,

    pub rules_used: Vec<String>,

    pub started_at: DateTime<Utc>,

    pub duration_seconds: f64,

    pub status: String,
}

impl ScanResult {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# Scan Report\n\n");

        md.push_str(&format!("- Source: {}\n", self.source));
        if let Some(ref branch) = self.branch {
            md.push_str(&format!("- Branch: {}\n", branch));
        }
        md.push_str(&format!("- Risk score: {:.2}/10\n", self.risk_score));
        md.push_str(&format!("- Duration: {:.1}s\n\n", self.duration_seconds));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- Critical: {}\n", self.by_severity.critical));
        md.push_str(&format!("- High: {}\n", self.by_severity.high));
        md.push_str(&format!("- Medium: {}\n", self.by_severity.medium));
        md.push_str(&format!("- Low: {}\n\n", self.by_severity.low));

        if !self.findings.is_empty() {
            md.push_str("## Findings\n\n");
            for finding in &self.findings {
                md.push_str(&format!(
                    "### {} {}: {}\n\n",
                    finding.severity.emoji(),
                    finding.severity,
                    finding.check_id
                ));
                md.push_str(&format!(
                    "- Location: {}:{}:{}\n",
                    finding.file, finding.line, finding.column
                ));
                if let Some(ref cwe) = finding.cwe {
                    md.push_str(&format!("- CWE: {}\n", cwe));
                }
                if let Some(ref owasp) = finding.owasp {
                    md.push_str(&format!("- OWASP: {}\n", owasp));
                }
                md.push_str(&format!("\n{}\n\n", finding.message));

                if let Some(ref enrichment) = finding.enrichment {
                    md.push_str(&format!(
                        "**AI verdict:** {} (confidence {:.2})\n\n",
                        if enrichment.is_true_positive {
                            "true positive"
                        } else {
                            "likely false positive"
                        },
                        enrichment.confidence
                    ));
                    if let Some(ref fix) = enrichment.suggested_fix {
                        md.push_str(&format!("**Suggested fix:**\n\n```\n{}\n```\n\n", fix));
                    }
                }
            }
        }

        md
    }
}
