use crate::core::Severity;
use crate::enrich::EnrichmentRecord;
use serde::{Deserialize, Serialize};

/// A single normalized security issue reported by the analyzer.
///
/// Line and column positions are preserved verbatim from the tool output;
/// only the severity vocabulary is canonicalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub check_id: String,

    pub file: String,

    pub line: usize,

    pub end_line: usize,

    pub column: usize,

    pub end_column: usize,

    pub severity: Severity,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owasp: Option<String>,

    /// Tool metadata carried through untouched for downstream consumers.
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub raw_metadata: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentRecord>,
}

impl Finding {
    pub fn new(check_id: String, file: String, severity: Severity, message: String) -> Self {
        Self {
            check_id,
            file,
            line: 0,
            end_line: 0,
            column: 0,
            end_column: 0,
            severity,
            message,
            cwe: None,
            owasp: None,
            raw_metadata: serde_json::Value::Null,
            enrichment: None,
        }
    }

    pub fn with_span(
        mut self,
        line: usize,
        end_line: usize,
        column: usize,
        end_column: usize,
    ) -> Self {
        self.line = line;
        self.end_line = end_line;
        self.column = column;
        self.end_column = end_column;
        self
    }

    pub fn with_cwe(mut self, cwe: impl Into<String>) -> Self {
        self.cwe = Some(cwe.into());
        self
    }

    pub fn with_owasp(mut self, owasp: impl Into<String>) -> Self {
        self.owasp = Some(owasp.into());
        self
    }

    pub fn with_raw_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.raw_metadata = metadata;
        self
    }
}
