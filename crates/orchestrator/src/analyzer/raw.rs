use serde::{Deserialize, Serialize};

/// Semgrep's JSON report, as emitted with `--json`. Parsing is permissive:
/// absent fields default rather than failing the whole report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReport {
    #[serde(default)]
    pub results: Vec<RawFinding>,

    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

/// One tool-native finding, positions and severity untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default = "unknown_check_id")]
    pub check_id: String,

    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub start: RawPosition,

    #[serde(default)]
    pub end: RawPosition,

    #[serde(default)]
    pub extra: RawExtra,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub line: usize,

    #[serde(default)]
    pub col: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtra {
    /// Tool-native severity vocabulary (ERROR/WARNING/INFO for semgrep).
    #[serde(default = "default_severity")]
    pub severity: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A result with no `extra` object at all still gets the tool's implied
/// severity, matching the field-level serde default.
impl Default for RawExtra {
    fn default() -> Self {
        Self {
            severity: default_severity(),
            message: String::new(),
            metadata: serde_json::Value::Null,
        }
    }
}

fn unknown_check_id() -> String {
    "unknown".to_string()
}

fn default_severity() -> String {
    "INFO".to_string()
}

impl RawReport {
    pub fn parse(output: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(output)
    }
}

impl RawFinding {
    pub fn new(check_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_span(mut self, start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        self.start = RawPosition {
            line: start_line,
            col: start_col,
        };
        self.end = RawPosition {
            line: end_line,
            col: end_col,
        };
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.extra.severity = severity.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.extra.message = message.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.extra.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_semgrep_report() {
        let report = RawReport::parse(
            r#"{
                "results": [
                    {
                        "check_id": "python.lang.security.sql-injection",
                        "path": "app/db.py",
                        "start": {"line": 14, "col": 5},
                        "end": {"line": 14, "col": 42},
                        "extra": {
                            "severity": "ERROR",
                            "message": "Query built from user input",
                            "metadata": {"cwe": "CWE-89", "owasp": "A03:2021"}
                        }
                    }
                ],
                "errors": []
            }"#,
        )
        .unwrap();

        assert_eq!(report.results.len(), 1);
        let finding = &report.results[0];
        assert_eq!(finding.check_id, "python.lang.security.sql-injection");
        assert_eq!(finding.start.line, 14);
        assert_eq!(finding.end.col, 42);
        assert_eq!(finding.extra.severity, "ERROR");
    }

    #[test]
    fn test_parse_tolerates_missing_fields() {
        let report = RawReport::parse(r#"{"results": [{"path": "x.js"}]}"#).unwrap();
        assert_eq!(report.results[0].check_id, "unknown");
        assert_eq!(report.results[0].extra.severity, "INFO");
        assert_eq!(report.results[0].start.line, 0);
    }

    #[test]
    fn test_default_extra_carries_implied_severity() {
        let extra = RawExtra::default();
        assert_eq!(extra.severity, "INFO");
        assert!(extra.message.is_empty());
        assert!(extra.metadata.is_null());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RawReport::parse("semgrep: command crashed").is_err());
    }
}
