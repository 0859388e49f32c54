use crate::analyzer::RawFinding;
use crate::core::{Finding, Severity};

/// Map one tool-native finding into the canonical model.
///
/// Pure: identical input always yields an identical `Finding`. Positions
/// pass through verbatim; only the severity vocabulary is translated.
pub fn normalize_finding(raw: &RawFinding) -> Finding {
    let severity = normalize_severity(&raw.extra.severity);

    let mut finding = Finding::new(
        raw.check_id.clone(),
        raw.path.clone(),
        severity,
        raw.extra.message.clone(),
    )
    .with_span(raw.start.line, raw.end.line, raw.start.col, raw.end.col)
    .with_raw_metadata(raw.extra.metadata.clone());

    finding.cwe = extract_tag(&raw.extra.metadata, "cwe");
    finding.owasp = extract_tag(&raw.extra.metadata, "owasp");
    finding
}

pub fn normalize_findings(raw: &[RawFinding]) -> Vec<Finding> {
    raw.iter().map(normalize_finding).collect()
}

/// `ERROR → critical`, `WARNING → high`, `INFO → low`; anything the tool
/// invents beyond that defaults to `medium`.
pub fn normalize_severity(tool_severity: &str) -> Severity {
    match tool_severity.to_ascii_uppercase().as_str() {
        "ERROR" => Severity::Critical,
        "WARNING" => Severity::High,
        "INFO" => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Lift a classification tag out of the tool metadata when present.
/// Semgrep emits these both as plain strings and as arrays; the first
/// array element wins.
fn extract_tag(metadata: &serde_json::Value, key: &str) -> Option<String> {
    match metadata.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .first()
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(normalize_severity("ERROR"), Severity::Critical);
        assert_eq!(normalize_severity("WARNING"), Severity::High);
        assert_eq!(normalize_severity("INFO"), Severity::Low);
        assert_eq!(normalize_severity("error"), Severity::Critical);
        assert_eq!(normalize_severity("EXPERIMENT"), Severity::Medium);
        assert_eq!(normalize_severity(""), Severity::Medium);
    }

    #[test]
    fn test_positions_pass_through_verbatim() {
        let raw = RawFinding::new("rule", "src/a.rs")
            .with_span(17, 3, 19, 40)
            .with_severity("WARNING");
        let finding = normalize_finding(&raw);
        assert_eq!(finding.line, 17);
        assert_eq!(finding.column, 3);
        assert_eq!(finding.end_line, 19);
        assert_eq!(finding.end_column, 40);
        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn test_cwe_extracted_from_string_metadata() {
        let raw = RawFinding::new("sqli", "db.py")
            .with_severity("ERROR")
            .with_metadata(json!({"cwe": "CWE-89"}));
        let finding = normalize_finding(&raw);
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.cwe.as_deref(), Some("CWE-89"));
        assert_eq!(finding.owasp, None);
    }

    #[test]
    fn test_tags_extracted_from_array_metadata() {
        let raw = RawFinding::new("xss", "view.js").with_metadata(json!({
            "cwe": ["CWE-79: Improper Neutralization", "CWE-80"],
            "owasp": ["A03:2021 - Injection"]
        }));
        let finding = normalize_finding(&raw);
        assert_eq!(
            finding.cwe.as_deref(),
            Some("CWE-79: Improper Neutralization")
        );
        assert_eq!(finding.owasp.as_deref(), Some("A03:2021 - Injection"));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let raw = RawFinding::new("rule", "a.go")
            .with_severity("WARNING")
            .with_metadata(json!({"cwe": "CWE-20"}));
        let a = serde_json::to_string(&normalize_finding(&raw)).unwrap();
        let b = serde_json::to_string(&normalize_finding(&raw)).unwrap();
        assert_eq!(a, b);
    }
}
