//! Immutable validation outcome and its query surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rule::{Issue, Severity};
use crate::error::{DatabusError, Result};

/// Overall verdict for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    ValidWithWarnings,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::ValidWithWarnings => "valid_with_warnings",
            ValidationStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`Issue`] tagged with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportIssue {
    pub rule: String,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub severity: Severity,
}

impl ReportIssue {
    pub fn from_issue(rule: &str, severity: Severity, issue: Issue) -> Self {
        Self {
            rule: rule.to_string(),
            message: issue.message,
            details: issue.details,
            severity,
        }
    }
}

/// Weighted compliance score in `[0, 100]`.
///
/// Each issue costs its severity weight; the budget is one error's weight per
/// active rule. With no rules the score is 100.
pub fn compliance_score(errors: usize, warnings: usize, notices: usize, rule_count: usize) -> f64 {
    let max_weight = Severity::Error.weight() * rule_count as f64;
    if max_weight <= 0.0 {
        return 100.0;
    }

    let total_weight = errors as f64 * Severity::Error.weight()
        + warnings as f64 * Severity::Warning.weight()
        + notices as f64 * Severity::Info.weight();

    (100.0 - 100.0 * total_weight / max_weight).max(0.0)
}

/// Status and score are always derived from the issue lists, including when a
/// report is read back from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredReport")]
pub struct ValidationReport {
    status: ValidationStatus,
    score: f64,
    errors: Vec<ReportIssue>,
    warnings: Vec<ReportIssue>,
    notices: Vec<ReportIssue>,
    rule_count: usize,
    feed_path: Option<String>,
    validated_at: DateTime<Utc>,
}

/// Persisted form of a report. Stored `status` and `score` are ignored.
#[derive(Deserialize)]
struct StoredReport {
    #[serde(default)]
    errors: Vec<ReportIssue>,
    #[serde(default)]
    warnings: Vec<ReportIssue>,
    #[serde(default)]
    notices: Vec<ReportIssue>,
    rule_count: usize,
    #[serde(default)]
    feed_path: Option<String>,
    validated_at: DateTime<Utc>,
}

impl TryFrom<StoredReport> for ValidationReport {
    type Error = DatabusError;

    fn try_from(stored: StoredReport) -> Result<Self> {
        let lists = [
            ("errors", Severity::Error, &stored.errors),
            ("warnings", Severity::Warning, &stored.warnings),
            ("notices", Severity::Info, &stored.notices),
        ];
        for (list, severity, issues) in lists {
            if let Some(bad) = issues.iter().find(|i| i.severity != severity) {
                return Err(DatabusError::DataFormat(format!(
                    "{} issue from rule '{}' listed under {list}",
                    bad.severity, bad.rule
                )));
            }
        }

        Ok(Self::derive(
            stored.errors,
            stored.warnings,
            stored.notices,
            stored.rule_count,
            stored.feed_path,
            stored.validated_at,
        ))
    }
}

/// Compact view of a report for display and CSV history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub status: ValidationStatus,
    pub score: f64,
    pub total_issues: usize,
    pub errors: usize,
    pub warnings: usize,
    pub notices: usize,
    pub validated_at: String,
    pub feed_path: Option<String>,
}

impl ValidationReport {
    /// Builds a report from issues in rule order; status and score are derived.
    pub fn new(issues: Vec<ReportIssue>, rule_count: usize, feed_path: Option<String>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut notices = Vec::new();

        for issue in issues {
            match issue.severity {
                Severity::Error => errors.push(issue),
                Severity::Warning => warnings.push(issue),
                Severity::Info => notices.push(issue),
            }
        }

        Self::derive(errors, warnings, notices, rule_count, feed_path, Utc::now())
    }

    fn derive(
        errors: Vec<ReportIssue>,
        warnings: Vec<ReportIssue>,
        notices: Vec<ReportIssue>,
        rule_count: usize,
        feed_path: Option<String>,
        validated_at: DateTime<Utc>,
    ) -> Self {
        let status = if !errors.is_empty() {
            ValidationStatus::Invalid
        } else if !warnings.is_empty() {
            ValidationStatus::ValidWithWarnings
        } else {
            ValidationStatus::Valid
        };
        let score = compliance_score(errors.len(), warnings.len(), notices.len(), rule_count);

        Self {
            status,
            score,
            errors,
            warnings,
            notices,
            rule_count,
            feed_path,
            validated_at,
        }
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn errors(&self) -> &[ReportIssue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ReportIssue] {
        &self.warnings
    }

    pub fn notices(&self) -> &[ReportIssue] {
        &self.notices
    }

    /// Number of rules that were active when the report was built.
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    pub fn feed_path(&self) -> Option<&str> {
        self.feed_path.as_deref()
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    pub fn total_issues(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.notices.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn issues(&self, severity: Severity) -> &[ReportIssue] {
        match severity {
            Severity::Error => &self.errors,
            Severity::Warning => &self.warnings,
            Severity::Info => &self.notices,
        }
    }

    /// Every issue reported under `rule`, errors first.
    pub fn get_issues_by_rule(&self, rule: &str) -> Vec<&ReportIssue> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.notices)
            .filter(|i| i.rule == rule)
            .collect()
    }

    /// Copy of the issues for `severity` ("error", "warning" or "info").
    /// Unknown severities yield an empty list.
    pub fn get_issues_by_severity(&self, severity: &str) -> Vec<ReportIssue> {
        severity
            .parse::<Severity>()
            .map(|s| self.issues(s).to_vec())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            status: self.status,
            score: (self.score * 10.0).round() / 10.0,
            total_issues: self.total_issues(),
            errors: self.errors.len(),
            warnings: self.warnings.len(),
            notices: self.notices.len(),
            validated_at: self.validated_at.to_rfc3339(),
            feed_path: self.feed_path.clone(),
        }
    }

    /// Pretty JSON document with the full report plus its summary.
    pub fn to_json(&self) -> Result<String> {
        let mut doc = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut doc {
            map.insert("summary".to_string(), serde_json::to_value(self.summary())?);
        }
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(rule: &str, severity: Severity) -> ReportIssue {
        ReportIssue::from_issue(
            rule,
            severity,
            Issue::new(format!("{rule} fired")).with_detail("count", 1),
        )
    }

    #[test]
    fn test_status_derivation() {
        let report = ValidationReport::new(vec![issue("a", Severity::Info)], 1, None);
        assert_eq!(report.status(), ValidationStatus::Valid);

        let report = ValidationReport::new(
            vec![issue("a", Severity::Warning), issue("b", Severity::Info)],
            2,
            None,
        );
        assert_eq!(report.status(), ValidationStatus::ValidWithWarnings);

        let report = ValidationReport::new(
            vec![issue("a", Severity::Warning), issue("b", Severity::Error)],
            2,
            None,
        );
        assert_eq!(report.status(), ValidationStatus::Invalid);
        assert!(report.has_errors());
        assert!(report.has_warnings());
    }

    #[test]
    fn test_score_weights_and_clamp() {
        assert_eq!(compliance_score(0, 0, 0, 0), 100.0);
        assert_eq!(compliance_score(0, 0, 0, 10), 100.0);
        assert_eq!(compliance_score(1, 0, 0, 10), 90.0);
        assert_eq!(compliance_score(0, 1, 1, 10), 96.0);
        assert_eq!(compliance_score(50, 0, 0, 2), 0.0);
    }

    #[test]
    fn test_queries() {
        let report = ValidationReport::new(
            vec![
                issue("dup", Severity::Error),
                issue("names", Severity::Info),
                issue("dup", Severity::Error),
            ],
            3,
            Some("feed.zip".into()),
        );
        assert_eq!(report.total_issues(), 3);
        assert_eq!(report.get_issues_by_rule("dup").len(), 2);
        assert!(report.get_issues_by_rule("nope").is_empty());
        assert_eq!(report.get_issues_by_severity("info").len(), 1);
        assert!(report.get_issues_by_severity("bogus").is_empty());
    }

    #[test]
    fn test_summary_rounds_score() {
        let report = ValidationReport::new(vec![issue("a", Severity::Info)], 3, None);
        let summary = report.summary();
        assert_eq!(summary.score, 96.7);
        assert_eq!(summary.notices, 1);
        assert!(DateTime::parse_from_rfc3339(&summary.validated_at).is_ok());
    }

    #[test]
    fn test_json_round_trip_keeps_details() {
        let mut nested = issue("fk", Severity::Error);
        nested
            .details
            .insert("missing_route_ids".into(), json!(["R9", "R10"]));
        let report = ValidationReport::new(vec![nested], 10, Some("feed".into()));

        let text = report.to_json().unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["status"], "invalid");
        assert_eq!(doc["summary"]["errors"], 1);
        assert_eq!(doc["errors"][0]["details"]["missing_route_ids"][1], "R10");

        let back = ValidationReport::from_json(&text).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_json_round_trip_keeps_fractional_score() {
        let report = ValidationReport::new(vec![issue("a", Severity::Info)], 3, None);
        assert!(report.score() > 96.66 && report.score() < 96.67);

        let back = ValidationReport::from_json(&report.to_json().unwrap()).unwrap();
        assert_eq!(back.score().to_bits(), report.score().to_bits());
        assert_eq!(back, report);

        for notices in 1..40 {
            let issues = (0..notices).map(|_| issue("n", Severity::Info)).collect();
            let report = ValidationReport::new(issues, 7, None);
            let back = ValidationReport::from_json(&report.to_json().unwrap()).unwrap();
            assert_eq!(back.score(), report.score(), "{notices} notices");
        }
    }

    #[test]
    fn test_from_json_derives_status_and_score() {
        let report = ValidationReport::new(vec![issue("dup", Severity::Error)], 2, None);
        let mut doc: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        doc["status"] = json!("valid");
        doc["score"] = json!(250.0);

        let back = ValidationReport::from_json(&doc.to_string()).unwrap();
        assert_eq!(back.status(), ValidationStatus::Invalid);
        assert_eq!(back.score(), 50.0);
        assert_eq!(back.errors().len(), 1);
        assert_eq!(back.validated_at(), report.validated_at());
    }

    #[test]
    fn test_from_json_rejects_misfiled_issue() {
        let report = ValidationReport::new(vec![issue("names", Severity::Info)], 2, None);
        let mut doc: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let notices = doc["notices"].take();
        doc["errors"] = notices;
        doc["notices"] = json!([]);

        let err = ValidationReport::from_json(&doc.to_string()).unwrap_err();
        assert!(err.to_string().contains("listed under errors"));
    }
}
