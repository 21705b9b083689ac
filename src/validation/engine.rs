use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info};

use super::report::{ReportIssue, ValidationReport};
use super::rule::{Issue, Rule, Severity};
use super::rules;
use crate::error::{DatabusError, Result};
use crate::feed::FeedTables;
use crate::processor::GtfsProcessor;

/// Runs a set of rules against a feed and builds a [`ValidationReport`].
///
/// The rule set is fixed at construction and extended with
/// [`Validator::add_custom_rule`]; it is owned by this validator only.
#[derive(Debug)]
pub struct Validator {
    rules: Vec<Rule>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::standard()
    }
}

impl Validator {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Validator preloaded with [`rules::get_all_rules`].
    pub fn standard() -> Self {
        Self::new(rules::get_all_rules())
    }

    /// Appends a rule. Names must be unique across the active set so that
    /// report lookups by rule stay unambiguous.
    pub fn add_custom_rule(&mut self, rule: Rule) -> Result<()> {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return Err(DatabusError::DuplicateRule(rule.name().to_string()));
        }
        debug!(rule = rule.name(), severity = %rule.severity(), "Registered custom rule");
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Validates the feed held by `processor`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabusError::Configuration`] when no feed has been loaded.
    /// A non-compliant feed is not an error: inspect the report status.
    pub fn validate(&self, processor: &GtfsProcessor) -> Result<ValidationReport> {
        let feed = processor.feed()?;
        Ok(self.validate_feed(feed))
    }

    /// Runs every rule in order. Failing rules are reported as errors
    /// against themselves and never stop the run.
    pub fn validate_feed(&self, feed: &FeedTables) -> ValidationReport {
        info!(rules = self.rules.len(), "Starting GTFS validation");

        let mut issues = Vec::new();
        for rule in &self.rules {
            debug!(rule = rule.name(), "Running validation rule");
            match run_rule(rule, feed) {
                Ok(found) => issues.extend(
                    found
                        .into_iter()
                        .map(|i| ReportIssue::from_issue(rule.name(), rule.severity(), i)),
                ),
                Err(cause) => {
                    error!(rule = rule.name(), error = %cause, "Validation rule failed");
                    issues.push(ReportIssue::from_issue(
                        rule.name(),
                        Severity::Error,
                        Issue::new(format!("Validation rule failed: {cause}")),
                    ));
                }
            }
        }

        let feed_path = feed.source().map(|p| p.display().to_string());
        let report = ValidationReport::new(issues, self.rules.len(), feed_path);

        info!(
            status = %report.status(),
            score = format!("{:.1}", report.score()),
            errors = report.errors().len(),
            warnings = report.warnings().len(),
            notices = report.notices().len(),
            "Validation completed"
        );
        report
    }
}

fn run_rule(rule: &Rule, feed: &FeedTables) -> std::result::Result<Vec<Issue>, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| rule.check(feed))) {
        Ok(Ok(issues)) => Ok(issues),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "rule panicked".to_string()
    }
}
