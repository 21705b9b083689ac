//! GTFS compliance checks.
//!
//! A [`Validator`] runs a list of [`Rule`]s over a loaded feed and folds the
//! issues they raise into a scored [`ValidationReport`].

mod engine;
mod report;
mod rule;
pub mod rules;

#[cfg(test)]
pub(crate) mod fixtures;

pub use engine::Validator;
pub use report::{compliance_score, ReportIssue, ReportSummary, ValidationReport, ValidationStatus};
pub use rule::{Category, Issue, Rule, RuleCheck, Severity};
pub use rules::get_all_rules;
