//! Rule model: severities, categories, issues and the check trait.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::feed::FeedTables;

/// How much an issue counts against a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Score weight of a single issue per severity.
static WEIGHTS: &[(Severity, f64)] = &[
    (Severity::Error, 10.0),
    (Severity::Warning, 3.0),
    (Severity::Info, 1.0),
];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn weight(&self) -> f64 {
        WEIGHTS
            .iter()
            .find(|(s, _)| s == self)
            .map_or(0.0, |(_, w)| *w)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!("Invalid severity: {other}")),
        }
    }
}

/// Grouping label for rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Structure,
    DataQuality,
    ReferentialIntegrity,
    Geographic,
    Temporal,
    Sequence,
    Naming,
    Uniqueness,
    Performance,
}

/// One finding produced by a rule. The severity comes from the rule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Issue {
    pub message: String,
    pub details: Map<String, Value>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// The check behind a [`Rule`].
///
/// Checks read the feed and must not assume anything about other rules. An
/// `Err` (or a panic) is recovered by the validator and reported against the
/// rule instead of aborting the run.
pub trait RuleCheck: Send + Sync {
    fn check(&self, feed: &FeedTables) -> anyhow::Result<Vec<Issue>>;
}

impl<F> RuleCheck for F
where
    F: Fn(&FeedTables) -> anyhow::Result<Vec<Issue>> + Send + Sync,
{
    fn check(&self, feed: &FeedTables) -> anyhow::Result<Vec<Issue>> {
        self(feed)
    }
}

/// A named, independently runnable validation rule.
pub struct Rule {
    name: String,
    description: String,
    severity: Severity,
    category: Option<Category>,
    check: Box<dyn RuleCheck>,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        check: impl RuleCheck + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            severity,
            category: None,
            check: Box::new(check),
        }
    }

    /// Builds a rule from a plain function or closure.
    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        check: F,
    ) -> Self
    where
        F: Fn(&FeedTables) -> anyhow::Result<Vec<Issue>> + Send + Sync + 'static,
    {
        Self::new(name, description, severity, check)
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn check(&self, feed: &FeedTables) -> anyhow::Result<Vec<Issue>> {
        self.check.check(feed)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights() {
        assert_eq!(Severity::Error.weight(), 10.0);
        assert_eq!(Severity::Warning.weight(), 3.0);
        assert_eq!(Severity::Info.weight(), 1.0);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warning));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Info).unwrap(), "\"info\"");
        assert_eq!(
            serde_json::to_string(&Category::ReferentialIntegrity).unwrap(),
            "\"referential_integrity\""
        );
    }

    #[test]
    fn test_closure_rule() {
        let rule = Rule::from_fn("always", "Always fires", Severity::Info, |_| {
            Ok(vec![Issue::new("hello").with_detail("count", 2)])
        })
        .with_category(Category::Naming);

        let issues = rule.check(&FeedTables::new()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].details["count"], 2);
        assert_eq!(rule.category(), Some(Category::Naming));
    }
}
