//! Run-scoped, append-only record of what a run did or found.
//!
//! A ledger is never persisted incrementally. Reports take a [`Ledger::snapshot`]
//! by value at generation time.

use crate::{Priority, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully applied patch rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub rule_id: String,
    pub artifact: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    pub fn new(
        rule_id: impl Into<String>,
        artifact: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            artifact: artifact.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Issue {
    pub fn new(description: impl Into<String>, severity: Severity) -> Self {
        Self {
            description: description.into(),
            severity,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub description: String,
    pub priority: Priority,
}

impl Recommendation {
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        Self {
            description: description.into(),
            priority,
        }
    }
}

/// An issue together with the recommendation it produced, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Id of the diagnostic rule that produced this finding.
    pub rule_id: String,
    pub issue: Issue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
}

impl Finding {
    pub fn new(rule_id: impl Into<String>, issue: Issue) -> Self {
        Self {
            rule_id: rule_id.into(),
            issue,
            recommendation: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }
}

/// Ordered, append-only sequence of entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger<T> {
    entries: Vec<T>,
}

impl<T> Ledger<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }
}

impl<T: Clone> Ledger<T> {
    /// Copies the current entries out; later pushes do not affect the copy.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.clone()
    }
}

impl<T> Default for Ledger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a Ledger<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_preserves_insertion_order() {
        let mut ledger = Ledger::new();
        ledger.push(Fix::new("b", "x.yml", "second rule first"));
        ledger.push(Fix::new("a", "x.yml", "first rule second"));
        let ids: Vec<&str> = ledger.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut ledger = Ledger::new();
        ledger.push(Fix::new("a", "x.yml", "one"));
        let snap = ledger.snapshot();
        ledger.push(Fix::new("b", "x.yml", "two"));
        assert_eq!(snap.len(), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_finding_links_recommendation() {
        let finding = Finding::new("config.mode", Issue::new("production mode", Severity::High))
            .with_recommendation(Recommendation::new("switch to sandbox", Priority::High));
        assert_eq!(finding.issue.severity, Severity::High);
        assert_eq!(
            finding.recommendation.as_ref().map(|r| r.priority),
            Some(Priority::High)
        );
    }
}
