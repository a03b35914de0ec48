//! # The Anatomist: read-only diagnostic scan
//!
//! Runs a [`DiagnosticRule`] table over the workspace and records every
//! finding on the run's ledger. Nothing on disk is modified.
//!
//! ## Workflow
//! 1. Group content rules by target artifact in order of first appearance;
//!    tree rules form their own single-rule groups.
//! 2. Read each target once. Missing or non-UTF-8 targets become one LOW
//!    finding and the scan moves on.
//! 3. Evaluate each rule. An extractor that cannot parse the content turns
//!    into a LOW finding for that rule only.
//! 4. Advance the run to `Scanned`.
//!
//! Any other read failure aborts the scan. Paths a tree rule cannot read are
//! skipped and kept as run notes.

pub mod rule;
pub mod table;
pub mod tree;

pub use rule::{
    evaluate, Advice, Classifier, DiagnosticRule, ExtractError, Extractor, Observation, Source,
};
pub use table::default_rules;
pub use tree::{Probe, Skipped, Survey};

use common::{ArtifactError, DiagnosticRun, Finding, Issue, RunError, RunState, Severity, Workspace};
use tracing::{info, warn};

/// Id recorded on findings about an artifact that is not there.
pub const MISSING_ARTIFACT: &str = "artifact.missing";
/// Id recorded on findings about an artifact that is not valid text.
pub const MALFORMED_ARTIFACT: &str = "artifact.malformed";

/// Errors from diagnostic scans.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot read artifact for scanning: {0}")]
    Unreadable(#[source] ArtifactError),
    #[error(transparent)]
    Run(#[from] RunError),
}

enum Group<'r> {
    Artifact(&'static str, Vec<&'r DiagnosticRule>),
    Tree(&'r DiagnosticRule),
}

/// The diagnostic engine over a fixed rule table.
pub struct Anatomist<'r> {
    rules: &'r [DiagnosticRule],
}

impl Anatomist<'static> {
    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }
}

impl<'r> Anatomist<'r> {
    pub fn new(rules: &'r [DiagnosticRule]) -> Self {
        Self { rules }
    }

    /// Scans the workspace once. Returns the number of findings recorded.
    pub fn scan(&self, run: &mut DiagnosticRun, workspace: &Workspace) -> Result<usize, ScanError> {
        info!(rules = self.rules.len(), "starting diagnostic scan");
        let before = run.ledger().len();

        for group in self.groups() {
            match group {
                Group::Artifact(path, rules) => scan_artifact(run, workspace, path, &rules)?,
                Group::Tree(rule) => {
                    if let Source::Tree(probe) = &rule.source {
                        let survey = probe.observe(workspace.root());
                        for skipped in &survey.skipped {
                            let path = skipped
                                .path
                                .strip_prefix(workspace.root())
                                .unwrap_or(&skipped.path);
                            run.note(
                                path.display().to_string(),
                                format!("skipped by {}: {}", rule.id, skipped.reason),
                            );
                        }
                        record_all(run, rule.classify(&survey.observations));
                    }
                }
            }
        }

        run.advance(RunState::Scanned)?;
        let found = run.ledger().len() - before;
        let high = run
            .ledger()
            .iter()
            .filter(|f| f.issue.severity == Severity::High)
            .count();
        if high > 0 {
            warn!(found, high, "scan complete with high-severity issues");
        } else {
            info!(found, "scan complete, no high-severity issues");
        }
        Ok(found)
    }

    fn groups(&self) -> Vec<Group<'r>> {
        let mut groups: Vec<Group<'r>> = Vec::new();
        for rule in self.rules {
            let Some(target) = rule.target() else {
                groups.push(Group::Tree(rule));
                continue;
            };
            let existing = groups.iter_mut().find_map(|g| match g {
                Group::Artifact(path, members) if *path == target => Some(members),
                _ => None,
            });
            match existing {
                Some(members) => members.push(rule),
                None => groups.push(Group::Artifact(target, vec![rule])),
            }
        }
        groups
    }
}

fn scan_artifact(
    run: &mut DiagnosticRun,
    workspace: &Workspace,
    path: &'static str,
    rules: &[&DiagnosticRule],
) -> Result<(), ScanError> {
    let content = match workspace.read(path) {
        Ok(content) => content,
        Err(ArtifactError::Missing(_)) => {
            warn!(artifact = path, "artifact not found");
            run.record(Finding::new(
                MISSING_ARTIFACT,
                Issue::new(format!("artifact not found: {path}"), Severity::Low),
            ));
            return Ok(());
        }
        Err(ArtifactError::Malformed { reason, .. }) => {
            warn!(artifact = path, %reason, "artifact is not valid text");
            run.record(Finding::new(
                MALFORMED_ARTIFACT,
                Issue::new(format!("malformed artifact {path}: {reason}"), Severity::Low),
            ));
            return Ok(());
        }
        Err(e) => return Err(ScanError::Unreadable(e)),
    };

    for rule in rules {
        match evaluate(rule, &content) {
            Ok(findings) => record_all(run, findings),
            Err(e) => {
                warn!(rule = rule.id, artifact = path, error = %e, "extraction failed, rule skipped");
                run.record(Finding::new(
                    rule.id,
                    Issue::new(format!("malformed artifact {path}: {e}"), Severity::Low),
                ));
            }
        }
    }
    Ok(())
}

fn record_all(run: &mut DiagnosticRun, findings: Vec<Finding>) {
    for finding in findings {
        info!(
            rule = %finding.rule_id,
            severity = %finding.issue.severity,
            "{}",
            finding.issue.description
        );
        run.record(finding);
    }
}
