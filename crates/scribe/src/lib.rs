//! # The Scribe: run reports
//!
//! Turns a finished run into a [`Report`] value and renders it twice: JSON
//! for machines and Markdown for operators. The report is built from a ledger
//! snapshot, so later changes to the run never show up in it.
//!
//! ## Protocol
//! 1. [`Report::from_patch_run`] / [`Report::from_diagnostic_run`] copy the
//!    ledger, notes and run metadata out by value.
//! 2. [`publish_patch`] / [`publish_diagnostic`] overwrite both report files at
//!    their fixed paths, then advance the run to `Reported`.
//!
//! No history is kept; each publish replaces the previous report of its kind.

use chrono::{DateTime, Utc};
use common::{
    DiagnosticRun, Layout, Note, PatchRun, Priority, RunError, RunKind, RunState, Severity,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const NEXT_STEPS: &[&str] = &[
    "Restart the trading service so the changes take effect",
    "Keep it in sandbox mode while testing",
    "Watch the logs for the signals below",
    "Exercise trading operations before going back to production",
];

/// Log lines that show the protections at work, with what each one means.
const LOG_SIGNALS: &[(&str, &str)] = &[
    ("БЛОКИРОВКА OVERTRADING", "the cooldown blocked a premature trade"),
    ("OPERATION WINDOW BLOCK", "a repeated operation inside 10 minutes was refused"),
    ("COOLDOWN DIAGNOSTICS", "timing details of a cooldown block"),
    ("TRADING DECISION", "inputs behind each final trading decision"),
];

const IMMEDIATE_ACTIONS: &[&str] = &[
    "Switch the bot to sandbox mode for safe testing",
    "Raise cooldown periods to at least 45 minutes",
    "Reduce position sizes to 0.5-1% of the portfolio",
    "Log every trading decision in detail",
    "Review the immediate-operation logic in PortfolioManagementService",
];

const LONG_TERM: &[&str] = &[
    "Implement stricter risk management",
    "Add further checks before every trading operation",
    "Set up monitoring and alerting",
    "Backtest the strategy on historical data",
];

fn numbered(out: &mut String, heading: &str, items: &[&str]) {
    out.push_str(&format!("\n## {heading}\n\n"));
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {item}\n", i + 1));
    }
}

/// Errors from report generation.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Run(#[from] RunError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Fix,
    Issue,
}

/// One fix or issue, in ledger order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub kind: EntryKind,
    pub rule_id: String,
    pub description: String,
    #[serde(rename = "severity_or_priority", skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationEntry {
    /// Rule whose issue produced this recommendation.
    pub rule_id: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_severity: BTreeMap<Severity, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_priority: BTreeMap<Priority, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_artifact: BTreeMap<String, usize>,
}

/// Immutable rendering input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub kind: RunKind,
    /// Run state when the report was taken, e.g. `{"patched": "partial"}`.
    pub status: RunState,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_root: Option<PathBuf>,
    pub summary: Summary,
    pub entries: Vec<Entry>,
    pub recommendations: Vec<RecommendationEntry>,
    pub notes: Vec<Note>,
}

impl Report {
    pub fn from_patch_run(run: &PatchRun) -> Self {
        let fixes = run.ledger().snapshot();
        let mut summary = Summary {
            total: fixes.len(),
            ..Summary::default()
        };
        for fix in &fixes {
            *summary.by_artifact.entry(fix.artifact.clone()).or_default() += 1;
        }
        let entries = fixes
            .into_iter()
            .map(|fix| Entry {
                kind: EntryKind::Fix,
                rule_id: fix.rule_id,
                description: fix.description,
                severity: None,
                artifact: Some(fix.artifact),
                timestamp: fix.timestamp,
            })
            .collect();

        Self {
            run_id: run.id(),
            kind: run.kind(),
            status: run.state(),
            started_at: run.started_at(),
            generated_at: Utc::now(),
            backup_root: run.backup_root().map(Path::to_path_buf),
            summary,
            entries,
            recommendations: Vec::new(),
            notes: run.notes().to_vec(),
        }
    }

    pub fn from_diagnostic_run(run: &DiagnosticRun) -> Self {
        let findings = run.ledger().snapshot();
        let mut summary = Summary {
            total: findings.len(),
            by_severity: Severity::ALL.iter().map(|&s| (s, 0)).collect(),
            by_priority: Priority::ALL.iter().map(|&p| (p, 0)).collect(),
            ..Summary::default()
        };
        let mut entries = Vec::with_capacity(findings.len());
        let mut recommendations = Vec::new();
        for finding in findings {
            *summary.by_severity.entry(finding.issue.severity).or_default() += 1;
            if let Some(rec) = finding.recommendation {
                *summary.by_priority.entry(rec.priority).or_default() += 1;
                recommendations.push(RecommendationEntry {
                    rule_id: finding.rule_id.clone(),
                    description: rec.description,
                    priority: rec.priority,
                });
            }
            entries.push(Entry {
                kind: EntryKind::Issue,
                rule_id: finding.rule_id,
                description: finding.issue.description,
                severity: Some(finding.issue.severity),
                artifact: None,
                timestamp: finding.issue.timestamp,
            });
        }

        Self {
            run_id: run.id(),
            kind: run.kind(),
            status: run.state(),
            started_at: run.started_at(),
            generated_at: Utc::now(),
            backup_root: None,
            summary,
            entries,
            recommendations,
            notes: run.notes().to_vec(),
        }
    }

    pub fn render_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_markdown(&self) -> String {
        match self.kind {
            RunKind::Patch => self.patch_markdown(),
            RunKind::Diagnostic => self.diagnostic_markdown(),
        }
    }

    fn header(&self, out: &mut String, title: &str) {
        out.push_str(&format!("# {title}\n\n"));
        out.push_str(&format!(
            "- Generated: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("- Run: `{}`\n\n", self.run_id));
    }

    fn patch_markdown(&self) -> String {
        let mut out = String::new();
        self.header(&mut out, "Fixes Applied Report");

        let status = match self.status {
            RunState::Patched(common::Completion::Partial) => "PARTIAL (aborted by an error)",
            _ => "complete",
        };
        out.push_str("## Summary\n\n");
        out.push_str(&format!("- Status: {status}\n"));
        out.push_str(&format!("- Fixes applied: {}\n", self.summary.total));
        out.push_str(&format!(
            "- Artifacts changed: {}\n\n",
            self.summary.by_artifact.len()
        ));

        out.push_str("## Applied fixes\n\n");
        if self.entries.is_empty() {
            out.push_str("_None. Every rule was already satisfied or did not apply._\n");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} (`{}`)\n",
                i + 1,
                entry.description,
                entry.artifact.as_deref().unwrap_or("-")
            ));
        }
        self.notes_section(&mut out);

        if let Some(root) = &self.backup_root {
            out.push_str("\n## Backup\n\n");
            out.push_str(&format!("Original files are saved in: `{}`\n", root.display()));
        }

        out.push_str("\n## Emergency actions\n\n");
        out.push_str(&format!("- Stop the bot: `./{}`\n", Layout::STOP_SCRIPT));
        out.push_str(&format!("- Monitor: `./{}`\n", Layout::MONITOR_SCRIPT));
        out.push_str(&format!("- Roll back: `./{}`\n", Layout::ROLLBACK_SCRIPT));

        numbered(&mut out, "Next steps", NEXT_STEPS);
        out.push_str("\n## Log signals\n\n");
        for (signal, meaning) in LOG_SIGNALS {
            out.push_str(&format!("- `{signal}`: {meaning}\n"));
        }
        out.push_str("\nIf problems persist, run `medic diagnose` and check the application log.\n");
        out
    }

    fn diagnostic_markdown(&self) -> String {
        let mut out = String::new();
        self.header(&mut out, "Trading Diagnostics Report");

        out.push_str("## Summary\n\n");
        out.push_str(&format!("- Total issues: {}\n", self.summary.total));
        for (severity, count) in &self.summary.by_severity {
            out.push_str(&format!("- {severity}: {count}\n"));
        }

        out.push_str("\n## Issues\n\n");
        if self.entries.is_empty() {
            out.push_str("_None._\n");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            let level = entry.severity.map_or("-", Severity::as_str);
            out.push_str(&format!("{}. **{level}**: {}\n", i + 1, entry.description));
        }

        out.push_str("\n## Recommendations\n\n");
        if self.recommendations.is_empty() {
            out.push_str("_None._\n");
        }
        for (i, rec) in self.recommendations.iter().enumerate() {
            out.push_str(&format!("{}. **{}**: {}\n", i + 1, rec.priority, rec.description));
        }
        self.notes_section(&mut out);
        numbered(&mut out, "Immediate actions", IMMEDIATE_ACTIONS);
        numbered(&mut out, "Long-term improvements", LONG_TERM);
        out
    }

    fn notes_section(&self, out: &mut String) {
        if self.notes.is_empty() {
            return;
        }
        out.push_str("\n## Notes\n\n");
        for note in &self.notes {
            out.push_str(&format!("- `{}`: {}\n", note.artifact, note.message));
        }
    }

    /// Overwrites `json_path` and `md_path` with both renderings.
    pub fn write(&self, json_path: &Path, md_path: &Path) -> Result<(), ReportError> {
        write_file(json_path, &self.render_json()?)?;
        write_file(md_path, &self.render_markdown())?;
        info!(json = %json_path.display(), markdown = %md_path.display(), "report written");
        Ok(())
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    fs::write(path, content).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes the fix report and marks the run `Reported`.
pub fn publish_patch(run: &mut PatchRun, layout: &Layout) -> Result<Report, ReportError> {
    run.check_transition(RunState::Reported)?;
    let report = Report::from_patch_run(run);
    report.write(&layout.fix_report_json(), &layout.fix_report_md())?;
    run.advance(RunState::Reported)?;
    Ok(report)
}

/// Writes the diagnostic report and marks the run `Reported`.
pub fn publish_diagnostic(run: &mut DiagnosticRun, layout: &Layout) -> Result<Report, ReportError> {
    run.check_transition(RunState::Reported)?;
    let report = Report::from_diagnostic_run(run);
    report.write(
        &layout.diagnostic_report_json(),
        &layout.diagnostic_report_md(),
    )?;
    run.advance(RunState::Reported)?;
    Ok(report)
}
