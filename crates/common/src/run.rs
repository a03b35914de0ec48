//! Explicit run context threaded through every engine call.
//!
//! Each run owns its ledger, its soft-failure notes and its lifecycle state,
//! so two runs in the same process (tests, repeated CLI calls) never share
//! mutable state.
//!
//! ## Lifecycle
//! - Patch run: `Created → BackedUp → Patched(Partial | Complete) → Reported`
//! - Diagnostic run: `Created → Scanned → Reported`
//!
//! Rolling back happens outside the engine by executing the emitted script and
//! is never observed here.

use crate::ledger::{Finding, Fix, Ledger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid run transition for {kind:?} run: {from:?} -> {to:?}")]
    InvalidTransition {
        kind: RunKind,
        from: RunState,
        to: RunState,
    },
    #[error("cannot record a fix on a patch run in state {0:?}; the backup comes first")]
    FixBeforeBackup(RunState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Patch,
    Diagnostic,
}

/// Whether the patch engine walked the whole rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Aborted by a hard failure; fixes written before the abort stay on disk.
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    BackedUp,
    Patched(Completion),
    Scanned,
    Reported,
}

/// A soft failure that did not halt the run but must not be dropped silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub artifact: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Run<T> {
    id: Uuid,
    kind: RunKind,
    started_at: DateTime<Utc>,
    state: RunState,
    ledger: Ledger<T>,
    notes: Vec<Note>,
    backup_root: Option<PathBuf>,
}

pub type PatchRun = Run<Fix>;
pub type DiagnosticRun = Run<Finding>;

impl Run<Fix> {
    pub fn patch() -> Self {
        Self::new(RunKind::Patch)
    }

    /// Marks the backup as taken. Any fix requires this state first.
    pub fn record_backup(&mut self, backup_root: &Path) -> Result<(), RunError> {
        self.advance(RunState::BackedUp)?;
        self.backup_root = Some(backup_root.to_path_buf());
        Ok(())
    }

    /// Appends a fix. Only a backed-up run that is still patching accepts one.
    pub fn record(&mut self, fix: Fix) -> Result<(), RunError> {
        if self.state != RunState::BackedUp {
            return Err(RunError::FixBeforeBackup(self.state));
        }
        self.ledger.push(fix);
        Ok(())
    }
}

impl Run<Finding> {
    pub fn diagnostic() -> Self {
        Self::new(RunKind::Diagnostic)
    }

    pub fn record(&mut self, finding: Finding) {
        self.ledger.push(finding);
    }
}

impl<T> Run<T> {
    fn new(kind: RunKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            state: RunState::Created,
            ledger: Ledger::new(),
            notes: Vec::new(),
            backup_root: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger<T> {
        &self.ledger
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn backup_root(&self) -> Option<&Path> {
        self.backup_root.as_deref()
    }

    pub fn note(&mut self, artifact: impl Into<String>, message: impl Into<String>) {
        self.notes.push(Note {
            artifact: artifact.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Moves to `next` if the lifecycle allows it for this run kind.
    pub fn advance(&mut self, next: RunState) -> Result<(), RunError> {
        self.check_transition(next)?;
        self.state = next;
        Ok(())
    }

    /// Checks `next` against the lifecycle without moving.
    pub fn check_transition(&self, next: RunState) -> Result<(), RunError> {
        use RunState::*;
        let allowed = match (self.kind, self.state, next) {
            (RunKind::Patch, Created, BackedUp) => true,
            (RunKind::Patch, BackedUp, Patched(_)) => true,
            (RunKind::Patch, Patched(_), Reported) => true,
            (RunKind::Diagnostic, Created, Scanned) => true,
            (RunKind::Diagnostic, Scanned, Reported) => true,
            _ => false,
        };
        if !allowed {
            return Err(RunError::InvalidTransition {
                kind: self.kind,
                from: self.state,
                to: next,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_lifecycle() {
        let mut run = PatchRun::patch();
        assert_eq!(run.state(), RunState::Created);
        run.record_backup(Path::new("/tmp/bak")).unwrap();
        assert_eq!(run.backup_root(), Some(Path::new("/tmp/bak")));
        run.advance(RunState::Patched(Completion::Complete)).unwrap();
        run.advance(RunState::Reported).unwrap();
        assert_eq!(run.state(), RunState::Reported);
    }

    #[test]
    fn test_patch_without_backup_rejected() {
        let mut run = PatchRun::patch();
        let err = run
            .advance(RunState::Patched(Completion::Complete))
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::InvalidTransition {
                from: RunState::Created,
                ..
            }
        ));
    }

    #[test]
    fn test_fix_requires_backed_up_run() {
        let mut run = PatchRun::patch();
        let err = run.record(Fix::new("r", "x", "d")).unwrap_err();
        assert!(matches!(err, RunError::FixBeforeBackup(RunState::Created)));

        run.record_backup(Path::new("/tmp/bak")).unwrap();
        run.record(Fix::new("r", "x", "d")).unwrap();
        run.advance(RunState::Patched(Completion::Complete)).unwrap();
        assert!(run.record(Fix::new("late", "x", "d")).is_err());
        assert_eq!(run.ledger().len(), 1);
    }

    #[test]
    fn test_diagnostic_cannot_back_up() {
        let mut run = DiagnosticRun::diagnostic();
        assert!(run.advance(RunState::BackedUp).is_err());
        run.advance(RunState::Scanned).unwrap();
        run.advance(RunState::Reported).unwrap();
    }

    #[test]
    fn test_runs_are_isolated() {
        let mut a = PatchRun::patch();
        let b = PatchRun::patch();
        a.record_backup(Path::new("/tmp/bak")).unwrap();
        a.record(Fix::new("r", "x", "d")).unwrap();
        a.note("y.java", "artifact not found");
        assert_eq!(a.ledger().len(), 1);
        assert!(b.ledger().is_empty());
        assert!(b.notes().is_empty());
        assert_ne!(a.id(), b.id());
    }
}
