//! # The Forge: table-driven artifact patching
//!
//! Applies an ordered [`PatchRule`] table to the workspace, mutating artifacts
//! in place and recording one [`Fix`] per applied rule on the run's ledger.
//!
//! ## Workflow
//! 1. Refuse unless the run is `BackedUp`.
//! 2. Group rules by target artifact, in order of first appearance.
//! 3. Read each target once. A missing target is noted and its group skipped.
//! 4. Per rule: not matching → skip; already satisfied → skip; otherwise
//!    transform, check the result satisfies the rule, write, record.
//! 5. Any hard failure stops the walk. Fixes already written stay on disk and
//!    the run ends `Patched(Partial)`.

pub mod rule;
pub mod table;

pub use rule::{Anchor, Edit, Fallback, Insertion, PatchRule, Placement, Transformed};
pub use table::default_rules;

use common::{ArtifactError, Completion, Fix, PatchRun, RunError, RunState, Workspace};
use tracing::{debug, error, info, warn};

/// Errors from patch operations. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("refusing to patch before a backup exists (run is {0:?})")]
    NotBackedUp(RunState),
    #[error("write failed: {0}")]
    WriteFailure(#[source] ArtifactError),
    #[error("cannot read artifact for patching: {0}")]
    UnreadableArtifact(#[source] ArtifactError),
    /// The transform produced content its own rule still wants to change.
    #[error("rule {rule} is not idempotent on this artifact")]
    NotIdempotent { rule: &'static str },
    #[error(transparent)]
    Run(#[from] RunError),
}

/// The patch engine over a fixed rule table.
pub struct Forge<'r> {
    rules: &'r [PatchRule],
}

impl Forge<'static> {
    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }
}

impl<'r> Forge<'r> {
    pub fn new(rules: &'r [PatchRule]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'r [PatchRule] {
        self.rules
    }

    /// Applies the table once. Returns the number of fixes recorded.
    ///
    /// # Errors
    /// `NotBackedUp` leaves the run untouched. Every other error moves the
    /// run to `Patched(Partial)` before it is returned.
    pub fn apply(&self, run: &mut PatchRun, workspace: &Workspace) -> Result<usize, ForgeError> {
        if run.state() != RunState::BackedUp {
            return Err(ForgeError::NotBackedUp(run.state()));
        }
        info!(rules = self.rules.len(), "applying patch table");

        match self.apply_groups(run, workspace) {
            Ok(applied) => {
                run.advance(RunState::Patched(Completion::Complete))?;
                info!(applied, "patch run complete");
                Ok(applied)
            }
            Err(e) => {
                run.advance(RunState::Patched(Completion::Partial))?;
                error!(
                    error = %e,
                    committed = run.ledger().len(),
                    "patch run aborted, fixes already written are kept"
                );
                Err(e)
            }
        }
    }

    fn apply_groups(&self, run: &mut PatchRun, workspace: &Workspace) -> Result<usize, ForgeError> {
        let mut applied = 0usize;
        for (target, rules) in self.groups() {
            let mut content = match workspace.read(target) {
                Ok(content) => content,
                Err(ArtifactError::Missing(_)) => {
                    warn!(artifact = target, "artifact not found, skipping its rules");
                    run.note(target, "artifact not found, patch rules skipped");
                    continue;
                }
                Err(e) => return Err(ForgeError::UnreadableArtifact(e)),
            };

            for rule in rules {
                if !rule.matches(&content) {
                    debug!(rule = rule.id, "no match");
                    continue;
                }
                if rule.is_satisfied(&content) {
                    debug!(rule = rule.id, "already satisfied");
                    continue;
                }

                let Transformed { content: next, placement } = rule.transform(&content);
                if !rule.is_satisfied(&next) {
                    return Err(ForgeError::NotIdempotent { rule: rule.id });
                }
                workspace
                    .write(target, &next)
                    .map_err(ForgeError::WriteFailure)?;
                content = next;

                let description = match placement {
                    Some(p) if p != Placement::Anchored => {
                        warn!(rule = rule.id, placement = p.describe(), "insertion anchor missing");
                        format!("{} ({})", rule.description, p.describe())
                    }
                    _ => rule.description.to_string(),
                };
                info!(rule = rule.id, artifact = target, "{description}");
                run.record(Fix::new(rule.id, target, description))?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Rules grouped by target, both levels in table order.
    fn groups(&self) -> Vec<(&'static str, Vec<&'r PatchRule>)> {
        let mut groups: Vec<(&'static str, Vec<&'r PatchRule>)> = Vec::new();
        for rule in self.rules {
            match groups.iter_mut().find(|(t, _)| *t == rule.target) {
                Some((_, members)) => members.push(rule),
                None => groups.push((rule.target, vec![rule])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::layout::{CONFIG_ARTIFACT, COOLDOWN_SERVICE, PORTFOLIO_SERVICE, SCHEDULER_SERVICE};
    use std::fs;
    use std::path::Path;

    const SCENARIO_A: &str = "\
trading:
  default-mode: production
  first-buy-pct: 0.02
  add-buy-pct: 0.01
";

    const COOLDOWN_JAVA: &str = r#"public class TradingCooldownService {
    public CooldownCheck check(String figi, String action) {
        int min = settings.getInt("cooldown.min.minutes", 15);
        int same = settings.getInt("cooldown.same.minutes", 30);
        int reverse = settings.getInt("cooldown.reverse.minutes", 45);
        if (cooldownCheck.isBlocked()) {
            log.warn("БЛОКИРОВКА OVERTRADING: {}", cooldownCheck.getReason());
            botLogService.addLogEntry(LogLevel.WARNING, "blocked");
        }
        return cooldownCheck;
    }
}
"#;

    const PORTFOLIO_JAVA: &str = r#"public class PortfolioManagementService {
    public void execute(String figi, String action) {
        if (cooldownCheck.isBlocked()) {
            return;
        }
        log.info("✅ Cooldown проверка пройдена для {}", figi);
        log.info("ФИНАЛЬНОЕ РЕШЕНИЕ для {}: {}", figi, action);
        placeOrder(figi, action);
    }
}
"#;

    const SCHEDULER_JAVA: &str = r#"public class TradingBotScheduler {
    // Быстрый мониторинг каждые 5 минут (ОПТИМИЗАЦИЯ ДЛЯ СНИЖЕНИЯ КОМИССИЙ)
    @Scheduled(fixedRate = 300000)
    public void quickMonitoring() {}

    // Полный мониторинг каждые 15 минут (ОПТИМИЗАЦИЯ ДЛЯ СНИЖЕНИЯ КОМИССИЙ)
    @Scheduled(fixedRate = 900000)
    public void fullMonitoring() {}
}
"#;

    fn workspace_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = tmp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let ws = Workspace::open(tmp.path()).unwrap();
        (tmp, ws)
    }

    fn backed_up_run(root: &Path) -> PatchRun {
        let mut run = PatchRun::patch();
        run.record_backup(&root.join("backup_before_fix")).unwrap();
        run
    }

    fn full_fixture() -> (tempfile::TempDir, Workspace) {
        workspace_with(&[
            (CONFIG_ARTIFACT, SCENARIO_A),
            (COOLDOWN_SERVICE, COOLDOWN_JAVA),
            (PORTFOLIO_SERVICE, PORTFOLIO_JAVA),
            (SCHEDULER_SERVICE, SCHEDULER_JAVA),
        ])
    }

    #[test]
    fn test_scenario_a_config_fixes() {
        let (tmp, ws) = workspace_with(&[(CONFIG_ARTIFACT, SCENARIO_A)]);
        let mut run = backed_up_run(tmp.path());

        let applied = Forge::with_default_rules().apply(&mut run, &ws).unwrap();

        assert_eq!(applied, 5);
        assert_eq!(run.ledger().len(), 5);
        assert_eq!(run.state(), RunState::Patched(Completion::Complete));
        let patched = ws.read(CONFIG_ARTIFACT).unwrap();
        assert!(patched.contains("default-mode: sandbox"));
        assert!(patched.contains("first-buy-pct: 0.005"));
        assert!(patched.contains("add-buy-pct: 0.003"));
        assert!(patched.contains("cooldown:"));
        assert!(patched.contains("minutes: 30"));
        assert!(patched.contains("minutes: 45"));
        assert!(patched.contains("minutes: 60"));
        assert!(patched.contains("scheduler:"));
        assert!(!patched.contains("production"));
    }

    #[test]
    fn test_scenario_b_sandbox_already_set() {
        let sandbox = SCENARIO_A.replace("production", "sandbox");
        let (tmp, ws) = workspace_with(&[(CONFIG_ARTIFACT, &sandbox)]);
        let mut run = backed_up_run(tmp.path());

        Forge::with_default_rules().apply(&mut run, &ws).unwrap();

        assert!(run.ledger().iter().all(|f| f.rule_id != "config.mode-sandbox"));
        assert_eq!(run.ledger().len(), 4);
    }

    #[test]
    fn test_second_run_records_nothing() {
        let (tmp, ws) = full_fixture();
        let forge = Forge::with_default_rules();

        let mut first = backed_up_run(tmp.path());
        assert_eq!(forge.apply(&mut first, &ws).unwrap(), 15);
        let after_first = ws.read(PORTFOLIO_SERVICE).unwrap();

        let mut second = backed_up_run(tmp.path());
        assert_eq!(forge.apply(&mut second, &ws).unwrap(), 0);
        assert!(second.ledger().is_empty());
        assert_eq!(ws.read(PORTFOLIO_SERVICE).unwrap(), after_first);
    }

    #[test]
    fn test_anchored_insertions_land_after_anchor() {
        let (tmp, ws) = full_fixture();
        let mut run = backed_up_run(tmp.path());
        Forge::with_default_rules().apply(&mut run, &ws).unwrap();

        let portfolio = ws.read(PORTFOLIO_SERVICE).unwrap();
        let passed = portfolio.find("Cooldown проверка пройдена").unwrap();
        let window = portfolio.find("OPERATION WINDOW BLOCK").unwrap();
        let decision = portfolio.find("ФИНАЛЬНОЕ РЕШЕНИЕ для").unwrap();
        let logged = portfolio.find("TRADING DECISION:").unwrap();
        assert!(passed < window && window < decision && decision < logged);

        let cooldown = ws.read(COOLDOWN_SERVICE).unwrap();
        assert!(cooldown.find("COOLDOWN DIAGNOSTICS").unwrap() < cooldown.find("botLogService").unwrap());
        assert!(cooldown.contains(r#"getInt("cooldown.reverse.minutes", 60)"#));

        let scheduler = ws.read(SCHEDULER_SERVICE).unwrap();
        assert!(scheduler.contains("fixedRate = 600000"));
        assert!(scheduler.contains("fixedRate = 1800000"));
        assert!(scheduler.contains("каждые 30 минут (ЗАЩИТА ОТ OVERTRADING)"));

        // Every anchor was present, so no fallback suffix.
        assert!(run.ledger().iter().all(|f| !f.description.contains("anchor not found")));
    }

    #[test]
    fn test_missing_anchor_fallback_is_recorded() {
        let no_anchor = r#"public class TradingCooldownService {
    void block() {
        log.warn("БЛОКИРОВКА OVERTRADING: {}", cooldownCheck.getReason());
    }
}
"#;
        let (tmp, ws) = workspace_with(&[(COOLDOWN_SERVICE, no_anchor)]);
        let mut run = backed_up_run(tmp.path());
        Forge::with_default_rules().apply(&mut run, &ws).unwrap();

        let fix = run
            .ledger()
            .iter()
            .find(|f| f.rule_id == "cooldown.diagnostic-logging")
            .unwrap();
        assert!(fix.description.contains("inserted before closing brace"));
        let patched = ws.read(COOLDOWN_SERVICE).unwrap();
        assert!(patched.trim_end().ends_with('}'));
        assert!(patched.contains("COOLDOWN DIAGNOSTICS"));
    }

    #[test]
    fn test_missing_targets_are_noted() {
        let (tmp, ws) = workspace_with(&[(CONFIG_ARTIFACT, SCENARIO_A)]);
        let mut run = backed_up_run(tmp.path());
        Forge::with_default_rules().apply(&mut run, &ws).unwrap();

        let noted: Vec<&str> = run.notes().iter().map(|n| n.artifact.as_str()).collect();
        assert_eq!(noted, [COOLDOWN_SERVICE, PORTFOLIO_SERVICE, SCHEDULER_SERVICE]);
    }

    #[test]
    fn test_refuses_without_backup() {
        let (_tmp, ws) = workspace_with(&[(CONFIG_ARTIFACT, SCENARIO_A)]);
        let mut run = PatchRun::patch();

        let err = Forge::with_default_rules().apply(&mut run, &ws).unwrap_err();

        assert!(matches!(err, ForgeError::NotBackedUp(RunState::Created)));
        assert_eq!(run.state(), RunState::Created);
        assert_eq!(ws.read(CONFIG_ARTIFACT).unwrap(), SCENARIO_A);
    }

    #[test]
    fn test_hard_failure_keeps_committed_fixes() {
        let (tmp, ws) = workspace_with(&[(CONFIG_ARTIFACT, SCENARIO_A)]);
        // Present but unreadable as a file.
        fs::create_dir_all(ws.resolve(COOLDOWN_SERVICE)).unwrap();
        let mut run = backed_up_run(tmp.path());

        let err = Forge::with_default_rules().apply(&mut run, &ws).unwrap_err();

        assert!(matches!(err, ForgeError::UnreadableArtifact(_)));
        assert_eq!(run.state(), RunState::Patched(Completion::Partial));
        assert_eq!(run.ledger().len(), 5);
        assert!(ws.read(CONFIG_ARTIFACT).unwrap().contains("default-mode: sandbox"));
    }

    #[test]
    fn test_non_utf8_target_is_hard() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_ARTIFACT);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xff, 0xfe, b'\n']).unwrap();
        let ws = Workspace::open(tmp.path()).unwrap();
        let mut run = backed_up_run(tmp.path());

        let err = Forge::with_default_rules().apply(&mut run, &ws).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::UnreadableArtifact(ArtifactError::Malformed { .. })
        ));
        assert!(run.ledger().is_empty());
    }
}
