//! Fixed, compiled-in layout of the maintained service workspace.
//!
//! Nothing here is discovered at runtime: the artifact set, backup root,
//! report names and script names are all well-known relative paths.

use std::path::{Path, PathBuf};

/// Structured key-value configuration of the trading service.
pub const CONFIG_ARTIFACT: &str = "src/main/resources/application.yml";
pub const COOLDOWN_SERVICE: &str = "src/main/java/ru/perminov/service/TradingCooldownService.java";
pub const PORTFOLIO_SERVICE: &str =
    "src/main/java/ru/perminov/service/PortfolioManagementService.java";
pub const SCHEDULER_SERVICE: &str = "src/main/java/ru/perminov/service/TradingBotScheduler.java";
pub const RISK_SERVICE: &str = "src/main/java/ru/perminov/service/RiskManagementService.java";

/// Every artifact the backup manager snapshots, in snapshot order.
pub const TRACKED_ARTIFACTS: &[&str] = &[
    CONFIG_ARTIFACT,
    COOLDOWN_SERVICE,
    PORTFOLIO_SERVICE,
    SCHEDULER_SERVICE,
    RISK_SERVICE,
];

/// Well-known output locations, all relative to the workspace root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub const BACKUP_DIR: &'static str = "backup_before_fix";
    pub const FIX_REPORT_JSON: &'static str = "fixes_applied_report.json";
    pub const FIX_REPORT_MD: &'static str = "FIXES_APPLIED_REPORT.md";
    pub const DIAGNOSTIC_REPORT_JSON: &'static str = "trading_diagnostics_report.json";
    pub const DIAGNOSTIC_REPORT_MD: &'static str = "TRADING_DIAGNOSTICS_REPORT.md";
    pub const STOP_SCRIPT: &'static str = "emergency_stop.sh";
    pub const MONITOR_SCRIPT: &'static str = "monitor_bot.sh";
    pub const ROLLBACK_SCRIPT: &'static str = "rollback_fixes.sh";
    pub const LOCK_FILE: &'static str = "TRADING_STOPPED.lock";
    pub const STOP_LOG: &'static str = "trading_stop.log";
    pub const APPLICATION_LOG: &'static str = "logs/application.log";
    /// `pgrep -f` expression matching the service JVM.
    pub const PROCESS_PATTERN: &'static str = "java.*Main";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join(Self::BACKUP_DIR)
    }

    pub fn fix_report_json(&self) -> PathBuf {
        self.root.join(Self::FIX_REPORT_JSON)
    }

    pub fn fix_report_md(&self) -> PathBuf {
        self.root.join(Self::FIX_REPORT_MD)
    }

    pub fn diagnostic_report_json(&self) -> PathBuf {
        self.root.join(Self::DIAGNOSTIC_REPORT_JSON)
    }

    pub fn diagnostic_report_md(&self) -> PathBuf {
        self.root.join(Self::DIAGNOSTIC_REPORT_MD)
    }

    pub fn stop_script(&self) -> PathBuf {
        self.root.join(Self::STOP_SCRIPT)
    }

    pub fn monitor_script(&self) -> PathBuf {
        self.root.join(Self::MONITOR_SCRIPT)
    }

    pub fn rollback_script(&self) -> PathBuf {
        self.root.join(Self::ROLLBACK_SCRIPT)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(Self::LOCK_FILE)
    }

    pub fn stop_log(&self) -> PathBuf {
        self.root.join(Self::STOP_LOG)
    }

    pub fn application_log(&self) -> PathBuf {
        self.root.join(Self::APPLICATION_LOG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_hang_off_root() {
        let layout = Layout::new("/srv/bot");
        assert_eq!(layout.backup_root(), PathBuf::from("/srv/bot/backup_before_fix"));
        assert_eq!(
            layout.application_log(),
            PathBuf::from("/srv/bot/logs/application.log")
        );
        assert_eq!(layout.rollback_script(), PathBuf::from("/srv/bot/rollback_fixes.sh"));
    }

    #[test]
    fn test_tracked_artifacts_unique() {
        let mut seen = std::collections::HashSet::new();
        for path in TRACKED_ARTIFACTS {
            assert!(seen.insert(*path), "duplicate tracked artifact {path}");
        }
        assert_eq!(TRACKED_ARTIFACTS[0], CONFIG_ARTIFACT);
    }
}
