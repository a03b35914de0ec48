//! Built-in diagnostic table for premature-reversal risk indicators.

use crate::rule::{Advice, Classifier, DiagnosticRule, Extractor, Source};
use crate::tree::Probe;
use aho_corasick::AhoCorasick;
use common::layout::{
    CONFIG_ARTIFACT, COOLDOWN_SERVICE, PORTFOLIO_SERVICE, RISK_SERVICE, SCHEDULER_SERVICE,
};
use common::{signature, Priority, Severity};
use regex::{Regex, RegexSet};
use std::sync::OnceLock;

static RULES: OnceLock<Vec<DiagnosticRule>> = OnceLock::new();

/// Key shapes a cooldown duration is configured under, nested or flat.
const COOLDOWN_MINUTE_KEYS: &[&str] = &[
    "cooldown.*.minutes",
    "cooldown.minutes",
    "cooldown-minutes",
    "cooldown_minutes",
];

/// The built-in rule table, compiled once.
pub fn default_rules() -> &'static [DiagnosticRule] {
    RULES.get_or_init(build)
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("BUG: built-in diagnostic pattern does not compile")
}

fn artifact(path: &'static str, extractor: Extractor) -> Source {
    Source::Artifact { path, extractor }
}

fn advice(template: &'static str, priority: Priority) -> Option<Advice> {
    Some(Advice { template, priority })
}

fn build() -> Vec<DiagnosticRule> {
    vec![
        // --- application.yml ---
        DiagnosticRule {
            id: "config.production-mode",
            source: artifact(
                CONFIG_ARTIFACT,
                Extractor::Matches(re(signature::PRODUCTION_MODE)),
            ),
            classifier: Classifier::Always(Severity::High),
            issue: "Bot runs in PRODUCTION mode: high risk",
            recommendation: advice("Switch default-mode to sandbox for testing", Priority::High),
        },
        DiagnosticRule {
            id: "config.cooldown-minutes",
            source: artifact(CONFIG_ARTIFACT, Extractor::YamlNumbers(COOLDOWN_MINUTE_KEYS)),
            classifier: Classifier::Below {
                threshold: 30.0,
                severity: Severity::Medium,
            },
            issue: "Cooldown too short: {value} minutes",
            recommendation: advice("Raise cooldown to at least 30-45 minutes", Priority::High),
        },
        DiagnosticRule {
            id: "config.first-buy-pct",
            source: artifact(
                CONFIG_ARTIFACT,
                Extractor::Matches(re(signature::FIRST_BUY_PCT)),
            ),
            classifier: Classifier::Always(Severity::Medium),
            issue: "High first buy share (2%)",
            recommendation: advice("Reduce first-buy-pct to 0.005-0.01", Priority::Medium),
        },
        // --- TradingCooldownService.java ---
        DiagnosticRule {
            id: "cooldown.default-minutes",
            source: artifact(
                COOLDOWN_SERVICE,
                Extractor::Numbers(re(r#"getInt\("cooldown\.\w+\.minutes",\s*(\d+)\)"#)),
            ),
            classifier: Classifier::Below {
                threshold: 30.0,
                severity: Severity::Medium,
            },
            issue: "Default cooldown too short: {value} minutes",
            recommendation: None,
        },
        DiagnosticRule {
            id: "cooldown.reverse-action",
            source: artifact(COOLDOWN_SERVICE, Extractor::Absent("isReverseAction")),
            classifier: Classifier::Always(Severity::Medium),
            issue: "No handling of reverse actions in cooldown logic",
            recommendation: None,
        },
        // --- PortfolioManagementService.java ---
        DiagnosticRule {
            id: "portfolio.cooldown-check",
            source: artifact(PORTFOLIO_SERVICE, Extractor::Absent("cooldownCheck.isBlocked()")),
            classifier: Classifier::Always(Severity::High),
            issue: "Trading strategy does not check cooldown",
            recommendation: advice(
                "Add a cooldown check before executing trading operations",
                Priority::High,
            ),
        },
        DiagnosticRule {
            id: "portfolio.buy-sell-branches",
            source: artifact(
                PORTFOLIO_SERVICE,
                Extractor::Count(re(r#"if.*"(BUY|SELL)".*equals.*action"#)),
            ),
            classifier: Classifier::Below {
                threshold: 2.0,
                severity: Severity::Medium,
            },
            issue: "Incomplete BUY/SELL handling: {value} branch(es) found",
            recommendation: None,
        },
        DiagnosticRule {
            id: "portfolio.immediate-operations",
            source: artifact(
                PORTFOLIO_SERVICE,
                Extractor::AnyKeyword(
                    AhoCorasick::new(["immediate", "немедленно"])
                        .expect("BUG: keyword automaton does not build"),
                ),
            ),
            classifier: Classifier::Always(Severity::High),
            issue: "Immediate-operation logic found: likely cause of premature reversal",
            recommendation: advice(
                "Review immediate-operation logic and add extra checks",
                Priority::High,
            ),
        },
        // --- TradingBotScheduler.java ---
        DiagnosticRule {
            id: "scheduler.fixed-rate",
            source: artifact(
                SCHEDULER_SERVICE,
                Extractor::Numbers(re(r"fixedRate\s*=\s*(\d+)")),
            ),
            classifier: Classifier::Below {
                threshold: 300_000.0,
                severity: Severity::Medium,
            },
            issue: "Scheduler runs too often: fixedRate {value} ms",
            recommendation: advice(
                "Raise scheduler intervals to at least 5-10 minutes",
                Priority::Medium,
            ),
        },
        // --- RiskManagementService.java ---
        DiagnosticRule {
            id: "risk.max-position-size",
            source: artifact(
                RISK_SERVICE,
                Extractor::FirstNumber(re(r#"MAX_POSITION_SIZE.*new BigDecimal\("([0-9.]+)"\)"#)),
            ),
            classifier: Classifier::Above {
                threshold: 0.1,
                severity: Severity::Medium,
            },
            issue: "High position size limit: {value} of portfolio",
            recommendation: advice("Reduce MAX_POSITION_SIZE to 5% or less", Priority::Medium),
        },
        // --- workspace ---
        DiagnosticRule {
            id: "database.sql-files",
            source: Source::Tree(Probe::NoFileWithExtension("sql")),
            classifier: Classifier::Always(Severity::Medium),
            issue: "No SQL files found",
            recommendation: None,
        },
        DiagnosticRule {
            id: "database.init-script",
            source: Source::Tree(Probe::FileAbsent("init.sql")),
            classifier: Classifier::Always(Severity::Medium),
            issue: "Database init script init.sql not found",
            recommendation: None,
        },
        DiagnosticRule {
            id: "logging.trading-operations",
            source: Source::Tree(Probe::PatternAbsent {
                extension: "java",
                patterns: RegexSet::new([
                    r"(?i)log.*buy.*order",
                    r"(?i)log.*sell.*order",
                    r"(?i)log.*cooldown",
                ])
                .expect("BUG: logging patterns do not compile"),
            }),
            classifier: Classifier::Always(Severity::Medium),
            issue: "Insufficient logging of trading operations",
            recommendation: advice("Add detailed logging of every trading decision", Priority::Medium),
        },
    ]
}
