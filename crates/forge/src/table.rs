//! Built-in patch table against premature position reversal.
//!
//! Order matters: rules run in table order, grouped by target artifact in
//! order of first appearance.

use crate::rule::{Anchor, Edit, Fallback, Insertion, PatchRule};
use common::layout::{CONFIG_ARTIFACT, COOLDOWN_SERVICE, PORTFOLIO_SERVICE, SCHEDULER_SERVICE};
use common::signature;
use regex::Regex;
use std::sync::OnceLock;

const COOLDOWN_BLOCK: &str = "
# Trading Cooldown Configuration
cooldown:
  min:
    minutes: 30      # minimum cooldown between trades
  same:
    minutes: 45      # cooldown for repeated same-direction operations
  reverse:
    minutes: 60      # cooldown for reverse operations (BUY->SELL)
  protection:
    enabled: true    # guard against frequent trades
    window-seconds: 300  # guard window in seconds
";

const SCHEDULER_BLOCK: &str = "
# Trading Scheduler Configuration
scheduler:
  quick-monitoring:
    interval-minutes: 10    # quick monitoring every 10 minutes (was 5)
  full-monitoring:
    interval-minutes: 30    # full monitoring every 30 minutes (was 15)
  safety:
    min-interval-seconds: 600  # minimum gap between operations
";

const COOLDOWN_DIAGNOSTICS: &str = r#"                // Cooldown diagnostics
                log.warn("COOLDOWN DIAGNOSTICS: FIGI={}, Action={}, LastTrade={}, TimeDiff={}min, Required={}min",
                    figi, action, lastTradeTime, minutesSinceLastTrade, requiredCooldown);
"#;

const OPERATION_WINDOW: &str = r#"
            // Extra safety: minimum time since the last identical operation
            String operationKey = figi + "_" + action;
            Long lastOperationTime = recentOperationsWindow.get(operationKey);
            long currentTime = System.currentTimeMillis();
            if (lastOperationTime != null && (currentTime - lastOperationTime) < 600000) { // 10 minutes
                log.warn("OPERATION WINDOW BLOCK: {} for {} blocked, less than 10 minutes since the last operation",
                    action, displayOf(figi));
                botLogService.addLogEntry(BotLogService.LogLevel.WARNING, BotLogService.LogCategory.RISK_MANAGEMENT,
                    "Frequent operation blocked", String.format("%s: operation %s blocked (< 10 min)",
                        displayOf(figi), action));
                return;
            }
            recentOperationsWindow.put(operationKey, currentTime);
"#;

const DECISION_LOGGING: &str = r#"
            // Trading decision diagnostics
            log.info("TRADING DECISION: FIGI={}, Action={}, Trend={}, Price={}, Portfolio={}",
                displayOf(figi), action, trend.getTrend(), trend.getCurrentPrice(),
                portfolioAnalysis.getTotalValue());
"#;

static RULES: OnceLock<Vec<PatchRule>> = OnceLock::new();

/// The built-in rule table, compiled once.
pub fn default_rules() -> &'static [PatchRule] {
    RULES.get_or_init(build)
}

fn replace(
    id: &'static str,
    target: &'static str,
    description: &'static str,
    pattern: &str,
    replacement: &'static str,
) -> PatchRule {
    PatchRule {
        id,
        target,
        description,
        edit: Edit::Replace {
            pattern: Regex::new(pattern).expect("BUG: built-in patch pattern does not compile"),
            replacement,
        },
    }
}

fn build() -> Vec<PatchRule> {
    vec![
        // --- application.yml ---
        replace(
            "config.mode-sandbox",
            CONFIG_ARTIFACT,
            "Switched default trading mode from production to sandbox",
            signature::PRODUCTION_MODE,
            "${1}sandbox",
        ),
        replace(
            "config.first-buy-pct",
            CONFIG_ARTIFACT,
            "Reduced first buy share from 2% to 0.5%",
            signature::FIRST_BUY_PCT,
            "${1}0.005",
        ),
        replace(
            "config.add-buy-pct",
            CONFIG_ARTIFACT,
            "Reduced add-buy share from 1% to 0.3%",
            signature::ADD_BUY_PCT,
            "${1}0.003",
        ),
        PatchRule {
            id: "config.cooldown-block",
            target: CONFIG_ARTIFACT,
            description: "Added cooldown configuration (30/45/60 minutes)",
            edit: Edit::Insert(Insertion {
                requires: &[],
                marker: "cooldown:",
                block: COOLDOWN_BLOCK,
                anchor: Anchor::None,
                fallback: Fallback::AppendAtEnd,
            }),
        },
        PatchRule {
            id: "config.scheduler-block",
            target: CONFIG_ARTIFACT,
            description: "Added scheduler configuration (10/30 minute intervals)",
            edit: Edit::Insert(Insertion {
                requires: &[],
                marker: "scheduler:",
                block: SCHEDULER_BLOCK,
                anchor: Anchor::None,
                fallback: Fallback::AppendAtEnd,
            }),
        },
        // --- TradingCooldownService.java ---
        replace(
            "cooldown.min-default",
            COOLDOWN_SERVICE,
            "Raised default minimum cooldown from 15 to 30 minutes",
            r#"getInt\("cooldown\.min\.minutes",\s*15\)"#,
            r#"getInt("cooldown.min.minutes", 30)"#,
        ),
        replace(
            "cooldown.same-default",
            COOLDOWN_SERVICE,
            "Raised default same-direction cooldown from 30 to 45 minutes",
            r#"getInt\("cooldown\.same\.minutes",\s*30\)"#,
            r#"getInt("cooldown.same.minutes", 45)"#,
        ),
        replace(
            "cooldown.reverse-default",
            COOLDOWN_SERVICE,
            "Raised default reverse cooldown from 45 to 60 minutes",
            r#"getInt\("cooldown\.reverse\.minutes",\s*45\)"#,
            r#"getInt("cooldown.reverse.minutes", 60)"#,
        ),
        PatchRule {
            id: "cooldown.diagnostic-logging",
            target: COOLDOWN_SERVICE,
            description: "Added cooldown diagnostic logging to overtrading blocks",
            edit: Edit::Insert(Insertion {
                requires: &["БЛОКИРОВКА OVERTRADING", "cooldownCheck.getReason()"],
                marker: "COOLDOWN DIAGNOSTICS",
                block: COOLDOWN_DIAGNOSTICS,
                anchor: Anchor::BeforeLine("botLogService.addLogEntry("),
                fallback: Fallback::BeforeClosingBrace,
            }),
        },
        // --- PortfolioManagementService.java ---
        PatchRule {
            id: "portfolio.operation-window",
            target: PORTFOLIO_SERVICE,
            description: "Added 10-minute guard between identical trading operations",
            edit: Edit::Insert(Insertion {
                requires: &["cooldownCheck.isBlocked()"],
                marker: "OPERATION WINDOW BLOCK",
                block: OPERATION_WINDOW,
                anchor: Anchor::AfterLine {
                    scope: Some("cooldownCheck.isBlocked()"),
                    needle: "log.info(\"✅ Cooldown проверка пройдена",
                },
                fallback: Fallback::BeforeClosingBrace,
            }),
        },
        PatchRule {
            id: "portfolio.decision-logging",
            target: PORTFOLIO_SERVICE,
            description: "Added diagnostic logging of final trading decisions",
            edit: Edit::Insert(Insertion {
                requires: &["ФИНАЛЬНОЕ РЕШЕНИЕ для"],
                marker: "TRADING DECISION:",
                block: DECISION_LOGGING,
                anchor: Anchor::AfterLine {
                    scope: None,
                    needle: "ФИНАЛЬНОЕ РЕШЕНИЕ для",
                },
                fallback: Fallback::BeforeClosingBrace,
            }),
        },
        // --- TradingBotScheduler.java ---
        replace(
            "scheduler.quick-interval",
            SCHEDULER_SERVICE,
            "Increased quick monitoring interval from 5 to 10 minutes",
            r"@Scheduled\(fixedRate\s*=\s*300000\)",
            "@Scheduled(fixedRate = 600000)",
        ),
        replace(
            "scheduler.full-interval",
            SCHEDULER_SERVICE,
            "Increased full monitoring interval from 15 to 30 minutes",
            r"@Scheduled\(fixedRate\s*=\s*900000\)",
            "@Scheduled(fixedRate = 1800000)",
        ),
        replace(
            "scheduler.quick-comment",
            SCHEDULER_SERVICE,
            "Updated quick monitoring comment to reflect overtrading protection",
            r"каждые 5 минут \(ОПТИМИЗАЦИЯ ДЛЯ СНИЖЕНИЯ КОМИССИЙ\)",
            "каждые 10 минут (ЗАЩИТА ОТ OVERTRADING)",
        ),
        replace(
            "scheduler.full-comment",
            SCHEDULER_SERVICE,
            "Updated full monitoring comment to reflect overtrading protection",
            r"каждые 15 минут \(ОПТИМИЗАЦИЯ ДЛЯ СНИЖЕНИЯ КОМИССИЙ\)",
            "каждые 30 минут (ЗАЩИТА ОТ OVERTRADING)",
        ),
    ]
}
