use anatomist::Anatomist;
use anyhow::Context;
use clap::{Parser, Subcommand};
use common::layout::TRACKED_ARTIFACTS;
use common::{DiagnosticRun, Layout, PatchRun, Severity, Workspace};
use forge::Forge;
use lazarus::{ScriptContext, ScriptKind};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use vault::Vault;

#[derive(Parser)]
#[command(name = "medic", version)]
#[command(
    about = "Backs up, patches and diagnoses a trading service against premature position reversal",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the tracked artifacts, apply the patch table, write reports and scripts.
    Fix {
        /// Service workspace root.
        #[arg(env = "MEDIC_WORKSPACE", default_value = ".")]
        path: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Read-only scan of the tracked artifacts against the diagnostic table.
    Diagnose {
        /// Service workspace root.
        #[arg(env = "MEDIC_WORKSPACE", default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("ignoring .env: {e}"),
    }

    let cli = Cli::parse();
    match &cli.command {
        Commands::Fix { path, yes } => cmd_fix(path, *yes)?,
        Commands::Diagnose { path } => cmd_diagnose(path)?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// fix
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FixOutcome {
    applied: usize,
    saved: usize,
    report: scribe::Report,
    scripts: Vec<PathBuf>,
}

fn cmd_fix(path: &Path, yes: bool) -> anyhow::Result<()> {
    let workspace = open_workspace(path)?;

    println!("WARNING: this will modify the trading bot's configuration and sources.");
    println!(
        "A backup is taken first, into {}/",
        Layout::new(workspace.root()).backup_root().display()
    );
    if !yes && !confirm("\nContinue? (y/N): ")? {
        println!("Cancelled. Nothing was changed.");
        return Ok(());
    }

    let outcome = run_fix(&workspace)?;

    println!("+------------------------------------------+");
    println!("| MEDIC FIX                                |");
    println!("+------------------------------------------+");
    println!("| Artifacts saved : {:>22} |", outcome.saved);
    println!("| Fixes applied   : {:>22} |", outcome.applied);
    println!("| Notes           : {:>22} |", outcome.report.notes.len());
    println!("+------------------------------------------+");
    if outcome.report.entries.is_empty() {
        println!("Nothing to fix: every rule was already satisfied.");
    }
    for (i, entry) in outcome.report.entries.iter().enumerate() {
        println!("  {}. {}", i + 1, entry.description);
    }
    for script in &outcome.scripts {
        println!("Script: {}", script.display());
    }

    println!("\nNext steps:");
    println!("  1. Restart the trading bot");
    println!("  2. Watch the logs with ./{}", Layout::MONITOR_SCRIPT);
    println!("  3. In trouble, stop it with ./{}", Layout::STOP_SCRIPT);
    Ok(())
}

/// Backup, patch, scripts, report. Scripts and the report are attempted even
/// when patching aborts, and any failure after the backup names the way back.
fn run_fix(workspace: &Workspace) -> anyhow::Result<FixOutcome> {
    let layout = Layout::new(workspace.root());
    let mut run = PatchRun::patch();
    info!(run = %run.id(), workspace = %workspace.root().display(), "starting fix run");

    let backup = Vault::new(layout.backup_root())
        .snapshot(workspace, TRACKED_ARTIFACTS)
        .context("backup failed, nothing was changed")?;
    run.record_backup(&backup.root)?;

    let patched = Forge::with_default_rules().apply(&mut run, workspace);

    let context = ScriptContext::for_patch_run(layout.clone(), &run);
    let scripts = lazarus::write_scripts(&ScriptKind::ALL, &context);
    let report = scribe::publish_patch(&mut run, &layout);

    let (patch_err, script_err, report_err) = match (patched, scripts, report) {
        (Ok(applied), Ok(scripts), Ok(report)) => {
            return Ok(FixOutcome {
                applied,
                saved: backup.manifest.len(),
                report,
                scripts,
            })
        }
        (patched, scripts, report) => (patched.err(), scripts.err(), report.err()),
    };

    let restore = if script_err.is_none() {
        format!("run ./{} to restore the backup", Layout::ROLLBACK_SCRIPT)
    } else {
        format!(
            "copy {}/files/ back over the workspace to restore the backup",
            backup.root.display()
        )
    };
    let patch_failed = patch_err.is_some();
    let mut failures = [
        patch_err.map(|e| anyhow::Error::new(e).context("patch run aborted")),
        script_err.map(|e| anyhow::Error::new(e).context("failed to write operator scripts")),
        report_err.map(|e| anyhow::Error::new(e).context("failed to write fix report")),
    ]
    .into_iter()
    .flatten();

    let mut err = failures
        .next()
        .unwrap_or_else(|| anyhow::anyhow!("fix run failed"));
    for extra in failures {
        error!("{extra:#}");
        err = err.context(format!("additionally {extra:#}"));
    }

    let committed = run.ledger().len();
    if patch_failed || committed > 0 {
        error!(committed, "fix run failed; {restore}");
        err = err.context(format!("{committed} fix(es) already applied; {restore}"));
    }
    Err(err)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(is_affirmative(&line))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// ---------------------------------------------------------------------------
// diagnose
// ---------------------------------------------------------------------------

fn cmd_diagnose(path: &Path) -> anyhow::Result<()> {
    let workspace = open_workspace(path)?;
    let report = run_diagnose(&workspace)?;

    let count = |s: Severity| report.summary.by_severity.get(&s).copied().unwrap_or(0);
    println!("+------------------------------------------+");
    println!("| MEDIC DIAGNOSE                           |");
    println!("+------------------------------------------+");
    println!("| Issues          : {:>22} |", report.summary.total);
    println!("| HIGH            : {:>22} |", count(Severity::High));
    println!("| MEDIUM          : {:>22} |", count(Severity::Medium));
    println!("| LOW             : {:>22} |", count(Severity::Low));
    println!("| Recommendations : {:>22} |", report.recommendations.len());
    println!("+------------------------------------------+");
    for (i, entry) in report.entries.iter().enumerate() {
        let level = entry.severity.map_or("-", Severity::as_str);
        println!("  {}. [{level}] {}", i + 1, entry.description);
    }
    if !report.recommendations.is_empty() {
        println!("\nRECOMMENDATIONS:");
        for (i, rec) in report.recommendations.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, rec.priority, rec.description);
        }
    }
    println!(
        "\nFull report: {}",
        Layout::new(workspace.root()).diagnostic_report_md().display()
    );
    Ok(())
}

fn run_diagnose(workspace: &Workspace) -> anyhow::Result<scribe::Report> {
    let layout = Layout::new(workspace.root());
    let mut run = DiagnosticRun::diagnostic();
    info!(run = %run.id(), workspace = %workspace.root().display(), "starting diagnostic run");

    Anatomist::with_default_rules()
        .scan(&mut run, workspace)
        .context("diagnostic scan failed")?;
    scribe::publish_diagnostic(&mut run, &layout).context("failed to write diagnostic report")
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn open_workspace(path: &Path) -> anyhow::Result<Workspace> {
    Workspace::open(path).with_context(|| format!("cannot open workspace {}", path.display()))
}
