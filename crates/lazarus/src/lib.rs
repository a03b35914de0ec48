//! # Lazarus: operator scripts
//!
//! Renders the stop, monitor and rollback shell scripts from compiled-in
//! templates. Placeholders are `{{name}}`; every value is shell-quoted
//! before substitution, except for pre-rendered command lines.
//!
//! The rollback script captures the fix list at emission time. It goes
//! stale once more fixes land, so callers re-emit it after every patch run.

use common::{Layout, PatchRun};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

const STOP_TEMPLATE: &str = include_str!("../templates/emergency_stop.sh.tmpl");
const MONITOR_TEMPLATE: &str = include_str!("../templates/monitor_bot.sh.tmpl");
const ROLLBACK_TEMPLATE: &str = include_str!("../templates/rollback_fixes.sh.tmpl");

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template uses unknown placeholder `{0}`")]
    Unknown(String),
    #[error("value `{0}` is never used by the template")]
    Unused(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to write script {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Stop,
    Monitor,
    Rollback,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 3] = [ScriptKind::Stop, ScriptKind::Monitor, ScriptKind::Rollback];

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::Stop => Layout::STOP_SCRIPT,
            ScriptKind::Monitor => Layout::MONITOR_SCRIPT,
            ScriptKind::Rollback => Layout::ROLLBACK_SCRIPT,
        }
    }

    fn template(self) -> &'static str {
        match self {
            ScriptKind::Stop => STOP_TEMPLATE,
            ScriptKind::Monitor => MONITOR_TEMPLATE,
            ScriptKind::Rollback => ROLLBACK_TEMPLATE,
        }
    }
}

/// Explicit inputs for every script.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub layout: Layout,
    pub backup_root: PathBuf,
    /// Fix descriptions, in ledger order.
    pub fixes: Vec<String>,
}

impl ScriptContext {
    /// Context with no fixes and the default backup root.
    pub fn new(layout: Layout) -> Self {
        let backup_root = layout.backup_root();
        Self {
            layout,
            backup_root,
            fixes: Vec::new(),
        }
    }

    /// Captures the run's backup root and fix list as they are right now.
    pub fn for_patch_run(layout: Layout, run: &PatchRun) -> Self {
        let backup_root = run
            .backup_root()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| layout.backup_root());
        let fixes = run.ledger().iter().map(|f| f.description.clone()).collect();
        Self {
            layout,
            backup_root,
            fixes,
        }
    }

    fn vars(&self, kind: ScriptKind) -> BTreeMap<&'static str, String> {
        let layout = &self.layout;
        let mut vars = BTreeMap::new();
        match kind {
            ScriptKind::Stop => {
                vars.insert("process_pattern", shell_quote(Layout::PROCESS_PATTERN));
                vars.insert("lock_file", quote_path(&layout.lock_file()));
                vars.insert("stop_log", quote_path(&layout.stop_log()));
            }
            ScriptKind::Monitor => {
                vars.insert("process_pattern", shell_quote(Layout::PROCESS_PATTERN));
                vars.insert("lock_file", quote_path(&layout.lock_file()));
                vars.insert("application_log", quote_path(&layout.application_log()));
            }
            ScriptKind::Rollback => {
                vars.insert("backup_root", quote_path(&self.backup_root));
                vars.insert("workspace", quote_path(layout.root()));
                vars.insert("fix_lines", self.fix_lines());
            }
        }
        vars
    }

    fn fix_lines(&self) -> String {
        if self.fixes.is_empty() {
            return "echo '(none)'".to_string();
        }
        self.fixes
            .iter()
            .map(|fix| format!("echo {}", shell_quote(&format!("- {fix}"))))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Renders the script text for `kind`.
pub fn emit(kind: ScriptKind, context: &ScriptContext) -> Result<String, TemplateError> {
    render(kind.template(), &context.vars(kind))
}

/// Overwrites `path` with `text` and marks it executable.
pub fn write_script(path: &Path, text: &str) -> Result<(), ScriptError> {
    let io = |source| ScriptError::Write {
        path: path.to_path_buf(),
        source,
    };
    fs::write(path, text).map_err(io)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io)?;
    }
    Ok(())
}

/// Emits and writes each kind into the layout root. Returns the written paths.
pub fn write_scripts(
    kinds: &[ScriptKind],
    context: &ScriptContext,
) -> Result<Vec<PathBuf>, ScriptError> {
    let mut written = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let path = context.layout.root().join(kind.file_name());
        write_script(&path, &emit(kind, context)?)?;
        info!(script = %path.display(), "script written");
        written.push(path);
    }
    Ok(written)
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("BUG: placeholder pattern does not compile")
    })
}

/// Substitutes `{{name}}` placeholders. Every placeholder must have a value
/// and every value must be used.
pub fn render(template: &str, vars: &BTreeMap<&'static str, String>) -> Result<String, TemplateError> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut unknown: Option<String> = None;
    let out = placeholder().replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        match vars.get(name) {
            Some(value) => {
                used.insert(name.to_string());
                value.clone()
            }
            None => {
                unknown.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    if let Some(name) = unknown {
        return Err(TemplateError::Unknown(name));
    }
    if let Some(name) = vars.keys().find(|k| !used.contains(**k)) {
        return Err(TemplateError::Unused(name.to_string()));
    }
    Ok(out.into_owned())
}

/// POSIX single-quoting: `it's` becomes `'it'\''s'`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}
