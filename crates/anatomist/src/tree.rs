//! Workspace-level probes: conditions over the tree rather than one artifact.

use crate::rule::Observation;
use regex::RegexSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum Probe {
    /// Flags when `name` is not a file directly under the root.
    FileAbsent(&'static str),
    /// Flags when no file directly under the root has this extension.
    NoFileWithExtension(&'static str),
    /// Flags when no file with `extension` anywhere in the tree matches any
    /// of `patterns`.
    PatternAbsent {
        extension: &'static str,
        patterns: RegexSet,
    },
}

/// A path the walk could not look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// What a probe saw, plus every path it had to skip on the way.
#[derive(Debug, Default)]
pub struct Survey {
    pub observations: Vec<Observation>,
    pub skipped: Vec<Skipped>,
}

impl Probe {
    pub fn observe(&self, root: &Path) -> Survey {
        let mut skipped = Vec::new();
        let holds = match self {
            Probe::FileAbsent(name) => !root.join(name).is_file(),
            Probe::NoFileWithExtension(ext) => !top_level_has_extension(root, ext, &mut skipped),
            Probe::PatternAbsent {
                extension,
                patterns,
            } => !tree_matches(root, extension, patterns, &mut skipped),
        };
        let observations = if holds {
            vec![Observation::Flag]
        } else {
            Vec::new()
        };
        Survey {
            observations,
            skipped,
        }
    }
}

fn skip(skipped: &mut Vec<Skipped>, path: &Path, reason: impl ToString) {
    let reason = reason.to_string();
    warn!(path = %path.display(), %reason, "skipping unreadable path");
    skipped.push(Skipped {
        path: path.to_path_buf(),
        reason,
    });
}

fn walk_error(root: &Path, skipped: &mut Vec<Skipped>, err: walkdir::Error) {
    let path = err.path().unwrap_or(root).to_path_buf();
    skip(skipped, &path, err);
}

fn top_level_has_extension(root: &Path, ext: &str, skipped: &mut Vec<Skipped>) -> bool {
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        match entry {
            Ok(e) if e.file_type().is_file() && has_extension(e.path(), ext) => return true,
            Ok(_) => {}
            Err(err) => walk_error(root, skipped, err),
        }
    }
    false
}

fn tree_matches(root: &Path, ext: &str, patterns: &RegexSet, skipped: &mut Vec<Skipped>) -> bool {
    let walk = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_scan_excluded(e.path()));
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                walk_error(root, skipped, err);
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, ext) {
            continue;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                skip(skipped, path, e);
                continue;
            }
        };
        if content.lines().any(|line| patterns.is_match(line)) {
            debug!(path = %path.display(), "pattern found");
            return true;
        }
    }
    false
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(ext)
}

/// Build output, VCS metadata and our own backup root.
fn is_scan_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| {
            matches!(
                name,
                ".git" | "target" | "build" | "node_modules" | ".gradle" | "backup_before_fix"
            )
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn logging_probe() -> Probe {
        Probe::PatternAbsent {
            extension: "java",
            patterns: RegexSet::new([r"(?i)log.*buy.*order", r"(?i)log.*cooldown"]).unwrap(),
        }
    }

    #[test]
    fn test_file_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = Probe::FileAbsent("init.sql");
        assert_eq!(probe.observe(tmp.path()).observations, vec![Observation::Flag]);
        fs::write(tmp.path().join("init.sql"), "create table t();").unwrap();
        assert!(probe.observe(tmp.path()).observations.is_empty());
    }

    #[test]
    fn test_extension_only_at_top_level() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("db")).unwrap();
        fs::write(tmp.path().join("db/schema.sql"), "").unwrap();
        let probe = Probe::NoFileWithExtension("sql");
        assert_eq!(probe.observe(tmp.path()).observations, vec![Observation::Flag]);
        fs::write(tmp.path().join("init.sql"), "").unwrap();
        assert!(probe.observe(tmp.path()).observations.is_empty());
    }

    #[test]
    fn test_pattern_search_walks_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("src/main/java/ru");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("A.java"), "class A {}\n").unwrap();
        assert_eq!(logging_probe().observe(tmp.path()).observations, vec![Observation::Flag]);

        fs::write(deep.join("B.java"), "log.info(\"Cooldown active\");\n").unwrap();
        assert!(logging_probe().observe(tmp.path()).observations.is_empty());
    }

    #[test]
    fn test_backup_root_not_scanned() {
        let tmp = tempfile::tempdir().unwrap();
        let bak = tmp.path().join("backup_before_fix/files");
        fs::create_dir_all(&bak).unwrap();
        fs::write(bak.join("C.java"), "log.warn(\"cooldown\");\n").unwrap();
        assert_eq!(logging_probe().observe(tmp.path()).observations, vec![Observation::Flag]);
    }

    #[test]
    fn test_unreadable_source_is_reported_not_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("Bad.java"), [0xff, 0xfe, b'\n']).unwrap();
        fs::write(tmp.path().join("Good.java"), "class Good {}\n").unwrap();

        let survey = logging_probe().observe(tmp.path());

        assert_eq!(survey.observations, vec![Observation::Flag]);
        assert_eq!(survey.skipped.len(), 1);
        assert_eq!(survey.skipped[0].path, tmp.path().join("Bad.java"));
    }
}
