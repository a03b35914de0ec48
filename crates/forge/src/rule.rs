//! Declarative patch rules.
//!
//! A rule is data: its match predicate, idempotency predicate and transform
//! are all pure functions of the artifact content, derived from its [`Edit`].
//! For every content a rule matches, `is_satisfied(transform(content))` holds,
//! which is what makes a second pass a no-op.

use regex::Regex;

/// One declarative content transformation against one artifact.
#[derive(Debug)]
pub struct PatchRule {
    pub id: &'static str,
    /// Workspace-relative artifact path.
    pub target: &'static str,
    /// Human-readable description recorded in the Fix.
    pub description: &'static str,
    pub edit: Edit,
}

#[derive(Debug)]
pub enum Edit {
    /// Regex replace-all. Satisfied once the pattern no longer matches.
    Replace {
        pattern: Regex,
        replacement: &'static str,
    },
    /// Insert a block of text, keyed on a marker it contains.
    Insert(Insertion),
}

/// Composite insertion with anchor search and an explicit fallback.
#[derive(Debug)]
pub struct Insertion {
    /// Markers that must all be present for the rule to apply at all.
    pub requires: &'static [&'static str],
    /// Text contained in `block`; its presence means the rule is satisfied.
    pub marker: &'static str,
    pub block: &'static str,
    pub anchor: Anchor,
    pub fallback: Fallback,
}

#[derive(Debug, Clone, Copy)]
pub enum Anchor {
    /// After the line holding `needle`. With a `scope`, the needle is only
    /// searched for at or after the first occurrence of the scope text.
    AfterLine {
        scope: Option<&'static str>,
        needle: &'static str,
    },
    /// In front of the line holding the first `needle`.
    BeforeLine(&'static str),
    /// Always use the fallback.
    None,
}

/// Where an insertion goes when its anchor is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    AppendAtEnd,
    /// In front of the last `}` (class body end); end of file if there is none.
    BeforeClosingBrace,
}

/// Which insertion path a transform took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Anchored,
    AppendedAtEnd,
    BeforeClosingBrace,
}

impl Placement {
    pub fn describe(self) -> &'static str {
        match self {
            Placement::Anchored => "at anchor",
            Placement::AppendedAtEnd => "anchor not found, appended at end",
            Placement::BeforeClosingBrace => "anchor not found, inserted before closing brace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub content: String,
    /// `None` for replacements.
    pub placement: Option<Placement>,
}

impl PatchRule {
    pub fn matches(&self, content: &str) -> bool {
        match &self.edit {
            Edit::Replace { pattern, .. } => pattern.is_match(content),
            Edit::Insert(ins) => ins.requires.iter().all(|m| content.contains(m)),
        }
    }

    pub fn is_satisfied(&self, content: &str) -> bool {
        match &self.edit {
            Edit::Replace { pattern, .. } => !pattern.is_match(content),
            Edit::Insert(ins) => content.contains(ins.marker),
        }
    }

    pub fn transform(&self, content: &str) -> Transformed {
        match &self.edit {
            Edit::Replace {
                pattern,
                replacement,
            } => Transformed {
                content: pattern.replace_all(content, *replacement).into_owned(),
                placement: None,
            },
            Edit::Insert(ins) => {
                let (content, placement) = ins.insert(content);
                Transformed {
                    content,
                    placement: Some(placement),
                }
            }
        }
    }
}

impl Insertion {
    fn insert(&self, content: &str) -> (String, Placement) {
        match self.anchor_offset(content) {
            Some(at) => (splice(content, at, self.block), Placement::Anchored),
            None => match self.fallback {
                Fallback::AppendAtEnd => (append(content, self.block), Placement::AppendedAtEnd),
                Fallback::BeforeClosingBrace => match content.rfind('}') {
                    Some(at) => (
                        splice(content, line_start(content, at), self.block),
                        Placement::BeforeClosingBrace,
                    ),
                    None => (append(content, self.block), Placement::AppendedAtEnd),
                },
            },
        }
    }

    /// Byte offset at which the block goes, if the anchor is present.
    fn anchor_offset(&self, content: &str) -> Option<usize> {
        match self.anchor {
            Anchor::AfterLine { scope, needle } => {
                let from = match scope {
                    Some(s) => content.find(s)?,
                    None => 0,
                };
                let at = from + content[from..].find(needle)?;
                Some(match content[at..].find('\n') {
                    Some(nl) => at + nl + 1,
                    None => content.len(),
                })
            }
            Anchor::BeforeLine(needle) => content.find(needle).map(|at| line_start(content, at)),
            Anchor::None => None,
        }
    }
}

fn line_start(content: &str, at: usize) -> usize {
    content[..at].rfind('\n').map_or(0, |nl| nl + 1)
}

fn splice(content: &str, at: usize, block: &str) -> String {
    let mut out = String::with_capacity(content.len() + block.len() + 1);
    out.push_str(&content[..at]);
    // Anchor on an unterminated last line.
    if at == content.len() && !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
    out.push_str(&content[at..]);
    out
}

fn append(content: &str, block: &str) -> String {
    splice(content, content.len(), block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_rule(anchor: Anchor, fallback: Fallback) -> PatchRule {
        PatchRule {
            id: "t.insert",
            target: "T.java",
            description: "insert guard",
            edit: Edit::Insert(Insertion {
                requires: &["check()"],
                marker: "GUARD",
                block: "    // GUARD\n",
                anchor,
                fallback,
            }),
        }
    }

    #[test]
    fn test_replace_predicates() {
        let rule = PatchRule {
            id: "t.mode",
            target: "a.yml",
            description: "sandbox",
            edit: Edit::Replace {
                pattern: Regex::new(r"(default-mode:[ \t]*)production\b").unwrap(),
                replacement: "${1}sandbox",
            },
        };
        let src = "trading:\n  default-mode: production\n";
        assert!(rule.matches(src));
        assert!(!rule.is_satisfied(src));
        let out = rule.transform(src);
        assert_eq!(out.content, "trading:\n  default-mode: sandbox\n");
        assert_eq!(out.placement, None);
        assert!(rule.is_satisfied(&out.content));
        assert!(!rule.matches("default-mode: productionish\n"));
    }

    #[test]
    fn test_insert_after_anchor_line() {
        let rule = insert_rule(
            Anchor::AfterLine {
                scope: Some("check()"),
                needle: "log.info",
            },
            Fallback::BeforeClosingBrace,
        );
        let src = "class A {\n    log.info(\"early\");\n    check();\n    log.info(\"passed\");\n    go();\n}\n";
        let out = rule.transform(src);
        assert_eq!(out.placement, Some(Placement::Anchored));
        assert_eq!(
            out.content,
            "class A {\n    log.info(\"early\");\n    check();\n    log.info(\"passed\");\n    // GUARD\n    go();\n}\n"
        );
        assert!(rule.is_satisfied(&out.content));
    }

    #[test]
    fn test_insert_before_anchor_line() {
        let rule = insert_rule(Anchor::BeforeLine("report("), Fallback::BeforeClosingBrace);
        let src = "check();\n        report(x);\n";
        let out = rule.transform(src);
        assert_eq!(out.content, "check();\n    // GUARD\n        report(x);\n");
    }

    #[test]
    fn test_missing_anchor_falls_back_to_closing_brace() {
        let rule = insert_rule(Anchor::BeforeLine("report("), Fallback::BeforeClosingBrace);
        let src = "class A {\n    check();\n}\n";
        let out = rule.transform(src);
        assert_eq!(out.placement, Some(Placement::BeforeClosingBrace));
        assert_eq!(out.content, "class A {\n    check();\n    // GUARD\n}\n");
    }

    #[test]
    fn test_missing_anchor_appends_at_end() {
        let rule = insert_rule(Anchor::None, Fallback::AppendAtEnd);
        let out = rule.transform("check()");
        assert_eq!(out.placement, Some(Placement::AppendedAtEnd));
        assert_eq!(out.content, "check()\n    // GUARD\n");
    }

    #[test]
    fn test_brace_fallback_without_brace_appends() {
        let rule = insert_rule(Anchor::None, Fallback::BeforeClosingBrace);
        let out = rule.transform("check();\n");
        assert_eq!(out.placement, Some(Placement::AppendedAtEnd));
    }

    #[test]
    fn test_insert_requires_all_markers() {
        let rule = insert_rule(Anchor::None, Fallback::AppendAtEnd);
        assert!(!rule.matches("nothing here"));
        assert!(rule.matches("x check() y"));
        assert!(rule.is_satisfied("// GUARD"));
    }
}
