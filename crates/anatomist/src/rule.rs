//! Declarative diagnostic rules.
//!
//! A rule pairs an extractor (what to observe) with a classifier (when an
//! observation is a problem, and how bad). Both halves are pure, so a rule
//! evaluated twice over the same content yields the same findings.

use crate::tree::Probe;
use aho_corasick::AhoCorasick;
use common::{Finding, Issue, Priority, Recommendation, Severity};
use regex::Regex;
use serde_yaml::Value;

/// Extraction failed because the content does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// One thing an extractor saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// A boolean condition held.
    Flag,
    Value(f64),
}

/// What a content rule looks at.
#[derive(Debug)]
pub enum Extractor {
    /// Flags when the pattern matches anywhere.
    Matches(Regex),
    /// Flags when the literal is absent.
    Absent(&'static str),
    /// Capture group 1 of every match, as a number.
    Numbers(Regex),
    /// Capture group 1 of the first match only.
    FirstNumber(Regex),
    /// Numeric leaves under any of the dotted key paths; `*` matches any key.
    /// A path may start at any depth, and every YAML document in the stream
    /// is searched.
    YamlNumbers(&'static [&'static str]),
    /// Number of matches, observed even when zero.
    Count(Regex),
    /// Flags when any keyword occurs, ignoring case. Keywords are lowercase.
    AnyKeyword(AhoCorasick),
}

impl Extractor {
    pub fn extract(&self, content: &str) -> Result<Vec<Observation>, ExtractError> {
        Ok(match self {
            Extractor::Matches(re) => flag(re.is_match(content)),
            Extractor::Absent(lit) => flag(!content.contains(lit)),
            Extractor::Numbers(re) => re
                .captures_iter(content)
                .filter_map(|c| c.get(1)?.as_str().parse().ok())
                .map(Observation::Value)
                .collect(),
            Extractor::FirstNumber(re) => re
                .captures(content)
                .and_then(|c| c.get(1)?.as_str().parse().ok())
                .map(Observation::Value)
                .into_iter()
                .collect(),
            Extractor::YamlNumbers(paths) => yaml_numbers(content, paths)?
                .into_iter()
                .map(Observation::Value)
                .collect(),
            Extractor::Count(re) => vec![Observation::Value(re.find_iter(content).count() as f64)],
            Extractor::AnyKeyword(ac) => flag(ac.is_match(&content.to_lowercase())),
        })
    }
}

fn flag(condition: bool) -> Vec<Observation> {
    if condition {
        vec![Observation::Flag]
    } else {
        Vec::new()
    }
}

fn yaml_numbers(content: &str, paths: &[&str]) -> Result<Vec<f64>, ExtractError> {
    use serde::Deserialize;

    let paths: Vec<Vec<&str>> = paths.iter().map(|p| p.split('.').collect()).collect();
    let mut found = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document)?;
        search(&value, &paths, &mut found);
    }
    Ok(found)
}

/// Tries every path at `value`, then at each node below it, in document order.
fn search(value: &Value, paths: &[Vec<&str>], out: &mut Vec<f64>) {
    for keys in paths {
        collect(value, keys, out);
    }
    match value {
        Value::Mapping(map) => map.values().for_each(|child| search(child, paths, out)),
        Value::Sequence(items) => items.iter().for_each(|child| search(child, paths, out)),
        Value::Tagged(tagged) => search(&tagged.value, paths, out),
        _ => {}
    }
}

fn collect(value: &Value, keys: &[&str], out: &mut Vec<f64>) {
    let Some((&key, rest)) = keys.split_first() else {
        if let Some(n) = value.as_f64() {
            out.push(n);
        }
        return;
    };
    let Value::Mapping(map) = value else {
        return;
    };
    if key == "*" {
        for child in map.values() {
            collect(child, rest, out);
        }
    } else if let Some(child) = map.get(key) {
        collect(child, rest, out);
    }
}

/// Decides whether an observation is a finding.
#[derive(Debug, Clone, Copy)]
pub enum Classifier {
    /// Every observation is a finding.
    Always(Severity),
    /// Flags `v < threshold`.
    Below { threshold: f64, severity: Severity },
    /// Flags `v > threshold`.
    Above { threshold: f64, severity: Severity },
}

impl Classifier {
    pub fn classify(&self, observation: Observation) -> Option<Severity> {
        match (*self, observation) {
            (Classifier::Always(s), _) => Some(s),
            (Classifier::Below { threshold, severity }, Observation::Value(v)) if v < threshold => {
                Some(severity)
            }
            (Classifier::Above { threshold, severity }, Observation::Value(v)) if v > threshold => {
                Some(severity)
            }
            _ => None,
        }
    }
}

/// Where a rule gets its observations.
#[derive(Debug)]
pub enum Source {
    Artifact {
        path: &'static str,
        extractor: Extractor,
    },
    /// The workspace tree as a whole.
    Tree(Probe),
}

#[derive(Debug, Clone, Copy)]
pub struct Advice {
    pub template: &'static str,
    pub priority: Priority,
}

#[derive(Debug)]
pub struct DiagnosticRule {
    pub id: &'static str,
    pub source: Source,
    pub classifier: Classifier,
    /// Issue text; `{value}` expands to the observed number.
    pub issue: &'static str,
    pub recommendation: Option<Advice>,
}

impl DiagnosticRule {
    pub fn target(&self) -> Option<&'static str> {
        match self.source {
            Source::Artifact { path, .. } => Some(path),
            Source::Tree(_) => None,
        }
    }

    /// Turns observations into findings, in observation order.
    pub fn classify(&self, observations: &[Observation]) -> Vec<Finding> {
        observations
            .iter()
            .filter_map(|&obs| {
                let severity = self.classifier.classify(obs)?;
                let issue = Issue::new(render(self.issue, obs), severity);
                let finding = Finding::new(self.id, issue);
                Some(match self.recommendation {
                    Some(advice) => finding.with_recommendation(Recommendation::new(
                        render(advice.template, obs),
                        advice.priority,
                    )),
                    None => finding,
                })
            })
            .collect()
    }
}

/// Evaluates a content rule against `content`. Tree rules observe nothing here.
pub fn evaluate(rule: &DiagnosticRule, content: &str) -> Result<Vec<Finding>, ExtractError> {
    match &rule.source {
        Source::Artifact { extractor, .. } => Ok(rule.classify(&extractor.extract(content)?)),
        Source::Tree(_) => Ok(Vec::new()),
    }
}

fn render(template: &str, observation: Observation) -> String {
    match observation {
        Observation::Value(v) => template.replace("{value}", &v.to_string()),
        Observation::Flag => template.to_string(),
    }
}
