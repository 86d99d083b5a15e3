//! Grading configuration: what each question expects and what it is worth.
use crate::value::{self, Value};
use anyhow::Context as _;
use serde_json::Map;
use std::path::Path;

/// Comparison strategy for array-valued answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MatchType {
    None,
    Exact,
    Any,
    All,
}

impl MatchType {
    /// Reads `matchType` from a key entry (or a credit tier).
    /// Anything unrecognized is treated as `None`.
    fn of(token: &Value) -> MatchType {
        let raw = match token.get("matchType") {
            Some(raw) => raw,
            None => return MatchType::None,
        };
        match raw {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "exact" => MatchType::Exact,
                "any" => MatchType::Any,
                "all" => MatchType::All,
                _ => MatchType::None,
            },
            Value::Number(n) => match n.as_u64() {
                Some(1) => MatchType::Exact,
                Some(2) => MatchType::Any,
                Some(3) => MatchType::All,
                _ => MatchType::None,
            },
            _ => MatchType::None,
        }
    }
}

/// Point value of a question
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Points {
    /// Same value for full and partial credit
    Flat(f64),
    Tiered { full: f64, partial: f64 },
}

impl Points {
    fn parse(token: &Value) -> anyhow::Result<Points> {
        match token {
            Value::Number(n) => Ok(Points::Flat(n.as_f64().context("points out of range")?)),
            Value::Object(tiers) => {
                let tier = |name: &str| {
                    tiers
                        .get(name)
                        .and_then(Value::as_f64)
                        .with_context(|| format!("`{}` points must be a number", name))
                };
                Ok(Points::Tiered {
                    full: tier("full")?,
                    partial: tier("partial")?,
                })
            }
            other => anyhow::bail!(
                "points must be a number or {{full, partial}}, got {}",
                value::kind(other)
            ),
        }
    }

    pub fn full(&self) -> f64 {
        match *self {
            Points::Flat(v) => v,
            Points::Tiered { full, .. } => full,
        }
    }

    pub fn partial(&self) -> f64 {
        match *self {
            Points::Flat(v) => v,
            Points::Tiered { partial, .. } => partial,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    /// Either the answer itself or `{full, partial}` tiers
    expected: Value,
    points: Points,
    match_type: MatchType,
}

/// Result of grading one answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Credit {
    /// None if the question is not in the key
    pub points: Option<f64>,
    /// Points were awarded for the partial-credit answer
    pub partial: bool,
}

impl Credit {
    fn ungradable() -> Credit {
        Credit {
            points: None,
            partial: false,
        }
    }

    fn full(points: &Points) -> Credit {
        Credit {
            points: Some(points.full()),
            partial: false,
        }
    }

    fn partial(points: &Points) -> Credit {
        Credit {
            points: Some(points.partial()),
            partial: true,
        }
    }

    fn none() -> Credit {
        Credit {
            points: Some(0.0),
            partial: false,
        }
    }

    /// Whether this is a full-credit award.
    pub fn is_full(&self) -> bool {
        !self.partial && self.points.map_or(false, |p| p > 0.0)
    }
}

/// Immutable answer key. Construct once and share behind `Arc`.
#[derive(Debug, Clone)]
pub struct AnswerKey {
    entries: Vec<Entry>,
    total_points: f64,
}

impl AnswerKey {
    pub fn from_json(text: &str) -> anyhow::Result<AnswerKey> {
        let doc: Value = serde_json::from_str(text).context("answer key is not valid JSON")?;
        let doc = match doc {
            Value::Object(map) => map,
            other => anyhow::bail!("answer key must be an object, got {}", value::kind(&other)),
        };
        Self::from_map(doc)
    }

    fn from_map(doc: Map<String, Value>) -> anyhow::Result<AnswerKey> {
        let mut entries = Vec::with_capacity(doc.len());
        for (key, token) in doc {
            let entry = Self::parse_entry(&key, &token)
                .with_context(|| format!("invalid answer key entry `{}`", key))?;
            entries.push(entry);
        }
        let total_points = entries.iter().map(|e| e.points.full()).sum();
        Ok(AnswerKey {
            entries,
            total_points,
        })
    }

    fn parse_entry(key: &str, token: &Value) -> anyhow::Result<Entry> {
        if !token.is_object() {
            anyhow::bail!("entry must be an object");
        }
        let expected = token.get("expected").context("`expected` missing")?.clone();
        let points = Points::parse(token.get("points").context("`points` missing")?)?;
        Ok(Entry {
            key: key.to_string(),
            expected,
            points,
            match_type: MatchType::of(token),
        })
    }

    /// Reads and parses key file at `path`.
    #[tracing::instrument]
    pub async fn load(path: &Path) -> anyhow::Result<AnswerKey> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read answer key at {}", path.display()))?;
        let key = Self::from_json(&text)?;
        tracing::info!(
            questions = key.entries.len(),
            total_points = key.total_points,
            "answer key loaded"
        );
        Ok(key)
    }

    /// Sum of full credit over all questions
    pub fn total_points(&self) -> f64 {
        self.total_points
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Question keys in document order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Grades `submitted` against question `key`.
    pub fn process(&self, key: &str, submitted: &Value) -> Credit {
        let entry = match self.entry(key) {
            Some(e) => e,
            None => return Credit::ungradable(),
        };

        if value::compatible(submitted, &entry.expected) {
            return if is_correct(submitted, &entry.expected, entry.match_type) {
                Credit::full(&entry.points)
            } else {
                Credit::none()
            };
        }

        // kinds differ, so this may only be a {full, partial} entry
        let (full, partial) = match (entry.expected.get("full"), entry.expected.get("partial")) {
            (Some(f), Some(p)) if entry.expected.is_object() => (f, p),
            _ => return Credit::none(),
        };

        if tier_matches(submitted, full) {
            return Credit::full(&entry.points);
        }
        if tier_matches(submitted, partial) {
            return Credit::partial(&entry.points);
        }
        if nested_tier_matches(submitted, full) {
            return Credit::full(&entry.points);
        }
        if nested_tier_matches(submitted, partial) {
            return Credit::partial(&entry.points);
        }
        Credit::none()
    }
}

fn tier_matches(submitted: &Value, tier: &Value) -> bool {
    value::compatible(submitted, tier) && is_correct(submitted, tier, MatchType::of(tier))
}

fn nested_tier_matches(submitted: &Value, tier: &Value) -> bool {
    match tier.get("expected") {
        Some(expected) => {
            value::compatible(submitted, expected)
                && is_correct(submitted, expected, MatchType::of(tier))
        }
        None => false,
    }
}

fn is_correct(submitted: &Value, expected: &Value, match_type: MatchType) -> bool {
    match expected {
        Value::String(e) => submitted.as_str() == Some(e.as_str()),
        Value::Number(e) => match (e.as_f64(), submitted.as_f64()) {
            (Some(e), Some(s)) => e == s,
            _ => false,
        },
        Value::Bool(e) => submitted.as_bool() == Some(*e),
        Value::Array(e) => match submitted {
            Value::Array(s) => match_array(s, e, match_type),
            _ => false,
        },
        Value::Null | Value::Object(_) => false,
    }
}

/// Compares array answers. Arrays of different length never match.
pub fn match_array(submitted: &[Value], expected: &[Value], match_type: MatchType) -> bool {
    if submitted.len() != expected.len() {
        return false;
    }
    match match_type {
        MatchType::Exact => submitted
            .iter()
            .zip(expected)
            .all(|(s, e)| value::loosely_equal(s, e)),
        MatchType::Any => value::distinct(expected)
            .into_iter()
            .any(|e| submitted.iter().any(|s| value::loosely_equal(s, e))),
        MatchType::All => {
            let found = value::distinct(expected)
                .into_iter()
                .filter(|e| submitted.iter().any(|s| value::loosely_equal(s, e)))
                .count();
            found == expected.len()
        }
        MatchType::None => false,
    }
}
