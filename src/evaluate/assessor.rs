//! Complexity / confidence / risk scoring.
//!
//! All three axes are weighted sums of named factors. The weights come from
//! configuration (they are tunable parameters, not constants); the factor
//! heuristics live here. Scoring is deterministic for a given issue and
//! history snapshot, and every published score is rounded to 2 decimals.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::config::ScoringConfig;
use crate::evaluate::patterns::PatternLibrary;
use crate::evaluate::{AxisScore, Level, RiskScore, round2};
use crate::issue::{Issue, IssueType};

const COMPLEX_WORDS: &[&str] = &[
    "refactor",
    "architecture",
    "migration",
    "concurrency",
    "race condition",
    "redesign",
    "rewrite",
    "distributed",
    "deadlock",
    "breaking",
];

const SIMPLE_WORDS: &[&str] = &[
    "typo",
    "spelling",
    "rename",
    "comment",
    "readme",
    "format",
    "lint",
    "whitespace",
    "bump",
    "one-line",
];

const DEPTH_TERMS: &[&str] = &[
    "database",
    "schema",
    "async",
    "thread",
    "memory",
    "cache",
    "protocol",
    "algorithm",
    "encryption",
    "serialization",
    "transaction",
];

const SEVERITY_TERMS: &[&str] = &[
    "data loss",
    "outage",
    "corrupt",
    "crash",
    "exploit",
    "vulnerab",
    "injection",
    "security",
    "breach",
];

const DEPENDENCY_TERMS: &[&str] = &["depends on", "blocked by", "requires", "after #"];

const MULTI_FILE_TERMS: &[&str] = &["across", "multiple files", "all modules", "everywhere"];

fn count_terms(text: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| text.contains(*t)).count()
}

/// One resolved issue remembered for similarity scoring.
#[derive(Debug, Clone)]
pub struct ResolvedOutcome {
    pub keywords: BTreeSet<String>,
    pub success: bool,
}

/// In-memory record of previously resolved issues, used to derive the
/// confidence axis's similarity factor. Seeded from the audit log at
/// startup and updated as jobs complete.
#[derive(Debug, Default)]
pub struct History {
    records: Vec<ResolvedOutcome>,
}

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "when", "then", "have", "some", "will", "should", "about",
    "there", "which", "into",
];

fn keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, text: &str, success: bool) {
        self.records.push(ResolvedOutcome {
            keywords: keywords(text),
            success,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Success-rate × average-similarity among resolved issues with
    /// similarity > 0.6; 0.2 default when no close neighbours exist.
    pub fn similarity_score(&self, text: &str) -> f64 {
        let target = keywords(text);
        let close: Vec<(f64, bool)> = self
            .records
            .iter()
            .map(|r| (jaccard(&target, &r.keywords), r.success))
            .filter(|(sim, _)| *sim > 0.6)
            .collect();
        if close.is_empty() {
            return 0.2;
        }
        let avg_sim = close.iter().map(|(s, _)| s).sum::<f64>() / close.len() as f64;
        let success_rate =
            close.iter().filter(|(_, ok)| *ok).count() as f64 / close.len() as f64;
        success_rate * avg_sim
    }
}

/// Pure scoring over a canonical issue.
pub struct Assessor {
    complexity_weights: crate::config::ComplexityWeights,
    confidence_weights: crate::config::ConfidenceWeights,
    risk_weights: crate::config::RiskWeights,
    patterns: PatternLibrary,
    history: RwLock<History>,
}

impl Assessor {
    pub fn new(scoring: &ScoringConfig, patterns: PatternLibrary) -> Self {
        Self {
            complexity_weights: scoring.complexity.normalized(),
            confidence_weights: scoring.confidence.normalized(),
            risk_weights: scoring.risk.normalized(),
            patterns,
            history: RwLock::new(History::new()),
        }
    }

    pub fn patterns(&self) -> &PatternLibrary {
        &self.patterns
    }

    /// Feed a completed job's outcome back into the similarity history.
    pub fn record_outcome(&self, issue_text: &str, success: bool) {
        if let Ok(mut history) = self.history.write() {
            history.record(issue_text, success);
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn assess(&self, issue: &Issue) -> (AxisScore, AxisScore, RiskScore) {
        let text = issue.search_text();
        (
            self.complexity(issue, &text),
            self.confidence(issue, &text),
            self.risk(issue, &text),
        )
    }

    // ── Complexity ────────────────────────────────────────────────────

    fn complexity(&self, issue: &Issue, text: &str) -> AxisScore {
        let text_complexity = text_complexity(text);
        let technical_depth =
            (0.1 + 0.15 * count_terms(text, DEPTH_TERMS) as f64).min(1.0);
        let scope_size = scope_size(issue, text);
        let dependencies =
            (0.1 + 0.3 * count_terms(text, DEPENDENCY_TERMS) as f64).min(1.0);

        let w = &self.complexity_weights;
        let score = round2(
            w.text_complexity * text_complexity
                + w.technical_depth * technical_depth
                + w.scope_size * scope_size
                + w.dependencies * dependencies,
        );

        let mut factors = BTreeMap::new();
        factors.insert("text_complexity".to_string(), round2(text_complexity));
        factors.insert("technical_depth".to_string(), round2(technical_depth));
        factors.insert("scope_size".to_string(), round2(scope_size));
        factors.insert("dependencies".to_string(), round2(dependencies));

        AxisScore {
            score,
            level: complexity_level(score),
            factors,
        }
    }

    // ── Confidence ────────────────────────────────────────────────────

    fn confidence(&self, issue: &Issue, text: &str) -> AxisScore {
        let best = self.patterns.best_match(text);
        let pattern_match = best.map(|r| r.confidence).unwrap_or(0.1);

        let similarity = self
            .history
            .read()
            .map(|h| h.similarity_score(text))
            .unwrap_or(0.2);

        let capability_match = match issue.issue_type {
            IssueType::Documentation => 1.0,
            IssueType::Testing => 0.9,
            IssueType::Bug => 0.8,
            IssueType::Feature => 0.5,
            IssueType::General => 0.4,
        };

        // A confidently recognized automatable signature carries its own
        // context; otherwise fall back to how much the reporter gave us.
        let context_available = if best.map(|r| r.automation_suitable).unwrap_or(false) {
            1.0
        } else {
            context_from_text(&issue.body)
        };

        let w = &self.confidence_weights;
        let score = round2(
            w.pattern_match * pattern_match
                + w.similarity * similarity
                + w.capability_match * capability_match
                + w.context_available * context_available,
        );

        let mut factors = BTreeMap::new();
        factors.insert("pattern_match".to_string(), round2(pattern_match));
        factors.insert("similarity".to_string(), round2(similarity));
        factors.insert("capability_match".to_string(), round2(capability_match));
        factors.insert("context_available".to_string(), round2(context_available));

        AxisScore {
            score,
            level: confidence_level(score),
            factors,
        }
    }

    // ── Risk ──────────────────────────────────────────────────────────

    fn risk(&self, issue: &Issue, text: &str) -> RiskScore {
        let severity =
            (0.1 + 0.25 * count_terms(text, SEVERITY_TERMS) as f64).min(1.0);

        let sensitive_labels = if issue.has_label("security") || issue.has_label("breaking-change")
        {
            1.0
        } else if issue.has_label("production") || issue.has_label("release") {
            0.6
        } else {
            0.1
        };

        let missing_tests = if text.contains("no tests") || text.contains("untested") {
            0.8
        } else if text.contains("test") {
            0.2
        } else {
            0.5
        };

        let w = &self.risk_weights;
        let score = round2(
            w.severity_keywords * severity
                + w.sensitive_labels * sensitive_labels
                + w.missing_tests * missing_tests,
        );

        RiskScore {
            score,
            level: complexity_level(score),
        }
    }
}

/// Keyword-based vocabulary heuristic: 0.2 / 0.5 / 0.8.
fn text_complexity(text: &str) -> f64 {
    let complex = count_terms(text, COMPLEX_WORDS);
    let simple = count_terms(text, SIMPLE_WORDS);
    if complex > simple {
        0.8
    } else if simple > complex {
        0.2
    } else {
        0.5
    }
}

fn scope_size(issue: &Issue, text: &str) -> f64 {
    let base: f64 = if issue.body.len() >= 800 {
        0.8
    } else if issue.body.len() >= 200 {
        0.5
    } else {
        0.2
    };
    let spread = if count_terms(text, MULTI_FILE_TERMS) > 0 {
        0.2
    } else {
        0.0
    };
    (base + spread).min(1.0)
}

fn context_from_text(body: &str) -> f64 {
    let mut score: f64 = 0.2;
    if body.len() > 100 {
        score += 0.2;
    }
    if body.len() > 400 {
        score += 0.2;
    }
    if body.contains("```") {
        score += 0.2;
    }
    let lower = body.to_lowercase();
    if lower.contains("steps to reproduce") || lower.contains("expected") {
        score += 0.2;
    }
    score.min(1.0)
}

/// Complexity and risk share the same bands.
fn complexity_level(score: f64) -> Level {
    if score < 0.3 {
        Level::Low
    } else if score < 0.7 {
        Level::Medium
    } else {
        Level::High
    }
}

fn confidence_level(score: f64) -> Level {
    if score < 0.4 {
        Level::Low
    } else if score < 0.7 {
        Level::Medium
    } else {
        Level::High
    }
}
