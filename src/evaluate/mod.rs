//! Issue evaluation: scoring, pattern matching, and the rule engine.
//!
//! An [`Evaluation`] is derived fresh for every dispatch attempt and frozen
//! onto the job at dispatch time. It is never persisted as mutable state —
//! recomputing is cheap and avoids staleness.

pub mod assessor;
pub mod patterns;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EvaluationError;
use crate::issue::Issue;

pub use assessor::{Assessor, History, ResolvedOutcome};
pub use patterns::{PatternLibrary, PatternRule};
pub use rules::{EvaluationRule, RuleOutcome, baseline_rules};

/// Banded level derived from a raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid level: {}", s)),
        }
    }
}

/// Verdict on whether an issue should be handled autonomously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suitability {
    High,
    Medium,
    Low,
    Unknown,
}

impl Suitability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Suitability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Suitability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid suitability: {}", s)),
        }
    }
}

/// Weighted-factor score along one axis (complexity or confidence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisScore {
    /// Rounded to 2 decimal places for determinism.
    pub score: f64,
    pub level: Level,
    pub factors: BTreeMap<String, f64>,
}

/// Risk score. Computed from weighted factors like complexity, but only the
/// aggregate is carried on the evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub score: f64,
    pub level: Level,
}

/// Full evaluation of an issue: three score axes plus the rule engine's
/// verdict and reasoning trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub complexity: AxisScore,
    pub confidence: AxisScore,
    pub risk: RiskScore,
    pub suitability: Suitability,
    pub reasoning: Vec<String>,
    pub recommendations: BTreeSet<String>,
}

/// Round to 2 decimal places. All published scores go through this so test
/// expectations are exact.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score an issue and run the baseline rule set over it.
///
/// Any internal failure (degenerate scores, a rule that cannot be applied)
/// surfaces as [`EvaluationError`]; the dispatcher treats that as
/// "uncertain" and forces manual handling rather than guessing.
pub fn evaluate_issue(issue: &Issue, assessor: &Assessor) -> Result<Evaluation, EvaluationError> {
    let (complexity, confidence, risk) = assessor.assess(issue);

    for (name, axis) in [("complexity", &complexity), ("confidence", &confidence)] {
        if !axis.score.is_finite() {
            return Err(EvaluationError::AssessorFailed {
                issue_id: issue.id.clone(),
                message: format!("{} score is not finite", name),
            });
        }
    }
    if !risk.score.is_finite() {
        return Err(EvaluationError::AssessorFailed {
            issue_id: issue.id.clone(),
            message: "risk score is not finite".to_string(),
        });
    }

    let mut evaluation = Evaluation {
        complexity,
        confidence,
        risk,
        suitability: Suitability::Unknown,
        reasoning: Vec::new(),
        recommendations: BTreeSet::new(),
    };

    rules::run_rules(baseline_rules(), issue, &mut evaluation);
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        for s in &["low", "medium", "high"] {
            let parsed: Level = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<Level>().is_err());
    }

    #[test]
    fn test_suitability_roundtrip() {
        for s in &["high", "medium", "low", "unknown"] {
            let parsed: Suitability = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<Suitability>().is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.456), 0.46);
        assert_eq!(round2(0.454), 0.45);
        assert_eq!(round2(1.0), 1.0);
        assert_eq!(round2(0.005), 0.01);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Level::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&Suitability::Unknown).unwrap(),
            "\"unknown\""
        );
    }
}
