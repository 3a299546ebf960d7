//! Maps an evaluation onto an executor choice, mode, priority, and
//! approval requirement.
//!
//! The safety invariant lives here: anything the rule engine could not
//! confidently classify falls through to manual handling with an explicit
//! reason — the system never silently auto-dispatches an uncertain issue.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::evaluate::{Evaluation, Level, Suitability};
use crate::issue::{Issue, IssueType, Priority};

/// Which backend handles the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Autonomous,
    Hybrid,
    Human,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Autonomous => "autonomous",
            Self::Hybrid => "hybrid",
            Self::Human => "human",
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(Self::Autonomous),
            "hybrid" => Ok(Self::Hybrid),
            "human" => Ok(Self::Human),
            _ => Err(format!("Invalid executor kind: {}", s)),
        }
    }
}

/// How much oversight execution gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Autonomous,
    Supervised,
    Manual,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Autonomous => "autonomous",
            Self::Supervised => "supervised",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "autonomous" => Ok(Self::Autonomous),
            "supervised" => Ok(Self::Supervised),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid execution mode: {}", s)),
        }
    }
}

/// The dispatch verdict, frozen onto the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub executor: ExecutorKind,
    pub mode: ExecutionMode,
    pub priority: Priority,
    pub approval_required: bool,
    /// Human-readable justification for the chosen arm.
    pub reason: String,
}

/// Map an evaluation onto a dispatch decision.
pub fn decide(evaluation: &Evaluation, issue: &Issue) -> DispatchDecision {
    let confidence = evaluation.confidence.level;
    let risk = evaluation.risk.level;

    let (executor, mode, approval_required, reason) = match evaluation.suitability {
        Suitability::High if confidence == Level::High && risk == Level::Low => (
            ExecutorKind::Autonomous,
            ExecutionMode::Autonomous,
            false,
            "high suitability, high confidence, low risk".to_string(),
        ),
        Suitability::Medium if confidence == Level::Medium => (
            ExecutorKind::Hybrid,
            ExecutionMode::Supervised,
            true,
            "medium suitability and confidence: supervised execution with approval".to_string(),
        ),
        Suitability::Low => (
            ExecutorKind::Human,
            ExecutionMode::Manual,
            false,
            "low suitability".to_string(),
        ),
        _ if risk == Level::High => (
            ExecutorKind::Human,
            ExecutionMode::Manual,
            false,
            format!("high risk ({:.2})", evaluation.risk.score),
        ),
        other => (
            ExecutorKind::Human,
            ExecutionMode::Manual,
            false,
            format!(
                "uncertain evaluation (suitability={}, confidence={}, risk={}): refusing to auto-dispatch",
                other, confidence, risk
            ),
        ),
    };

    DispatchDecision {
        executor,
        mode,
        priority: calculate_priority(evaluation, issue),
        approval_required,
        reason,
    }
}

/// Priority escalation on top of the issue's own priority.
fn calculate_priority(evaluation: &Evaluation, issue: &Issue) -> Priority {
    let mut priority = issue.priority;

    if evaluation.risk.level == Level::High {
        priority = priority.max(Priority::High);
    }
    // Favor fast, safe wins: low-complexity medium-priority work jumps the
    // medium queue.
    if evaluation.complexity.level == Level::Low && priority == Priority::Medium {
        priority = Priority::High;
    }
    if issue.issue_type == IssueType::Bug && issue.has_label("production") {
        priority = Priority::Critical;
    }

    priority
}
