//! Ordered rule engine that converts scores into a suitability verdict.
//!
//! Rules are plain values — a name plus a predicate function — interpreted
//! by a fixed loop in declared order. A matching rule may overwrite the
//! running suitability, append reasoning, and union recommendations; a rule
//! flagged `final_verdict` stops evaluation immediately.
//!
//! The baseline set is declared safety-first: the security veto and the
//! high-complexity/high-risk veto run before the simple-fix shortcut can
//! finalize a high verdict, so a security-flagged issue that happens to
//! mention a typo is never auto-dispatched.

use std::sync::LazyLock;

use regex::Regex;

use crate::evaluate::{Evaluation, Level, Suitability};
use crate::issue::Issue;

/// What a single rule concluded about an issue.
#[derive(Debug, Default)]
pub struct RuleOutcome {
    pub matches: bool,
    pub suitability: Option<Suitability>,
    pub reasoning: Option<String>,
    pub recommendations: Vec<String>,
    /// Stop evaluating further rules when set.
    pub final_verdict: bool,
}

impl RuleOutcome {
    fn no_match() -> Self {
        Self::default()
    }
}

/// A named predicate → decision rule.
pub struct EvaluationRule {
    pub name: &'static str,
    pub evaluate: fn(&Issue, &Evaluation) -> RuleOutcome,
}

static SECURITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"security|vulnerab\w+|\binjection\b|\bxss\b|\bcsrf\b|auth(entication|orization)? bypass|leaked? (secret|token|credential)",
    )
    .unwrap()
});

static SIMPLE_FIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\btypos?\b|\bspelling\b|missing import|unresolved import|\blint\b|\bformat(ting)?\b")
        .unwrap()
});

static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"test\w* (is |are )?fail\w*|failing test|add (unit |integration )?tests?|test coverage|improve coverage")
        .unwrap()
});

static DOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\breadme\b|\bdocs?\b|\bdocumentation\b|doc comment|\bchangelog\b").unwrap()
});

fn security_issues(issue: &Issue, _eval: &Evaluation) -> RuleOutcome {
    let text = issue.search_text();
    let labeled = issue.has_label("security") || issue.has_label("vulnerability");
    if !labeled && !SECURITY_RE.is_match(&text) {
        return RuleOutcome::no_match();
    }
    RuleOutcome {
        matches: true,
        suitability: Some(Suitability::Low),
        reasoning: Some(
            "Security-sensitive issue: autonomous handling is disabled regardless of other scores"
                .to_string(),
        ),
        recommendations: vec!["Route to a security engineer for manual review".to_string()],
        final_verdict: true,
    }
}

fn high_complexity(_issue: &Issue, eval: &Evaluation) -> RuleOutcome {
    if eval.complexity.level != Level::High && eval.risk.level != Level::High {
        return RuleOutcome::no_match();
    }
    let which = if eval.complexity.level == Level::High {
        format!("complexity {:.2}", eval.complexity.score)
    } else {
        format!("risk {:.2}", eval.risk.score)
    };
    RuleOutcome {
        matches: true,
        suitability: Some(Suitability::Low),
        reasoning: Some(format!("Too complex or risky for automation ({})", which)),
        recommendations: vec!["Assign to an experienced engineer".to_string()],
        final_verdict: true,
    }
}

fn simple_fixes(issue: &Issue, eval: &Evaluation) -> RuleOutcome {
    let text = issue.search_text();
    if !SIMPLE_FIX_RE.is_match(&text) || eval.complexity.level != Level::Low {
        return RuleOutcome::no_match();
    }
    RuleOutcome {
        matches: true,
        suitability: Some(Suitability::High),
        reasoning: Some("Recognized simple-fix pattern with low complexity".to_string()),
        recommendations: vec!["Candidate for fully autonomous quick fix".to_string()],
        final_verdict: true,
    }
}

fn test_related(issue: &Issue, _eval: &Evaluation) -> RuleOutcome {
    let text = issue.search_text();
    if !TEST_RE.is_match(&text) {
        return RuleOutcome::no_match();
    }
    RuleOutcome {
        matches: true,
        suitability: Some(Suitability::High),
        reasoning: Some("Test-related work is well suited to automation".to_string()),
        recommendations: vec!["Run the full suite before and after the change".to_string()],
        final_verdict: false,
    }
}

fn documentation(issue: &Issue, _eval: &Evaluation) -> RuleOutcome {
    let text = issue.search_text();
    if !issue.has_label("documentation") && !DOC_RE.is_match(&text) {
        return RuleOutcome::no_match();
    }
    RuleOutcome {
        matches: true,
        suitability: Some(Suitability::Medium),
        reasoning: Some("Documentation change: low blast radius, review wording".to_string()),
        recommendations: vec!["Have a maintainer proofread the result".to_string()],
        final_verdict: false,
    }
}

/// The baseline rule set, in veto-first order.
pub fn baseline_rules() -> &'static [EvaluationRule] {
    static RULES: &[EvaluationRule] = &[
        EvaluationRule {
            name: "security-issues",
            evaluate: security_issues,
        },
        EvaluationRule {
            name: "high-complexity",
            evaluate: high_complexity,
        },
        EvaluationRule {
            name: "simple-fixes",
            evaluate: simple_fixes,
        },
        EvaluationRule {
            name: "test-related",
            evaluate: test_related,
        },
        EvaluationRule {
            name: "documentation",
            evaluate: documentation,
        },
    ];
    RULES
}

/// Interpret the rules in declared order, mutating the evaluation in place.
pub fn run_rules(rules: &[EvaluationRule], issue: &Issue, evaluation: &mut Evaluation) {
    for rule in rules {
        let outcome = (rule.evaluate)(issue, evaluation);
        if !outcome.matches {
            continue;
        }
        tracing::debug!(rule = rule.name, issue = %issue.id, "rule matched");
        if let Some(suitability) = outcome.suitability {
            evaluation.suitability = suitability;
        }
        if let Some(reason) = outcome.reasoning {
            evaluation.reasoning.push(format!("[{}] {}", rule.name, reason));
        }
        for rec in outcome.recommendations {
            evaluation.recommendations.insert(rec);
        }
        if outcome.final_verdict {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::evaluate::patterns::PatternLibrary;
    use crate::evaluate::{Assessor, evaluate_issue};
    use crate::issue::{IssueType, Priority, SourceType};
    use chrono::Utc;

    fn issue(title: &str, body: &str, labels: &[&str], issue_type: IssueType) -> Issue {
        Issue {
            id: "1".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            repository: "acme/widgets".to_string(),
            source_type: SourceType::Github,
            priority: Priority::Medium,
            issue_type,
            created_at: Utc::now(),
            url: String::new(),
        }
    }

    fn assessor() -> Assessor {
        Assessor::new(&ScoringConfig::default(), PatternLibrary::standard())
    }

    #[test]
    fn test_simple_fix_gets_high_suitability() {
        let issue = issue("Fix typo in README", "", &[], IssueType::Documentation);
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::High);
        assert!(eval.reasoning.iter().any(|r| r.contains("simple-fixes")));
    }

    #[test]
    fn test_security_veto_beats_simple_fix() {
        // A typo-looking title that is security-flagged must never come out
        // as high suitability.
        let issue = issue(
            "Fix typo in auth token handling",
            "",
            &["security"],
            IssueType::Bug,
        );
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::Low);
        assert!(eval.reasoning.iter().any(|r| r.contains("security-issues")));
        // The final flag stopped evaluation; simple-fixes never ran.
        assert!(!eval.reasoning.iter().any(|r| r.contains("simple-fixes")));
    }

    #[test]
    fn test_security_text_fires_without_label() {
        let issue = issue(
            "Possible SQL injection in login",
            "",
            &[],
            IssueType::Bug,
        );
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::Low);
    }

    #[test]
    fn test_high_complexity_vetoes() {
        let body = "Rewrite the distributed cache architecture. The migration spans multiple \
                    files across all modules and requires async transaction handling in the \
                    database schema layer, plus memory usage work."
            .repeat(5);
        let issue = issue("Redesign storage layer", &body, &[], IssueType::Feature);
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::Low);
        assert!(eval.reasoning.iter().any(|r| r.contains("high-complexity")));
    }

    #[test]
    fn test_test_related_sets_high_non_final() {
        let issue = issue(
            "Integration tests are failing on main",
            "Two checkout tests fail intermittently.",
            &[],
            IssueType::Testing,
        );
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::High);
        assert!(eval.reasoning.iter().any(|r| r.contains("test-related")));
    }

    #[test]
    fn test_documentation_label_sets_medium() {
        let issue = issue(
            "Clarify the module layout description for the scheduler",
            "The overview section mixes up the worker pool and the queue processor. \
             Rewording the second paragraph and the table underneath should be enough.",
            &["documentation"],
            IssueType::Documentation,
        );
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::Medium);
    }

    #[test]
    fn test_no_rule_match_stays_unknown() {
        let issue = issue(
            "Widget sometimes looks odd",
            "Noticed on Tuesday.",
            &[],
            IssueType::General,
        );
        let eval = evaluate_issue(&issue, &assessor()).unwrap();
        assert_eq!(eval.suitability, Suitability::Unknown);
        assert!(eval.reasoning.is_empty());
    }

    #[test]
    fn test_rule_order_is_veto_first() {
        let names: Vec<&str> = baseline_rules().iter().map(|r| r.name).collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("security-issues") < pos("simple-fixes"));
        assert!(pos("high-complexity") < pos("simple-fixes"));
    }
}
