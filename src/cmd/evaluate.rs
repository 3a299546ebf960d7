//! Dry-run evaluation of a canonical issue — `triage evaluate <file>`.

use std::path::Path;

use anyhow::{Context, Result};

use triage::config::TriageConfig;
use triage::dispatch::decide;
use triage::evaluate::{Assessor, PatternLibrary, evaluate_issue};
use triage::issue::Issue;

/// Evaluate an issue from a JSON file and print the scores and the
/// decision that would be made, without creating a job.
pub fn cmd_evaluate(config_dir: &Path, file: &Path) -> Result<()> {
    let config = TriageConfig::load(config_dir)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let issue: Issue = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as an issue", file.display()))?;

    let assessor = Assessor::new(&config.scoring, PatternLibrary::standard());
    let evaluation =
        evaluate_issue(&issue, &assessor).map_err(|e| anyhow::anyhow!("Evaluation failed: {e}"))?;
    let decision = decide(&evaluation, &issue);

    let report = serde_json::json!({
        "issue": issue,
        "evaluation": evaluation,
        "decision": decision,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
