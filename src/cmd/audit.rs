//! Audit-log inspection — `triage audit list` and `triage audit show`.

use std::path::Path;

use anyhow::Result;

use triage::audit::{AuditEvent, AuditLog};
use triage::config::TriageConfig;

use crate::AuditCommands;

pub fn cmd_audit(config_dir: &Path, command: &AuditCommands) -> Result<()> {
    let config = TriageConfig::load(config_dir)?;
    let path = config_dir.join(&config.audit.dir).join("events.jsonl");
    let events = AuditLog::read_file(&path)?;

    match command {
        AuditCommands::List => {
            if events.is_empty() {
                println!("No audit events at {}", path.display());
                return Ok(());
            }
            for event in &events {
                print_event(event);
            }
        }
        AuditCommands::Show { job_id } => {
            let matched: Vec<_> = events
                .iter()
                .filter(|e| e.job_id == Some(*job_id))
                .collect();
            if matched.is_empty() {
                println!("No events for job {job_id}");
                return Ok(());
            }
            for event in matched {
                print_event(event);
                if !event.detail.is_null() {
                    println!("    {}", serde_json::to_string(&event.detail)?);
                }
            }
        }
    }
    Ok(())
}

fn print_event(event: &AuditEvent) {
    let job = event
        .job_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let issue = event.issue_ref.as_deref().unwrap_or("-");
    println!(
        "{}  {:<20}  job={job}  issue={issue}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.kind.as_str()
    );
}
