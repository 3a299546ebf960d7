//! End-to-end pipeline tests: ingestion through dispatch to execution,
//! exercised against the public crate surface and the CLI binary.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use triage::adapters::{MonitoringSource, SourceRegistry, sign_body};
use triage::audit::AuditLog;
use triage::config::TriageConfig;
use triage::dispatch::{Dispatcher, ExecutorKind, Job, JobStatus};
use triage::exec::SimulatedRunner;
use triage::issue::{Issue, IssueType, Priority, SourceType};

fn test_issue(id: &str, title: &str) -> Issue {
    Issue {
        id: id.to_string(),
        title: title.to_string(),
        body: String::new(),
        labels: vec![],
        repository: "acme/widgets".to_string(),
        source_type: SourceType::Github,
        priority: Priority::Medium,
        issue_type: IssueType::Documentation,
        created_at: chrono::Utc::now(),
        url: String::new(),
    }
}

fn supervised_issue(id: &str) -> Issue {
    let mut issue = test_issue(id, "Clarify the scheduler overview section");
    issue.body = "The overview section mixes up the worker pool and the queue \
                  processor. Rewording the second paragraph should be enough."
        .to_string();
    issue.labels = vec!["documentation".to_string()];
    issue
}

fn build_dispatcher(
    config: TriageConfig,
    runner: Arc<SimulatedRunner>,
) -> (Dispatcher, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut sources = SourceRegistry::new(config.sources.failure_threshold);
    sources.register(Arc::new(MonitoringSource::new()));
    let dispatcher = Dispatcher::new(
        config,
        sources,
        AuditLog::open(dir.path()).unwrap(),
        Arc::new(triage::notify::LogSink),
        runner,
    )
    .unwrap();
    (dispatcher, dir)
}

async fn wait_terminal(dispatcher: &Dispatcher, job_id: Uuid) -> Job {
    for _ in 0..500 {
        if let Some(job) = dispatcher.job(job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

// ── Dispatch pipeline ─────────────────────────────────────────────────

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn test_concurrency_limit_is_never_exceeded() {
        let mut config = TriageConfig::default();
        config.dispatch.max_concurrent_jobs = 2;
        let runner = Arc::new(SimulatedRunner::with_delay(Duration::from_millis(50)));
        let (dispatcher, _dir) = build_dispatcher(config, runner);

        let mut job_ids = Vec::new();
        for i in 0..5 {
            let id = dispatcher
                .evaluate_and_dispatch(test_issue(&i.to_string(), "Fix typo in README"))
                .await
                .unwrap();
            assert_eq!(
                dispatcher.job(id).unwrap().decision.executor,
                ExecutorKind::Autonomous
            );
            job_ids.push(id);
        }

        dispatcher.process_queue().await;
        let mut max_executing = 0;
        loop {
            max_executing = max_executing.max(dispatcher.executing_count().await);
            let done = job_ids
                .iter()
                .filter(|id| dispatcher.job(**id).unwrap().status.is_terminal())
                .count();
            if done == job_ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(max_executing <= 2, "observed {max_executing} concurrent jobs");
        for id in job_ids {
            assert_eq!(dispatcher.job(id).unwrap().status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_approval_gate_cannot_be_bypassed() {
        let runner = Arc::new(SimulatedRunner::default());
        let (dispatcher, _dir) = build_dispatcher(TriageConfig::default(), runner.clone());

        let job_id = dispatcher
            .evaluate_and_dispatch(supervised_issue("1"))
            .await
            .unwrap();
        let job = dispatcher.job(job_id).unwrap();
        assert!(job.decision.approval_required);
        assert_eq!(job.status, JobStatus::AwaitingApproval);

        // Queue processing must not pick up an unapproved job.
        dispatcher.process_queue().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            dispatcher.job(job_id).unwrap().status,
            JobStatus::AwaitingApproval
        );
        assert_eq!(runner.calls(), 0, "steps ran before approval");
        assert_eq!(dispatcher.executing_count().await, 0);

        dispatcher
            .resolve_approval(&format!("/approve {job_id}"))
            .unwrap();
        let job = wait_terminal(&dispatcher, job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(runner.calls() > 0);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let runner = Arc::new(SimulatedRunner::default());
        let (dispatcher, _dir) = build_dispatcher(TriageConfig::default(), runner);

        let issue = test_issue("7", "Fix typo in README");
        let job_id = dispatcher.evaluate_and_dispatch(issue.clone()).await.unwrap();
        dispatcher.process_queue().await;
        wait_terminal(&dispatcher, job_id).await;

        // Re-delivery of the same provider event, even after completion,
        // never creates a second job.
        assert!(dispatcher.evaluate_and_dispatch(issue).await.is_err());
        assert_eq!(dispatcher.jobs_snapshot().len(), 1);
    }
}

// ── Webhook ingestion over HTTP ───────────────────────────────────────

mod webhook {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use triage::server::{AppState, build_router};

    const SECRET: &str = "pipeline-test-secret";

    fn alert_payload() -> Vec<u8> {
        serde_json::json!({
            "alerts": [{
                "status": "firing",
                "fingerprint": "abc123",
                "labels": {
                    "alertname": "HighErrorRate",
                    "severity": "warning",
                    "service": "checkout"
                },
                "annotations": {
                    "summary": "Error rate above 5% on checkout",
                    "description": "The error budget burn rate tripled."
                },
                "startsAt": "2026-08-01T10:00:00Z",
                "generatorURL": "https://prometheus.internal/graph"
            }]
        })
        .to_string()
        .into_bytes()
    }

    async fn post_alert(router: axum::Router, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let signature = sign_body(SECRET, &body);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/monitoring")
                    .header("content-type", "application/json")
                    .header("x-hub-signature-256", signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_duplicate_webhook_delivery_creates_one_job() {
        let mut config = TriageConfig::default();
        config.webhook_secret = Some(SECRET.to_string());
        let runner = Arc::new(SimulatedRunner::default());
        let (dispatcher, _dir) = build_dispatcher(config, runner);
        let state = Arc::new(AppState {
            dispatcher: dispatcher.clone(),
        });

        let (status, body) = post_alert(build_router(state.clone()), alert_payload()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 1);
        assert_eq!(body["duplicates"], 0);

        let (status, body) = post_alert(build_router(state), alert_payload()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["accepted"], 0);
        assert_eq!(body["duplicates"], 1);
        assert_eq!(dispatcher.jobs_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_rejected() {
        let mut config = TriageConfig::default();
        config.webhook_secret = Some(SECRET.to_string());
        let runner = Arc::new(SimulatedRunner::default());
        let (dispatcher, _dir) = build_dispatcher(config, runner);
        let state = Arc::new(AppState { dispatcher });

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/monitoring")
                    .header("content-type", "application/json")
                    .body(Body::from(alert_payload()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// ── CLI binary ────────────────────────────────────────────────────────

mod cli {
    use assert_cmd::Command;
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn triage() -> Command {
        cargo_bin_cmd!("triage")
    }

    #[test]
    fn test_help() {
        triage().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        triage().arg("--version").assert().success();
    }

    #[test]
    fn test_evaluate_prints_decision() {
        let dir = TempDir::new().unwrap();
        let issue = serde_json::json!({
            "id": "1",
            "title": "Fix typo in README",
            "body": "",
            "labels": [],
            "repository": "acme/widgets",
            "source_type": "github",
            "priority": "medium",
            "type": "documentation",
            "created_at": "2026-08-01T00:00:00Z",
            "url": ""
        });
        let path = dir.path().join("issue.json");
        std::fs::write(&path, serde_json::to_string_pretty(&issue).unwrap()).unwrap();

        triage()
            .current_dir(dir.path())
            .arg("evaluate")
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"executor\": \"autonomous\""));
    }

    #[test]
    fn test_evaluate_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        triage()
            .current_dir(dir.path())
            .arg("evaluate")
            .arg("no-such-issue.json")
            .assert()
            .failure();
    }

    #[test]
    fn test_audit_list_without_log() {
        let dir = TempDir::new().unwrap();
        triage()
            .current_dir(dir.path())
            .args(["audit", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No audit events"));
    }
}
