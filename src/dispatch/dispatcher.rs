//! The dispatcher: single owner of jobs from ingestion to terminal state.
//!
//! `evaluate_and_dispatch` is the one insertion point: dedup, evaluate,
//! decide, create the job, then either enqueue it or park it at the
//! approval gate. A periodic queue processor pulls ready jobs up to the
//! concurrency cap and spawns executors. Errors inside a job are recorded
//! on the job and never unwind into the dispatcher loop.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::adapters::SourceRegistry;
use crate::approval::{ApprovalGate, ApprovalResponse, format_request, parse_reply};
use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::config::TriageConfig;
use crate::dispatch::decision::{DispatchDecision, ExecutionMode, ExecutorKind, decide};
use crate::dispatch::job::{Job, JobStatus};
use crate::dispatch::queue::JobQueue;
use crate::errors::{ApprovalError, DispatchError};
use crate::evaluate::{
    AxisScore, Evaluation, Level, RiskScore, Suitability, evaluate_issue,
};
use crate::evaluate::assessor::Assessor;
use crate::evaluate::patterns::PatternLibrary;
use crate::exec::{
    ApprovalDisposition, AutonomousExecutor, ExecutionContext, Executor, HumanExecutor,
    HybridExecutor, StepRunner,
};
use crate::issue::{Issue, SourceType};
use crate::notify::{Notification, NotificationSink};

struct Inner {
    config: TriageConfig,
    assessor: Assessor,
    queue: AsyncMutex<JobQueue>,
    jobs: std::sync::Mutex<HashMap<Uuid, Job>>,
    seen: std::sync::Mutex<HashSet<(SourceType, String)>>,
    cancel_flags: std::sync::Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
    sources: SourceRegistry,
    gate: ApprovalGate,
    audit: AuditLog,
    notifier: Arc<dyn NotificationSink>,
    runner: Arc<dyn StepRunner>,
}

/// Cheaply cloneable handle; all state lives behind the `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        config: TriageConfig,
        sources: SourceRegistry,
        audit: AuditLog,
        notifier: Arc<dyn NotificationSink>,
        runner: Arc<dyn StepRunner>,
    ) -> Result<Self> {
        let assessor = Assessor::new(&config.scoring, PatternLibrary::standard());
        let queue = JobQueue::new(config.dispatch.max_concurrent_jobs);
        let dispatcher = Self {
            inner: Arc::new(Inner {
                config,
                assessor,
                queue: AsyncMutex::new(queue),
                jobs: std::sync::Mutex::new(HashMap::new()),
                seen: std::sync::Mutex::new(HashSet::new()),
                cancel_flags: std::sync::Mutex::new(HashMap::new()),
                sources,
                gate: ApprovalGate::new(),
                audit,
                notifier,
                runner,
            }),
        };
        dispatcher.seed_history()?;
        Ok(dispatcher)
    }

    /// Rebuild the assessor's similarity history from prior audit events.
    fn seed_history(&self) -> Result<()> {
        let events = self
            .inner
            .audit
            .read_all()
            .context("Failed to read audit log for history seeding")?;
        let mut seeded = 0usize;
        for event in events {
            let success = match event.kind {
                AuditKind::JobCompleted => true,
                AuditKind::JobFailed | AuditKind::JobError => false,
                _ => continue,
            };
            if let Some(text) = event.detail.get("issue_text").and_then(|v| v.as_str()) {
                self.inner.assessor.record_outcome(text, success);
                seeded += 1;
            }
        }
        if seeded > 0 {
            tracing::info!(outcomes = seeded, "seeded assessor history from audit log");
        }
        Ok(())
    }

    // ── Ingestion ───────────────────────────────────────────────────────

    /// Evaluate an issue and create exactly one job for it.
    ///
    /// Idempotent under at-least-once delivery: a `(source, id)` pair that
    /// was already dispatched is skipped with `DispatchError::DuplicateEvent`.
    pub async fn evaluate_and_dispatch(&self, issue: Issue) -> Result<Uuid, DispatchError> {
        let key = issue.event_key();
        if !self.inner.seen.lock().unwrap().insert(key.clone()) {
            self.audit(
                AuditEvent::new(
                    AuditKind::DuplicateSkipped,
                    serde_json::json!({"title": issue.title}),
                )
                .for_issue(issue_ref(&issue)),
            );
            return Err(DispatchError::DuplicateEvent {
                source_type: key.0,
                provider_id: key.1,
            });
        }
        self.dispatch_issue(issue).await
    }

    /// Create a fresh job for an issue whose previous job already reached a
    /// terminal state. The old job is never mutated.
    pub async fn redispatch(&self, job_id: Uuid) -> Result<Uuid, DispatchError> {
        let issue = {
            let jobs = self.inner.jobs.lock().unwrap();
            let job = jobs
                .get(&job_id)
                .ok_or(DispatchError::JobNotFound { id: job_id })?;
            if !job.status.is_terminal() {
                return Err(DispatchError::Other(anyhow::anyhow!(
                    "job {} is still {}; only terminal jobs can be redispatched",
                    job_id,
                    job.status
                )));
            }
            job.issue.clone()
        };
        self.dispatch_issue(issue).await
    }

    async fn dispatch_issue(&self, issue: Issue) -> Result<Uuid, DispatchError> {
        self.audit(
            AuditEvent::new(
                AuditKind::Ingested,
                serde_json::json!({"title": issue.title, "source": issue.source_type}),
            )
            .for_issue(issue_ref(&issue)),
        );

        // An evaluation failure is "uncertain", and uncertain always means a
        // human — never a silent autonomous dispatch.
        let (evaluation, decision) = match evaluate_issue(&issue, &self.inner.assessor) {
            Ok(evaluation) => {
                let decision = decide(&evaluation, &issue);
                (evaluation, decision)
            }
            Err(e) => {
                tracing::warn!(issue = %issue.id, error = %e, "evaluation failed, forcing human");
                (
                    uncertain_evaluation(&e.to_string()),
                    forced_human(&issue, &e.to_string()),
                )
            }
        };

        let job = Job::new(issue, evaluation, decision);
        let job_id = job.id;
        self.audit(
            AuditEvent::new(
                AuditKind::Dispatched,
                serde_json::json!({
                    "executor": job.decision.executor,
                    "mode": job.decision.mode,
                    "priority": job.decision.priority,
                    "approval_required": job.decision.approval_required,
                    "suitability": job.evaluation.suitability,
                    "complexity": job.evaluation.complexity.score,
                    "confidence": job.evaluation.confidence.score,
                    "risk": job.evaluation.risk.score,
                    "reason": job.decision.reason,
                }),
            )
            .for_job(job_id)
            .for_issue(issue_ref(&job.issue)),
        );
        tracing::info!(
            job_id = %job_id,
            issue = %job.issue.id,
            executor = %job.decision.executor,
            priority = %job.decision.priority,
            "dispatched"
        );

        if job.decision.approval_required {
            self.park_for_approval(job).await?;
        } else {
            self.inner.jobs.lock().unwrap().insert(job_id, job.clone());
            self.inner
                .queue
                .lock()
                .await
                .push(job_id, job.decision.priority);
        }
        Ok(job_id)
    }

    // ── Approval flow ───────────────────────────────────────────────────

    async fn park_for_approval(&self, mut job: Job) -> Result<(), DispatchError> {
        job.transition(JobStatus::AwaitingApproval)?;
        let job_id = job.id;
        let request = format_request(&job);
        self.inner.jobs.lock().unwrap().insert(job_id, job);

        let rx = self.inner.gate.request(job_id);
        self.audit(AuditEvent::new(AuditKind::ApprovalRequested, serde_json::Value::Null).for_job(job_id));
        if let Err(e) = self.inner.notifier.send(&request).await {
            tracing::warn!(job_id = %job_id, error = %e, "approval request notification failed");
        }

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let timeout = dispatcher.inner.config.approval_timeout();
            match dispatcher.inner.gate.wait(job_id, rx, timeout).await {
                Ok(response) => dispatcher.apply_approval(job_id, response).await,
                Err(ApprovalError::Timeout { .. }) => dispatcher.approval_timed_out(job_id).await,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "approval wait failed");
                }
            }
        });
        Ok(())
    }

    async fn apply_approval(&self, job_id: Uuid, response: ApprovalResponse) {
        self.audit(
            AuditEvent::new(
                AuditKind::ApprovalResolved,
                serde_json::json!({"response": match &response {
                    ApprovalResponse::Approve => "approve".to_string(),
                    ApprovalResponse::Reject(_) => "reject".to_string(),
                    ApprovalResponse::Modify(_) => "modify".to_string(),
                }}),
            )
            .for_job(job_id),
        );

        match response {
            ApprovalResponse::Approve | ApprovalResponse::Modify(_) => {
                let priority = {
                    let mut jobs = self.inner.jobs.lock().unwrap();
                    let Some(job) = jobs.get_mut(&job_id) else { return };
                    if let ApprovalResponse::Modify(instructions) = response {
                        job.approval_instructions = Some(instructions);
                    }
                    job.decision.priority
                };
                // The job stays awaiting_approval while it waits for an
                // execution slot; it enters executing when one frees.
                self.inner.queue.lock().await.push(job_id, priority);
                self.process_queue().await;
            }
            ApprovalResponse::Reject(reason) => {
                let summary = {
                    let mut jobs = self.inner.jobs.lock().unwrap();
                    let Some(job) = jobs.get_mut(&job_id) else { return };
                    if let Err(e) = job.transition(JobStatus::Failed) {
                        tracing::error!(job_id = %job_id, error = %e, "reject transition failed");
                        return;
                    }
                    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                    job.error = Some(format!("rejected by reviewer: {reason}"));
                    outcome_summary(job)
                };
                self.audit(
                    AuditEvent::new(AuditKind::JobFailed, serde_json::json!({"rejected": true}))
                        .for_job(job_id),
                );
                self.notify_outcome(job_id, summary).await;
            }
        }
    }

    async fn approval_timed_out(&self, job_id: Uuid) {
        let summary = {
            let mut jobs = self.inner.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&job_id) else { return };
            if let Err(e) = job.transition(JobStatus::ApprovalTimeout) {
                tracing::error!(job_id = %job_id, error = %e, "timeout transition failed");
                return;
            }
            job.error = Some("no approval response within the configured window".to_string());
            format!(
                "Approval for '{}' timed out after {}s; escalated for manual assignment.",
                job.issue.title, self.inner.config.dispatch.approval_timeout_secs
            )
        };
        self.audit(AuditEvent::new(AuditKind::ApprovalTimeout, serde_json::Value::Null).for_job(job_id));
        self.operator_alert(&summary, Some(job_id)).await;
    }

    /// Route a reviewer reply (`/approve <id>` etc.) to its parked job.
    pub fn resolve_approval(&self, text: &str) -> Result<Uuid, ApprovalError> {
        let (job_id, response) = parse_reply(text)?;
        self.inner.gate.resolve(job_id, response)?;
        Ok(job_id)
    }

    // ── Queue processing & execution ────────────────────────────────────

    /// Pull ready jobs up to the concurrency cap and spawn their executors.
    ///
    /// Boxed to break the async cycle: `run_job` awaits `process_queue`
    /// when a finished job frees a slot, and `process_queue` spawns
    /// `run_job` — with plain `async fn` the spawned future's `Send` bound
    /// cannot be inferred.
    pub fn process_queue(&self) -> futures::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            let ready = self.inner.queue.lock().await.take_ready();
            for job_id in ready {
                let dispatcher = self.clone();
                tokio::spawn(async move {
                    dispatcher.run_job(job_id).await;
                });
            }
        })
    }

    async fn run_job(&self, job_id: Uuid) {
        let cancel = Arc::new(AtomicBool::new(false));
        self.inner
            .cancel_flags
            .lock()
            .unwrap()
            .insert(job_id, cancel.clone());

        let job = {
            let mut jobs = self.inner.jobs.lock().unwrap();
            match jobs.get_mut(&job_id) {
                Some(job) => match job.transition(JobStatus::Executing) {
                    Ok(()) => Some(job.clone()),
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "cannot enter executing");
                        None
                    }
                },
                None => {
                    tracing::error!(job_id = %job_id, "queued job missing from job map");
                    None
                }
            }
        };
        let Some(job) = job else {
            // Release the slot this job was holding.
            self.inner.cancel_flags.lock().unwrap().remove(&job_id);
            self.inner.queue.lock().await.finish(job_id);
            return;
        };
        self.audit(
            AuditEvent::new(
                AuditKind::ExecutionStarted,
                serde_json::json!({"executor": job.decision.executor}),
            )
            .for_job(job_id)
            .for_issue(issue_ref(&job.issue)),
        );

        let mut ctx = ExecutionContext::for_job(&job, self.inner.config.step_timeout(), cancel);
        if job.decision.approval_required {
            ctx.approval = Some(match &job.approval_instructions {
                Some(instructions) => ApprovalDisposition::Modified(instructions.clone()),
                None => ApprovalDisposition::Approved,
            });
        }

        let executor: Box<dyn Executor> = match job.decision.executor {
            ExecutorKind::Autonomous => {
                Box::new(AutonomousExecutor::new(self.inner.runner.clone()))
            }
            ExecutorKind::Hybrid => Box::new(HybridExecutor::new(self.inner.runner.clone())),
            ExecutorKind::Human => Box::new(HumanExecutor::new(self.inner.notifier.clone())),
        };

        let outcome = executor.execute(&job, &ctx).await;
        self.finish_job(job_id, outcome).await;
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: Result<crate::exec::ExecutionResult, crate::errors::ExecutionError>,
    ) {
        if !self.inner.jobs.lock().unwrap().contains_key(&job_id) {
            self.inner.cancel_flags.lock().unwrap().remove(&job_id);
            self.inner.queue.lock().await.finish(job_id);
            return;
        }
        let (kind, summary, issue_text, success) = {
            let mut jobs = self.inner.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&job_id) else { return };
            let issue_text = job.issue.search_text();
            match outcome {
                Ok(result) => {
                    for step in &result.steps {
                        self.audit(
                            AuditEvent::new(
                                AuditKind::StepCompleted,
                                serde_json::json!({"step": step.step, "success": step.success}),
                            )
                            .for_job(job_id),
                        );
                    }
                    let success = result.success;
                    let to = if success {
                        JobStatus::Completed
                    } else {
                        JobStatus::Failed
                    };
                    if let Err(e) = job.transition(to) {
                        tracing::error!(job_id = %job_id, error = %e, "terminal transition failed");
                    }
                    job.result = Some(result);
                    let kind = if success {
                        AuditKind::JobCompleted
                    } else {
                        AuditKind::JobFailed
                    };
                    (kind, outcome_summary(job), issue_text, success)
                }
                Err(e) => {
                    if let Err(t) = job.transition(JobStatus::Error) {
                        tracing::error!(job_id = %job_id, error = %t, "error transition failed");
                    }
                    job.error = Some(e.to_string());
                    (AuditKind::JobError, outcome_summary(job), issue_text, false)
                }
            }
        };

        // Human handoffs say nothing about automatability; only executed
        // plans feed the similarity history.
        let executor = self
            .job(job_id)
            .map(|j| j.decision.executor)
            .unwrap_or(ExecutorKind::Human);
        if executor != ExecutorKind::Human {
            self.inner.assessor.record_outcome(&issue_text, success);
        }

        self.audit(
            AuditEvent::new(
                kind,
                serde_json::json!({"issue_text": issue_text, "success": success}),
            )
            .for_job(job_id),
        );
        tracing::info!(job_id = %job_id, outcome = %kind, "job finished");

        self.inner.cancel_flags.lock().unwrap().remove(&job_id);
        self.inner.queue.lock().await.finish(job_id);
        self.notify_outcome(job_id, summary).await;
        // A freed slot may unblock the next ready job immediately.
        self.process_queue().await;
    }

    /// Request cancellation; the plan runner stops before its next step.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.inner.cancel_flags.lock().unwrap().get(&job_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    // ── Polling ─────────────────────────────────────────────────────────

    /// One poll pass over every enabled source. Network calls run
    /// concurrently; dispatch and source-state updates stay sequential.
    pub async fn poll_sources(&self) {
        let polls = self
            .inner
            .sources
            .source_types()
            .into_iter()
            .filter(|t| self.inner.sources.is_enabled(*t))
            .filter_map(|t| self.inner.sources.get(t).map(|s| (t, s)))
            .map(|(source_type, source)| {
                let since = self.inner.sources.watermark(source_type);
                async move {
                    let started = chrono::Utc::now();
                    (source_type, started, source.poll(since).await)
                }
            });

        for (source_type, started, result) in futures::future::join_all(polls).await {
            match result {
                Ok(issues) => {
                    // The watermark moves only now; a failed poll retries
                    // the same window next cycle.
                    self.inner.sources.record_success(source_type, started);
                    for issue in issues {
                        match self.evaluate_and_dispatch(issue).await {
                            Ok(_) | Err(DispatchError::DuplicateEvent { .. }) => {}
                            Err(e) => {
                                tracing::error!(source = %source_type, error = %e, "dispatch failed")
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %source_type, error = %e, "poll failed");
                    if self.inner.sources.record_failure(source_type) {
                        self.audit(AuditEvent::new(
                            AuditKind::SourceDisabled,
                            serde_json::json!({"source": source_type}),
                        ));
                        self.operator_alert(
                            &format!(
                                "Source {source_type} disabled after {} consecutive failures; \
                                 re-enable it manually once the cause is fixed.",
                                self.inner.config.sources.failure_threshold
                            ),
                            None,
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Main loop: poll sources and drain the queue until shutdown.
    pub async fn run_forever(&self) {
        let mut interval = tokio::time::interval(self.inner.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.poll_sources().await;
            self.process_queue().await;
        }
    }

    // ── Observability accessors ─────────────────────────────────────────

    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.jobs.lock().unwrap().get(&job_id).cloned()
    }

    pub fn jobs_snapshot(&self) -> Vec<Job> {
        self.inner.jobs.lock().unwrap().values().cloned().collect()
    }

    pub async fn queue_depths(&self) -> [(crate::issue::Priority, usize); 4] {
        self.inner.queue.lock().await.depth_by_priority()
    }

    pub async fn executing_count(&self) -> usize {
        self.inner.queue.lock().await.executing_count()
    }

    pub fn pending_approvals(&self) -> usize {
        self.inner.gate.pending_count()
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.inner.sources
    }

    pub fn config(&self) -> &TriageConfig {
        &self.inner.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.inner.audit
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.inner.audit.append(&event) {
            tracing::error!(error = %e, "audit append failed");
        }
    }

    async fn operator_alert(&self, message: &str, job_id: Option<Uuid>) {
        self.audit({
            let event = AuditEvent::new(
                AuditKind::OperatorAlert,
                serde_json::json!({"message": message}),
            );
            match job_id {
                Some(id) => event.for_job(id),
                None => event,
            }
        });
        let notification = Notification {
            subject: "Operator attention needed".to_string(),
            body: message.to_string(),
        };
        if let Err(e) = self.inner.notifier.send(&notification).await {
            tracing::warn!(error = %e, "operator alert notification failed");
        }
    }

    /// Every dispatched issue gets an outcome message; silence is never an
    /// acceptable end state.
    async fn notify_outcome(&self, job_id: Uuid, summary: String) {
        let Some(job) = self.job(job_id) else { return };
        let notification = Notification {
            subject: format!("Outcome for '{}'", job.issue.title),
            body: summary,
        };
        if let Err(e) = self.inner.notifier.send(&notification).await {
            tracing::warn!(job_id = %job_id, error = %e, "outcome notification failed");
        }
    }
}

fn issue_ref(issue: &Issue) -> String {
    format!("{}/{}", issue.source_type, issue.id)
}

fn outcome_summary(job: &Job) -> String {
    match job.status {
        JobStatus::Completed => match &job.result {
            Some(result) if result.steps.is_empty() => {
                format!("Escalated: {}", result.summary)
            }
            Some(result) => format!("Fixed: {}", result.summary),
            None => "Fixed".to_string(),
        },
        JobStatus::Failed => format!(
            "Failed: {}",
            job.result
                .as_ref()
                .map(|r| r.summary.clone())
                .or_else(|| job.error.clone())
                .unwrap_or_else(|| "no details".to_string())
        ),
        JobStatus::Error => format!(
            "Failed with an internal error: {}",
            job.error.as_deref().unwrap_or("unknown")
        ),
        JobStatus::ApprovalTimeout => "Escalated: approval timed out".to_string(),
        _ => format!("Job is {}", job.status),
    }
}

fn uncertain_evaluation(reason: &str) -> Evaluation {
    let axis = AxisScore {
        score: 0.0,
        level: Level::Low,
        factors: BTreeMap::new(),
    };
    Evaluation {
        complexity: axis.clone(),
        confidence: axis,
        risk: RiskScore {
            score: 0.0,
            level: Level::Low,
        },
        suitability: Suitability::Unknown,
        reasoning: vec![format!("evaluation failed: {reason}")],
        recommendations: BTreeSet::new(),
    }
}

fn forced_human(issue: &Issue, reason: &str) -> DispatchDecision {
    DispatchDecision {
        executor: ExecutorKind::Human,
        mode: ExecutionMode::Manual,
        // A human still triages by the issue's own urgency; floor at medium
        // so an uncertain evaluation is never buried in the low lane.
        priority: issue.priority.max(crate::issue::Priority::Medium),
        approval_required: false,
        reason: format!("uncertain evaluation ({reason})"),
    }
}
