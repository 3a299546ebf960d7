//! Human executor: records an assignment and hands the issue off.
//!
//! Success here means "successfully handed off", not "resolved" — the
//! underlying human work is tracked externally.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::job::Job;
use crate::errors::ExecutionError;
use crate::exec::{ExecutionContext, ExecutionResult, Executor};
use crate::notify::{Notification, NotificationSink};

pub struct HumanExecutor {
    notifier: Arc<dyn NotificationSink>,
}

impl HumanExecutor {
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Executor for HumanExecutor {
    async fn execute(
        &self,
        job: &Job,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let notification = Notification {
            subject: format!("Manual assignment: {}", job.issue.title),
            body: format!(
                "Issue {} ({}) needs a human.\nRepository: {}\nReason: {}\nReasoning:\n{}",
                job.issue.id,
                job.issue.url,
                job.issue.repository,
                job.decision.reason,
                job.evaluation.reasoning.join("\n"),
            ),
        };
        self.notifier
            .send(&notification)
            .await
            .map_err(ExecutionError::Other)?;

        tracing::info!(job_id = %job.id, issue = %job.issue.id, "handed off to human");
        Ok(ExecutionResult::handed_off(format!(
            "assigned to a human: {}",
            job.decision.reason
        )))
    }
}
