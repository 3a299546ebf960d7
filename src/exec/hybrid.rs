//! Hybrid (supervised) executor.
//!
//! Behaves like the autonomous executor but only runs once the approval
//! gate has granted `approve`; a `modify` response feeds its instructions
//! into the execution context before the plan starts. A `reject` never
//! reaches this executor — the dispatcher fails the job at the gate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::job::Job;
use crate::errors::ExecutionError;
use crate::exec::plan::{build_plan, run_plan};
use crate::exec::{
    ApprovalDisposition, ExecutionContext, ExecutionResult, Executor, StepRunner,
};

pub struct HybridExecutor {
    runner: Arc<dyn StepRunner>,
}

impl HybridExecutor {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Executor for HybridExecutor {
    async fn execute(
        &self,
        job: &Job,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut ctx = ctx.clone();
        match &ctx.approval {
            Some(ApprovalDisposition::Approved) => {}
            Some(ApprovalDisposition::Modified(instructions)) => {
                ctx.constraints
                    .push(format!("reviewer instructions: {}", instructions));
            }
            None => return Err(ExecutionError::MissingApproval),
        }

        let plan = build_plan(job.issue.issue_type);
        tracing::info!(
            job_id = %job.id,
            branch = %ctx.branch_name,
            steps = plan.len(),
            "starting supervised plan"
        );
        run_plan(&plan, &ctx, self.runner.as_ref()).await
    }
}
