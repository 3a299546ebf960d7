//! Fully autonomous executor: builds the step plan for the issue type and
//! runs it to completion or first failure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::job::Job;
use crate::errors::ExecutionError;
use crate::exec::plan::{build_plan, run_plan};
use crate::exec::{ExecutionContext, ExecutionResult, Executor, StepRunner};

pub struct AutonomousExecutor {
    runner: Arc<dyn StepRunner>,
}

impl AutonomousExecutor {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Executor for AutonomousExecutor {
    async fn execute(
        &self,
        job: &Job,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let plan = build_plan(job.issue.issue_type);
        tracing::info!(
            job_id = %job.id,
            branch = %ctx.branch_name,
            steps = plan.len(),
            "starting autonomous plan"
        );
        run_plan(&plan, ctx, self.runner.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::decision::ExecutorKind;
    use crate::exec::SimulatedRunner;
    use crate::exec::plan::StepKind;
    use crate::exec::testing::sample_job;
    use crate::issue::IssueType;

    fn job(issue_type: IssueType) -> Job {
        sample_job(issue_type, ExecutorKind::Autonomous)
    }

    #[tokio::test]
    async fn test_runs_full_plan() {
        let executor = AutonomousExecutor::new(Arc::new(SimulatedRunner::default()));
        let job = job(IssueType::Bug);
        let ctx = ExecutionContext::for_tests();
        let result = executor.execute(&job, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.steps.len(), 5);
        assert_eq!(result.steps.last().unwrap().step, StepKind::CreatePr);
    }

    #[tokio::test]
    async fn test_failure_preserves_partial_results() {
        let executor =
            AutonomousExecutor::new(Arc::new(SimulatedRunner::failing_on(StepKind::FullTestSuite)));
        let job = job(IssueType::Documentation);
        let ctx = ExecutionContext::for_tests();
        let result = executor.execute(&job, &ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failed_step, Some(StepKind::FullTestSuite));
        assert_eq!(result.steps.len(), 1); // write_docs completed
    }
}
