use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use super::pool::{Job, WorkerContext};
use crate::executor::{WorkflowError, WorkflowOutcome};
use crate::rules::EffortDecision;
use crate::types::{EffortLevel, Task, TaskResult};

/// One attempt's failure, as seen by the retry loop.
enum AttemptError {
    /// The workflow itself reported a failure
    Workflow(WorkflowError),
    /// The attempt exceeded the per-attempt deadline
    Timeout,
    /// The workflow panicked or was torn down mid-flight
    Crashed(String),
}

/// Long-lived worker loop: pull a job, process it, register the result,
/// answer the submitter. Exits when the queue closes.
pub(super) async fn run(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    ctx: Arc<WorkerContext>,
) {
    log::debug!("worker {worker_id} started");
    loop {
        // Hold the queue lock only while waiting for the next job; task
        // execution happens outside it so workers run in parallel
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        let result = process(worker_id, &ctx, job.task).await;

        // Register before answering so that a completed batch implies
        // fully updated session counters
        if let Err(e) = ctx.controller.register_result(&result).await {
            log::warn!(
                "worker {worker_id}: failed to register result for task {}: {e}",
                result.application_id
            );
        }
        // The submitter may have gone away; that is fine
        let _ = job.reply.send(result);
    }
    log::debug!("worker {worker_id} stopped");
}

/// Process one task end to end: budget check, effort rules, throttle
/// admission, workflow execution with retry, result construction.
async fn process(worker_id: usize, ctx: &WorkerContext, task: Task) -> TaskResult {
    log::info!(
        "worker {worker_id}: starting application {} ({})",
        task.application_id,
        task.url
    );

    let effort = match ctx.rules.evaluate(&task) {
        EffortDecision::Proceed(effort) => effort,
        EffortDecision::Skip(reason) => {
            log::info!(
                "worker {worker_id}: task {} skipped by rule: {reason}",
                task.application_id
            );
            return TaskResult::skipped(&task, reason);
        }
    };

    let domain = match task.domain() {
        Ok(domain) => domain,
        Err(e) => {
            return TaskResult::skipped(&task, format!("invalid destination: {e}"));
        }
    };

    // Reserve session budget before touching the destination. A session
    // that is stopped, paused, or fully committed admits nothing, so a
    // batch wider than the remaining budget cannot overrun it.
    match ctx.controller.try_admit(task.session_id).await {
        Ok(true) => {}
        Ok(false) => {
            return TaskResult::skipped(&task, "session is not accepting tasks".into());
        }
        Err(e) => {
            return TaskResult::skipped(&task, e.to_string());
        }
    }

    // All throttle checks and the slot claim in one critical section; the
    // guard's drop releases the slot on every path below
    let guard = match ctx.throttle.acquire(&domain) {
        Ok(guard) => guard,
        Err(denial) => {
            log::info!("worker {worker_id}: {domain} denied: {denial}");
            // The reservation will not turn into a counted result
            ctx.controller.cancel_admission(task.session_id).await;
            return TaskResult::skipped(&task, denial.to_string());
        }
    };

    let result = execute_with_retry(worker_id, ctx, &task, effort).await;
    guard.release();
    result
}

/// Run the workflow, retrying transient failures with exponential backoff
/// up to the policy's attempt cap.
async fn execute_with_retry(
    worker_id: usize,
    ctx: &WorkerContext,
    task: &Task,
    effort: EffortLevel,
) -> TaskResult {
    let mut attempt: u32 = 1;
    loop {
        match execute_once(ctx, task, effort).await {
            Ok(outcome) => {
                log::info!(
                    "worker {worker_id}: application {} submitted (attempt {attempt})",
                    task.application_id
                );
                return TaskResult::success(task, outcome.effort, outcome.usage, attempt);
            }
            Err(AttemptError::Workflow(e)) if !e.is_transient() => {
                log::info!(
                    "worker {worker_id}: application {} failed permanently: {e}",
                    task.application_id
                );
                return TaskResult::failed(task, effort, attempt, e.to_string());
            }
            Err(AttemptError::Crashed(detail)) => {
                // Contained at the task boundary; the worker and the rest
                // of the pool keep running
                log::error!(
                    "worker {worker_id}: application {} crashed: {detail}",
                    task.application_id
                );
                return TaskResult::error(task, effort, attempt, detail);
            }
            Err(transient) => {
                let detail = match &transient {
                    AttemptError::Workflow(e) => e.to_string(),
                    AttemptError::Timeout => {
                        format!("attempt timed out after {:?}", ctx.task_timeout)
                    }
                    AttemptError::Crashed(_) => unreachable!("handled above"),
                };
                if !ctx.retry.allows_retry(attempt) {
                    log::warn!(
                        "worker {worker_id}: application {} gave up after {attempt} attempts: {detail}",
                        task.application_id
                    );
                    return TaskResult::error(
                        task,
                        effort,
                        attempt,
                        format!("retries exhausted after {attempt} attempts: {detail}"),
                    );
                }
                let delay = ctx.retry.delay_for(attempt);
                log::debug!(
                    "worker {worker_id}: application {} attempt {attempt} failed ({detail}), retrying in {delay:?}",
                    task.application_id
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// One bounded workflow attempt on its own task, so that a panic or abort
/// inside the workflow never unwinds into the worker loop.
async fn execute_once(
    ctx: &WorkerContext,
    task: &Task,
    effort: EffortLevel,
) -> Result<WorkflowOutcome, AttemptError> {
    let executor = Arc::clone(&ctx.executor);
    let task = task.clone();
    let mut handle = tokio::spawn(async move { executor.execute(&task, effort).await });

    match timeout(ctx.task_timeout, &mut handle).await {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(workflow_error))) => Err(AttemptError::Workflow(workflow_error)),
        Ok(Err(join_error)) => {
            let detail = if join_error.is_panic() {
                format!("workflow panicked: {join_error}")
            } else {
                format!("workflow cancelled: {join_error}")
            };
            Err(AttemptError::Crashed(detail))
        }
        Err(_elapsed) => {
            handle.abort();
            Err(AttemptError::Timeout)
        }
    }
}
