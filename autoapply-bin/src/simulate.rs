//! Dry-run driver: a simulated workflow executor plus synthetic postings.
//!
//! No browser ever launches; the simulator exercises the real engine
//! (budgets, throttling, retries, digests) against randomized workflow
//! outcomes so that a configuration can be validated before any live run.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use uuid::Uuid;

use autoapply_lib::{
    EffortLevel, JobMetadata, Task, Usage, WorkflowError, WorkflowExecutor, WorkflowOutcome,
};

/// Fictional destinations the simulated batch spreads across
const SAMPLE_DOMAINS: &[&str] = &[
    "boards.acme.example",
    "careers.initech.example",
    "jobs.globex.example",
    "apply.umbrella.example",
];

/// Sample job titles for synthetic postings
const SAMPLE_TITLES: &[&str] = &[
    "Backend Engineer",
    "Platform Engineer",
    "Site Reliability Engineer",
    "Data Engineer",
    "Staff Software Engineer",
];

/// A workflow executor that fakes application runs.
///
/// Outcomes are randomized: most applications succeed, some fail
/// transiently (and exercise the retry path), a few are rejected outright.
/// Token usage scales with the requested effort level.
#[derive(Debug)]
pub(crate) struct SimulatedExecutor {
    /// Upper bound of the simulated per-application work time
    pub(crate) work_time: Duration,
}

#[async_trait]
impl WorkflowExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        task: &Task,
        effort: EffortLevel,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let (work, roll) = {
            let mut rng = rand::rng();
            (
                rng.random_range(Duration::ZERO..=self.work_time),
                rng.random_range(0..100_u32),
            )
        };
        tokio::time::sleep(work).await;

        match roll {
            // Transient provider hiccup; the pool retries this
            0..=9 => Err(WorkflowError::ProviderUnavailable(format!(
                "simulated 502 from {}",
                task.url.host_str().unwrap_or("unknown")
            ))),
            10..=14 => Err(WorkflowError::Rejected(
                "simulated duplicate application".into(),
            )),
            _ => {
                let (tokens_input, tokens_output): (u32, u32) = match effort {
                    EffortLevel::Low => (400, 80),
                    EffortLevel::Medium => (1_500, 350),
                    EffortLevel::High => (4_000, 1_200),
                };
                Ok(WorkflowOutcome {
                    effort,
                    usage: Usage {
                        tokens_input: u64::from(tokens_input),
                        tokens_output: u64::from(tokens_output),
                        cost_estimated: f64::from(tokens_input + 3 * tokens_output) * 1e-6,
                    },
                })
            }
        }
    }
}

/// Build a synthetic batch of tasks spread over the sample domains
pub(crate) fn sample_tasks(session_id: Uuid, count: usize) -> Vec<Task> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let domain = SAMPLE_DOMAINS[i % SAMPLE_DOMAINS.len()];
            let title = SAMPLE_TITLES[i % SAMPLE_TITLES.len()];
            Task::builder()
                .session_id(session_id)
                .url(format!("https://{domain}/postings/{}", i + 1)
                    .parse()
                    .expect("sample URL is valid"))
                .job(JobMetadata {
                    title: title.to_string(),
                    company: domain
                        .split('.')
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string(),
                    match_score: Some(rng.random_range(0.3..1.0)),
                    keyword_overlap: Some(rng.random_range(0..12)),
                })
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_tasks_spread_domains() {
        let tasks = sample_tasks(Uuid::new_v4(), 8);
        assert_eq!(tasks.len(), 8);

        let domains: std::collections::HashSet<_> = tasks
            .iter()
            .map(|t| t.url.host_str().unwrap().to_string())
            .collect();
        assert_eq!(domains.len(), SAMPLE_DOMAINS.len());
    }
}
