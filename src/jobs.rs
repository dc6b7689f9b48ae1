//! The job-execution collaborator seam.
//!
//! Job execution is an opaque transform from task bytes to result bytes that
//! may fail with a typed error. The server only ever talks to the trait; what
//! actually runs behind it is supplied at startup (or by tests).

use std::sync::Arc;

use crate::errors::job::{JobError, JobResult};

pub trait JobExecutor: Send + Sync {
    fn execute(&self, task: &[u8]) -> JobResult<Vec<u8>>;
}

/// Adapter turning any compatible closure into a `JobExecutor`.
pub struct FnExecutor<F>(F);

impl<F> FnExecutor<F>
where
    F: Fn(&[u8]) -> JobResult<Vec<u8>> + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self(transform)
    }
}

impl<F> JobExecutor for FnExecutor<F>
where
    F: Fn(&[u8]) -> JobResult<Vec<u8>> + Send + Sync,
{
    fn execute(&self, task: &[u8]) -> JobResult<Vec<u8>> {
        (self.0)(task)
    }
}

/// Stand-in transform shipped with the binary: reverses the task bytes and
/// refuses empty tasks with a typed failure, which exercises the
/// failure-reconciliation path end to end.
pub fn stand_in_executor() -> Arc<dyn JobExecutor> {
    Arc::new(FnExecutor::new(|task: &[u8]| {
        if task.is_empty() {
            return Err(JobError::new(1, "empty task payload"));
        }
        Ok(task.iter().rev().copied().collect())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stand_in_reverses_bytes() {
        let executor = stand_in_executor();
        assert_eq!(executor.execute(b"abc").unwrap(), b"cba".to_vec());
    }

    #[test]
    fn stand_in_rejects_empty_tasks() {
        let executor = stand_in_executor();
        let err = executor.execute(b"").unwrap_err();
        assert_eq!(err.code, 1);
    }
}
