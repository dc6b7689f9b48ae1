use thiserror::Error;

/// Typed failure reported by the job-execution collaborator.
///
/// The executor is an opaque transform; the only structured information a
/// failed job carries is a numeric code and a message. Handlers catch this at
/// the task boundary and substitute an empty result, they never propagate it
/// onto the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("job failed with code {code}: {message}")]
pub struct JobError {
    pub code: i32,
    pub message: String,
}

impl JobError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
