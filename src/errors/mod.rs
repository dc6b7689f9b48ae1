// Defines the crate error taxonomy and result aliases using thiserror.
use thiserror::Error;

pub mod job;

// Re-export commonly used types
pub use job::{JobError, JobResult};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    // The #[from] attribute converts socket and file faults into AppError::Io.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

// Custom result type
pub type AppResult<T> = Result<T, AppError>;
