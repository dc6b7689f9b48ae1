mod pool;

pub use pool::{Job, WorkerPool};
