use serde::Deserialize;

pub const DEFAULT_MEMORY_BUDGET: u64 = 1024 * 1024 * 1024; // 1 GiB

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub resources: ResourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResourceConfig {
    pub memory_budget: u64,
    pub max_task_size: u64, // payloads above this are a protocol error
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("APP"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            worker: WorkerConfig { worker_count: 4 },
            resources: ResourceConfig {
                memory_budget: DEFAULT_MEMORY_BUDGET,
                max_task_size: DEFAULT_MEMORY_BUDGET,
            },
        }
    }
}
