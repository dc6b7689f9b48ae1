/// Point-in-time snapshot of the resource ledger, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub available_memory: u64,
    pub pending_tasks: u64,
}
