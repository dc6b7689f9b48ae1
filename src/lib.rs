pub mod client;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod protocol;
pub mod server;
pub mod session;
pub mod worker;
