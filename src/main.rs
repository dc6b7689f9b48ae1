use anyhow::Context;
use offload_server::config::Config;
use offload_server::jobs;
use offload_server::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize basic tracing subscriber
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // The job transform is an external collaborator; the binary ships a
    // stand-in implementation behind the same trait.
    let executor = jobs::stand_in_executor();

    let server = Server::bind(&config, executor)
        .await
        .context("failed to bind listening socket")?;
    server.run().await?;
    Ok(())
}
