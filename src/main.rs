mod client;
mod logging;
mod shutdown;

use anyhow::Context;
use soundbot::infrastructure::environment::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = logging::init_logger()?;
    let config = Config::from_env().context("Invalid configuration")?;
    info!("Configuration: {:?}", config);

    let bot = client::create_serenity_client(config).await?;
    let connections = bot.connections.clone();
    let shard_manager = bot.client.shard_manager.clone();
    let mut client = bot.client;

    shutdown::run_until_shutdown(client.start(), || async move {
        connections.shutdown().await;
        shard_manager.shutdown_all().await;
    })
    .await
}
