use chestdrop_core::{config, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    config::load_dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (_state, router, reaper_handle) = chestdrop_api::setup::initialize_app(config.clone()).await?;

    chestdrop_api::setup::server::start_server(&config, router).await?;

    // The server has drained; stop the background sweep.
    if let Some(handle) = reaper_handle {
        handle.abort();
    }

    Ok(())
}
