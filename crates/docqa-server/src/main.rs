use docqa_server::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cfg = ServerConfig::load()?;
    let (_addr, handle) = docqa_server::start(cfg).await?;
    handle.await?;
    Ok(())
}
