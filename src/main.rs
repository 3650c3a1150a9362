use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use groq_relay::config::{load_env_file, AppConfig, ENV_FILE};
use groq_relay::{logger, run_router, RouterState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let applied = load_env_file(Path::new(ENV_FILE))?;
  let config = AppConfig::from_env()?;
  logger::init(config.log_file.as_deref())?;

  info!(applied, "loaded {ENV_FILE}");
  info!(?config, "groq-relay starting up");
  if !config.has_api_key() {
    warn!("GROQ_API_KEY is not set; /api/chat will answer 401");
  }
  if !config.static_root.is_dir() {
    warn!(root = %config.static_root.display(), "static root does not exist");
  }

  let addr = format!("{}:{}", config.host, config.port);
  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .with_context(|| format!("failed to bind {addr}"))?;
  info!("listening on http://{}", listener.local_addr()?);

  run_router(listener, RouterState::new(config)?).await
}
