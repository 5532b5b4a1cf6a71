use anyhow::Context;

use warden_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let config = ApiConfig::from_env()?;
    let app = warden_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!(addr = %listener.local_addr()?, prefix = %config.prefix, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
