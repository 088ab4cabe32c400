use anyhow::Context;

use stockline_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockline_observability::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    if config.uses_dev_secret() {
        tracing::warn!("auth.jwt_secret not set; using insecure dev default");
    }

    let app = stockline_api::app::build_app(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        max_conflict_retries = config.dispatch.max_conflict_retries,
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
