use std::sync::Arc;

use tokio::{net::TcpListener, task};

use blip_caption_service::{
    AppConfig, CaptionModel, ModelRegistry, build_router, init_tracing, model::TorchCaptioner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    let registry = Arc::new(ModelRegistry::new(config.as_ref()));
    let router = build_router(config.clone(), registry.clone())?;

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready, model loading");

    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    tracing::info!(model_id = %config.model_id, "loading model artifacts");
    let loader_config = config.clone();
    let model = task::spawn_blocking(move || TorchCaptioner::load(&loader_config))
        .await?
        .inspect_err(|err| tracing::error!(error = %err, "model initialization failed"))?;
    let model: Arc<dyn CaptionModel> = Arc::new(model);
    registry.install(model)?;
    tracing::info!("model ready, serving caption requests");

    server.await??;

    Ok(())
}
