pub mod config;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod server;
pub mod storage;
pub mod ui;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{Caption, CaptionModel, CaptionResponse, ModelMetadata, ModelRegistry};
pub use preprocess::{ImageProcessor, PixelValues};
pub use server::build_router;

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    // A subscriber installed earlier wins.
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();
}
