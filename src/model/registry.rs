use std::sync::Arc;

use axum::body::Bytes;
use once_cell::sync::OnceCell;
use tokio::{sync::Semaphore, task};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{Caption, CaptionModel, ModelMetadata},
    preprocess::ImageProcessor,
};

pub struct ModelRegistry {
    processor: Arc<ImageProcessor>,
    model: OnceCell<Arc<dyn CaptionModel>>,
    workers: Arc<Semaphore>,
}

impl ModelRegistry {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            processor: Arc::new(ImageProcessor::new(config.image_size)),
            model: OnceCell::new(),
            workers: Arc::new(Semaphore::new(config.inference_workers.max(1))),
        }
    }

    pub fn install(&self, model: Arc<dyn CaptionModel>) -> Result<(), ServiceError> {
        self.model
            .set(model)
            .map_err(|_| ServiceError::Other("model already installed".into()))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.model.get().map(|m| m.metadata())
    }

    pub async fn caption(&self, bytes: Bytes, max_length: usize) -> Result<Caption, ServiceError> {
        let model = self.model.get().cloned().ok_or(ServiceError::ModelLoading)?;
        let processor = self.processor.clone();

        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ServiceError::Other(format!("worker pool closed: {e}")))?;

        // Held by the blocking job: a dropped request keeps its slot until
        // the job ends.
        task::spawn_blocking(move || {
            let _permit = permit;
            let pixels = processor.process(&bytes)?;
            let tokens = model.generate(&pixels, max_length)?;
            let text = model.decode(&tokens)?;
            Ok::<_, ServiceError>(Caption {
                text,
                tokens: tokens.len(),
            })
        })
        .await
        .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use image::{ImageOutputFormat, Rgb, RgbImage};

    use super::*;
    use crate::preprocess::PixelValues;

    #[derive(Default)]
    struct CountingModel {
        calls: AtomicUsize,
    }

    impl CaptionModel for CountingModel {
        fn metadata(&self) -> ModelMetadata {
            ModelMetadata {
                model_id: "counting".into(),
                backend: "test".into(),
                device: "cpu".into(),
                image_size: 8,
            }
        }

        fn generate(&self, pixels: &PixelValues, max_length: usize) -> Result<Vec<u32>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(pixels.shape(), [1, 3, 8, 8]);
            Ok((0..max_length as u32).collect())
        }

        fn decode(&self, tokens: &[u32]) -> Result<String, ServiceError> {
            Ok(format!("{} tokens", tokens.len()))
        }
    }

    #[derive(Default)]
    struct SlowModel {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CaptionModel for SlowModel {
        fn metadata(&self) -> ModelMetadata {
            ModelMetadata {
                model_id: "slow".into(),
                backend: "test".into(),
                device: "cpu".into(),
                image_size: 8,
            }
        }

        fn generate(&self, _pixels: &PixelValues, _max_length: usize) -> Result<Vec<u32>, ServiceError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(400));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0])
        }

        fn decode(&self, _tokens: &[u32]) -> Result<String, ServiceError> {
            Ok("slow".into())
        }
    }

    fn registry_with_workers(inference_workers: usize) -> ModelRegistry {
        let config = AppConfig {
            image_size: 8,
            inference_workers,
            ..AppConfig::default()
        };
        ModelRegistry::new(&config)
    }

    fn registry() -> ModelRegistry {
        registry_with_workers(2)
    }

    fn png_bytes() -> Bytes {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 20, 30])))
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        Bytes::from(bytes)
    }

    #[tokio::test]
    async fn caption_before_install_reports_loading() {
        let registry = registry();
        assert!(!registry.is_loaded());
        let err = registry.caption(png_bytes(), 10).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelLoading));
    }

    #[tokio::test]
    async fn caption_runs_full_pipeline() {
        let registry = registry();
        let model = Arc::new(CountingModel::default());
        registry.install(model.clone()).unwrap();
        assert!(registry.is_loaded());

        let caption = registry.caption(png_bytes(), 7).await.unwrap();
        assert_eq!(caption.tokens, 7);
        assert_eq!(caption.text, "7 tokens");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_bytes_never_reach_the_model() {
        let registry = registry();
        let model = Arc::new(CountingModel::default());
        registry.install(model.clone()).unwrap();

        let err = registry
            .caption(Bytes::from_static(b"not an image"), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_request_keeps_worker_slot_until_job_ends() {
        let registry = Arc::new(registry_with_workers(1));
        let model = Arc::new(SlowModel::default());
        registry.install(model.clone()).unwrap();

        let first = tokio::spawn({
            let registry = registry.clone();
            async move { registry.caption(png_bytes(), 4).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let caption = registry.caption(png_bytes(), 4).await.unwrap();
        assert_eq!(caption.text, "slow");
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
        assert_eq!(model.active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn second_install_is_rejected() {
        let registry = registry();
        registry.install(Arc::new(CountingModel::default())).unwrap();
        assert!(registry.install(Arc::new(CountingModel::default())).is_err());
        assert_eq!(registry.metadata().unwrap().model_id, "counting");
    }
}
