mod generation;
mod registry;
mod types;

#[cfg(feature = "tch-backend")]
mod loader;

#[cfg(feature = "tch-backend")]
pub use loader::TorchCaptioner;
pub use generation::greedy_decode;
pub use registry::ModelRegistry;
pub use types::{Caption, CaptionResponse, ModelMetadata};

use crate::{error::ServiceError, preprocess::PixelValues};

/// A loaded captioning model, shared by all blocking workers.
pub trait CaptionModel: Send + Sync {
    fn metadata(&self) -> ModelMetadata;

    // At most `max_length` ids, start token included.
    fn generate(&self, pixels: &PixelValues, max_length: usize) -> Result<Vec<u32>, ServiceError>;

    fn decode(&self, tokens: &[u32]) -> Result<String, ServiceError>;
}
