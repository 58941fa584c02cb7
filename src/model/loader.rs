use std::{path::Path, time::Instant};

use parking_lot::Mutex;
use tch::{Device, IValue, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{CaptionModel, ModelMetadata, generation::greedy_decode},
    preprocess::PixelValues,
};

// Vision encoder: pixel_values -> image embeds.
// Text decoder: (input_ids, image embeds) -> logits.
pub struct TorchCaptioner {
    model_id: String,
    image_size: u32,
    bos_token_id: u32,
    eos_token_id: u32,
    device: Device,
    tokenizer: Tokenizer,
    vision: Mutex<tch::CModule>,
    decoder: Mutex<tch::CModule>,
}

impl TorchCaptioner {
    pub fn load(config: &AppConfig) -> Result<Self, ServiceError> {
        let start = Instant::now();

        let tokenizer = Tokenizer::from_file(config.tokenizer_path.as_path())
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let vision = load_module(&config.vision_module_path, config.device)?;
        let decoder = load_module(&config.decoder_module_path, config.device)?;

        tracing::info!(
            model_id = %config.model_id,
            device = ?config.device,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "captioning model loaded"
        );

        Ok(Self {
            model_id: config.model_id.clone(),
            image_size: config.image_size,
            bos_token_id: config.bos_token_id,
            eos_token_id: config.eos_token_id,
            device: config.device,
            tokenizer,
            vision: Mutex::new(vision),
            decoder: Mutex::new(decoder),
        })
    }

    fn encode_image(&self, pixels: &PixelValues) -> Result<Tensor, ServiceError> {
        let input = Tensor::from_slice(&pixels.data)
            .reshape(pixels.shape())
            .to_device(self.device);
        self.vision
            .lock()
            .forward_ts(&[input])
            .map_err(|e| ServiceError::Inference(e.to_string()))
    }

    fn next_token(&self, input_ids: &[i64], image_embeds: &Tensor) -> Result<i64, ServiceError> {
        let ids = Tensor::from_slice(input_ids)
            .reshape([1, input_ids.len() as i64])
            .to_device(self.device);

        let output = self
            .decoder
            .lock()
            .forward_is(&[
                IValue::Tensor(ids),
                IValue::Tensor(image_embeds.shallow_clone()),
            ])
            .map_err(|e| ServiceError::Inference(e.to_string()))?;

        // Traced decoders return either bare logits or a tuple led by them.
        let logits = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => {
                    return Err(ServiceError::Inference(
                        "expected tensor as first tuple element".into(),
                    ));
                }
            },
            _ => {
                return Err(ServiceError::Inference(
                    "unexpected decoder output format".into(),
                ));
            }
        };

        // [1, seq_len, vocab] -> [vocab] at the last position.
        let last = logits.select(1, -1).squeeze().to_kind(Kind::Float);
        Ok(last.argmax(0, false).int64_value(&[]))
    }
}

impl CaptionModel for TorchCaptioner {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: self.model_id.clone(),
            backend: "libtorch".to_string(),
            device: format!("{:?}", self.device),
            image_size: self.image_size,
        }
    }

    fn generate(&self, pixels: &PixelValues, max_length: usize) -> Result<Vec<u32>, ServiceError> {
        no_grad(|| {
            let image_embeds = self.encode_image(pixels)?;
            greedy_decode(self.bos_token_id, self.eos_token_id, max_length, |ids| {
                self.next_token(ids, &image_embeds)
            })
        })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, ServiceError> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

fn load_module(path: &Path, device: Device) -> Result<tch::CModule, ServiceError> {
    if !path.exists() {
        return Err(ServiceError::Other(format!(
            "model artifact missing: {}",
            path.display()
        )));
    }
    let mut module = tch::CModule::load_on_device(path, device)
        .map_err(|e| ServiceError::Inference(e.to_string()))?;
    module.set_eval();
    Ok(module)
}
