//! Image decoding and BLIP-style pixel preprocessing.

use image::{RgbImage, imageops::FilterType};

use crate::error::ServiceError;

/// CLIP normalization constants used by the BLIP image processor.
pub const BLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const BLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Model-ready pixels for a single image, CHW layout.
#[derive(Debug, Clone)]
pub struct PixelValues {
    pub data: Vec<f32>,
    pub height: u32,
    pub width: u32,
}

impl PixelValues {
    pub fn shape(&self) -> [i64; 4] {
        [1, 3, self.height as i64, self.width as i64]
    }

    pub fn at(&self, channel: usize, y: u32, x: u32) -> f32 {
        let plane = (self.height * self.width) as usize;
        self.data[channel * plane + (y * self.width + x) as usize]
    }
}

#[derive(Debug, Clone)]
pub struct ImageProcessor {
    size: u32,
    rescale: f32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageProcessor {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            rescale: 1.0 / 255.0,
            mean: BLIP_MEAN,
            std: BLIP_STD,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, ServiceError> {
        let image =
            image::load_from_memory(bytes).map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(image.to_rgb8())
    }

    // Square resize, rescale to [0, 1], per-channel normalize.
    pub fn preprocess(&self, image: &RgbImage) -> PixelValues {
        let resized = if image.dimensions() == (self.size, self.size) {
            image.clone()
        } else {
            image::imageops::resize(image, self.size, self.size, FilterType::CatmullRom)
        };

        let plane = (self.size * self.size) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (idx, pixel) in resized.pixels().enumerate() {
            for channel in 0..3 {
                let value = pixel[channel] as f32 * self.rescale;
                data[channel * plane + idx] = (value - self.mean[channel]) / self.std[channel];
            }
        }

        PixelValues {
            data,
            height: self.size,
            width: self.size,
        }
    }

    pub fn process(&self, bytes: &[u8]) -> Result<PixelValues, ServiceError> {
        let image = self.decode(bytes)?;
        Ok(self.preprocess(&image))
    }
}
