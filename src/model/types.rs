use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
    // start token included
    pub tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptionResponse {
    pub success: bool,
    pub caption: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub backend: String,
    pub device: String,
    pub image_size: u32,
}
