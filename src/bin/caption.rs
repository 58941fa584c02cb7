//! Captions a single image from disk without starting the HTTP server.

use std::path::PathBuf;

use argh::FromArgs;

use blip_caption_service::{AppConfig, CaptionModel, ImageProcessor, model::TorchCaptioner};

/// Generate a caption for an image file.
#[derive(FromArgs)]
struct Args {
    /// path to the image to caption
    #[argh(positional)]
    image: PathBuf,

    /// maximum caption length in tokens (defaults to DEFAULT_MAX_LENGTH)
    #[argh(option)]
    max_length: Option<usize>,

    /// directory holding the TorchScript modules and tokenizer.json
    #[argh(option)]
    model_dir: Option<PathBuf>,

    /// print the raw token ids as well
    #[argh(switch)]
    tokens: bool,
}

fn main() -> anyhow::Result<()> {
    blip_caption_service::init_tracing();
    let args: Args = argh::from_env();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = args.model_dir {
        config.vision_module_path = dir.join("blip_vision.ts");
        config.decoder_module_path = dir.join("blip_text_decoder.ts");
        config.tokenizer_path = dir.join("tokenizer.json");
    }
    let max_length = args.max_length.unwrap_or(config.default_max_length);
    anyhow::ensure!(max_length > 0, "--max-length must be positive");

    let model = TorchCaptioner::load(&config)?;
    let processor = ImageProcessor::new(config.image_size);

    let bytes = std::fs::read(&args.image)?;
    let pixels = processor.process(&bytes)?;
    let tokens = model.generate(&pixels, max_length)?;
    if args.tokens {
        println!("{tokens:?}");
    }
    println!("{}", model.decode(&tokens)?);

    Ok(())
}
