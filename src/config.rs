use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    thread,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

pub const DEFAULT_MODEL_ID: &str = "Salesforce/blip-image-captioning-base";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub model_id: String,
    pub vision_module_path: PathBuf,
    pub decoder_module_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub image_size: u32,
    pub default_max_length: usize,
    pub max_length_limit: usize,
    pub bos_token_id: u32,
    pub eos_token_id: u32,
    pub inference_workers: usize,
    pub body_limit_bytes: usize,
    pub static_dir: PathBuf,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl Default for AppConfig {
    fn default() -> Self {
        let model_dir = PathBuf::from("models");
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            model_id: DEFAULT_MODEL_ID.to_string(),
            vision_module_path: model_dir.join("blip_vision.ts"),
            decoder_module_path: model_dir.join("blip_text_decoder.ts"),
            tokenizer_path: model_dir.join("tokenizer.json"),
            image_size: 384,
            default_max_length: 50,
            max_length_limit: 512,
            bos_token_id: 30522,
            eos_token_id: 102,
            inference_workers: default_workers(),
            body_limit_bytes: 10 * 1024 * 1024,
            static_dir: PathBuf::from("static"),
            #[cfg(feature = "tch-backend")]
            device: Device::Cpu,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Missing or unparsable keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let listen_addr = parsed(&lookup, "SERVER_ADDR").unwrap_or(defaults.listen_addr);
        let model_id = lookup("MODEL_ID").unwrap_or(defaults.model_id);

        let model_dir = lookup("MODEL_DIR").map(PathBuf::from);
        let artifact = |key: &str, default: PathBuf| -> PathBuf {
            match (lookup(key), model_dir.as_ref()) {
                (Some(path), _) => PathBuf::from(path),
                (None, Some(dir)) => dir.join(default.file_name().unwrap_or_default()),
                (None, None) => default,
            }
        };
        let vision_module_path = artifact("VISION_MODULE_PATH", defaults.vision_module_path);
        let decoder_module_path = artifact("DECODER_MODULE_PATH", defaults.decoder_module_path);
        let tokenizer_path = artifact("TOKENIZER_PATH", defaults.tokenizer_path);

        let image_size = parsed_positive(&lookup, "IMAGE_SIZE").unwrap_or(defaults.image_size);
        let default_max_length =
            parsed_positive(&lookup, "DEFAULT_MAX_LENGTH").unwrap_or(defaults.default_max_length);
        let max_length_limit =
            parsed_positive(&lookup, "MAX_LENGTH_LIMIT").unwrap_or(defaults.max_length_limit);
        if default_max_length > max_length_limit {
            anyhow::bail!(
                "DEFAULT_MAX_LENGTH ({default_max_length}) exceeds MAX_LENGTH_LIMIT ({max_length_limit})"
            );
        }

        let bos_token_id = parsed(&lookup, "BOS_TOKEN_ID").unwrap_or(defaults.bos_token_id);
        let eos_token_id = parsed(&lookup, "EOS_TOKEN_ID").unwrap_or(defaults.eos_token_id);
        let inference_workers =
            parsed_positive(&lookup, "INFERENCE_WORKERS").unwrap_or(defaults.inference_workers);
        let body_limit_bytes =
            parsed_positive(&lookup, "BODY_LIMIT_BYTES").unwrap_or(defaults.body_limit_bytes);
        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = lookup("DEVICE").unwrap_or_else(|| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            model_id,
            vision_module_path,
            decoder_module_path,
            tokenizer_path,
            image_size,
            default_max_length,
            max_length_limit,
            bos_token_id,
            eos_token_id,
            inference_workers,
            body_limit_bytes,
            static_dir,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.static_dir.join("uploads")
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.trim().parse::<T>().ok())
}

fn parsed_positive<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    parsed(lookup, key).filter(|v: &T| *v > T::default())
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            tracing::warn!(requested = %raw, "CUDA unavailable, falling back to CPU");
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}
