use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ServiceError;

/// Writes UI uploads below the static directory so they can be served back.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    url_prefix: String,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub url: String,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, filename: Option<&str>, bytes: &[u8]) -> Result<StoredUpload, ServiceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_filename(filename));
        let path = self.dir.join(&name);
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "upload stored");
        Ok(StoredUpload {
            url: format!("{}/{}", self.url_prefix, name),
            path,
        })
    }
}

pub fn sanitize_filename(filename: Option<&str>) -> String {
    let base = filename
        .and_then(|f| f.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
