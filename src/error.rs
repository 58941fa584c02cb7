use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("model is still loading")]
    ModelLoading,
    #[error("file must be an image, got content type `{0}`")]
    InvalidContentType(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("upload too large: {0}")]
    PayloadTooLarge(String),
    #[error("error decoding image: {0}")]
    Decode(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("other: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::ModelLoading => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InvalidContentType(_) | ServiceError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Decode(_)
            | ServiceError::Inference(_)
            | ServiceError::Tokenizer(_)
            | ServiceError::Storage(_)
            | ServiceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ModelLoading => "loading",
            ServiceError::InvalidContentType(_)
            | ServiceError::BadRequest(_)
            | ServiceError::PayloadTooLarge(_) => "validation",
            ServiceError::Decode(_) => "decode",
            ServiceError::Inference(_) | ServiceError::Tokenizer(_) => "inference",
            ServiceError::Storage(_) => "storage",
            ServiceError::Other(_) => "internal",
        }
    }

    pub(crate) fn log(&self) {
        if self.status().is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();

        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        let err = ServiceError::InvalidContentType("text/plain".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn internal_failures_keep_their_message() {
        let err = ServiceError::Decode("Format error decoding Png".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("Format error decoding Png"));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ServiceError::from(io);
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn loading_maps_to_unavailable() {
        assert_eq!(
            ServiceError::ModelLoading.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
