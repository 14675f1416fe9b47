use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

/// failures of the flat-file reading store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer error: {0}")]
    Buffer(String),
}

/// everything that can reject a POST to the ingest endpoint
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request body must be JSON: {0}")]
    NotJson(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("could not convert {field} to a number: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::NotJson(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            IngestError::NotJson(_) => self.to_string(),
            _ => format!("error processing reading: {}", self),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(IngestError::NotJson("form".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(IngestError::NotAnObject.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let persist = IngestError::from(StoreError::Io {
            path: "datos.csv".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        });
        assert_eq!(persist.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(persist.to_string().contains("read-only"));
    }
}
