//! Result envelope returned by the orchestrators.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EnrichmentFailed,
    AnalysisFailed,
    SearchFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnrichmentFailed => "ENRICHMENT_FAILED",
            Self::AnalysisFailed => "ANALYSIS_FAILED",
            Self::SearchFailed => "SEARCH_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported to the consuming application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GiftProcessingError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl GiftProcessingError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable: true,
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// `{success, data?, error?}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GiftProcessingError>,
}

impl<T> ProcessingResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: GiftProcessingError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, GiftProcessingError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(GiftProcessingError::new(
                ErrorCode::AnalysisFailed,
                "result carried neither data nor error",
            )),
        }
    }
}

impl<T> From<Result<T, GiftProcessingError>> for ProcessingResult<T> {
    fn from(result: Result<T, GiftProcessingError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_serializes_code() {
        let result: ProcessingResult<u32> = ProcessingResult::err(
            GiftProcessingError::new(ErrorCode::EnrichmentFailed, "boom")
                .with_context(serde_json::json!({"giftId": "g1"})),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "ENRICHMENT_FAILED");
        assert_eq!(value["error"]["recoverable"], true);
        assert_eq!(value["error"]["context"]["giftId"], "g1");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ProcessingResult::ok(3).into_result().unwrap(), 3);
        let err = ProcessingResult::<u32>::err(GiftProcessingError::new(ErrorCode::SearchFailed, "x"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SearchFailed);
    }
}
