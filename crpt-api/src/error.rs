use quota_window::LimitError;

/// Status code reported when no HTTP status was received.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Errors produced by [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// A required call parameter was missing or empty.
    ///
    /// Raised before the rate limiter is touched, so no quota is consumed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The call reached the limiter but did not succeed.
    ///
    /// `code` is the HTTP status for a non-2xx response, or
    /// [`TRANSPORT_FAILURE`] when the request never produced one.
    /// `raw_body` holds the response body whenever a response arrived.
    #[error("request failed ({code}): {message}")]
    RequestFailed {
        code: i32,
        message: String,
        raw_body: Option<String>,
    },

    /// The caller cancelled while waiting for rate limit capacity.
    #[error("cancelled while waiting for rate limit capacity")]
    Cancelled,

    /// The client could not be built from its configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            code: TRANSPORT_FAILURE,
            message: message.into(),
            raw_body: None,
        }
    }

    pub(crate) fn status(code: u16, body: String) -> Self {
        let message = extract_error_message(&body).unwrap_or_else(|| "Unknown error".to_string());
        Self::RequestFailed {
            code: i32::from(code),
            message,
            raw_body: Some(body),
        }
    }

    /// The HTTP status, or [`TRANSPORT_FAILURE`], for a failed request.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::RequestFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The body of the failed response, when one arrived.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::RequestFailed { raw_body, .. } => raw_body.as_deref(),
            _ => None,
        }
    }
}

impl From<LimitError> for ApiError {
    fn from(err: LimitError) -> Self {
        match err {
            LimitError::Cancelled => Self::Cancelled,
            other => Self::Config(other.to_string()),
        }
    }
}

/// Pull the `error_message` field out of a JSON error body.
///
/// Strings are returned verbatim, numbers and booleans rendered as text.
/// Anything else, including a body that is not JSON, yields `None`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error_message")? {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
