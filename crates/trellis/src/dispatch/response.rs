//! Response envelope handed back to the transport layer.

use http::header::{CONTENT_TYPE, VARY};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde_json::Value;

use crate::emitter::to_pretty_json;
use crate::errors::{ApiError, GENERIC_FAULT_MESSAGE};

/// Mime type of error bodies.
pub const ERROR_MIME_TYPE: &str = "application/json";

/// Mime type of empty success bodies.
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// Fully rendered response produced by one dispatch.
///
/// Every envelope varies by the caller's `Authorization` header so shared
/// caches never conflate callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    status: StatusCode,
    mime_type: String,
    body: String,
    headers: HeaderMap,
}

impl ResponseEnvelope {
    /// Creates an envelope from already-rendered content.
    pub fn new(status: StatusCode, mime_type: impl Into<String>, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(VARY, HeaderValue::from_static("Authorization"));
        Self {
            status,
            mime_type: mime_type.into(),
            body: body.into(),
            headers,
        }
    }

    /// `204 No Content` with an empty plain-text body.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, TEXT_MIME_TYPE, String::new())
    }

    /// Renders an API error as its structured JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serializer failure when the body cannot be written.
    pub fn from_error(error: &ApiError) -> anyhow::Result<Self> {
        let body = to_pretty_json(&error.to_body())?;
        Ok(Self::new(error.status(), ERROR_MIME_TYPE, body))
    }

    /// Plain-text `500` for failures whose error body could not be rendered.
    #[must_use]
    pub fn unrenderable() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_MIME_TYPE,
            GENERIC_FAULT_MESSAGE,
        )
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Mime type of the body.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Rendered body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Headers other than `Content-Type`.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Parses the body as JSON, for inspection.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the body is not JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

impl From<ResponseEnvelope> for Response<String> {
    fn from(envelope: ResponseEnvelope) -> Self {
        let mut response = Self::new(envelope.body);
        *response.status_mut() = envelope.status;
        let headers = response.headers_mut();
        headers.extend(envelope.headers);
        if let Ok(mime_type) = HeaderValue::from_str(&envelope.mime_type) {
            headers.insert(CONTENT_TYPE, mime_type);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_envelope_varies_by_authorization() {
        let envelope = ResponseEnvelope::no_content();
        assert_eq!(envelope.headers().get(VARY), Some(&HeaderValue::from_static("Authorization")));
        assert_eq!(envelope.body(), "");
        assert_eq!(envelope.mime_type(), TEXT_MIME_TYPE);
    }

    #[test]
    fn errors_render_their_status_and_body() {
        let envelope =
            ResponseEnvelope::from_error(&ApiError::invalid_parameter("JSON")).expect("rendered");
        assert_eq!(envelope.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope.mime_type(), ERROR_MIME_TYPE);
        assert_eq!(
            envelope.json().expect("json body"),
            json!({"error": {"type": "InvalidParameter", "message": "The provided JSON was invalid."}})
        );
        assert!(envelope.body().contains("\n    \"error\""));
    }

    #[test]
    fn unrenderable_failures_fall_back_to_plain_text() {
        let envelope = ResponseEnvelope::unrenderable();
        assert_eq!(envelope.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(envelope.mime_type(), TEXT_MIME_TYPE);
        assert_eq!(envelope.body(), GENERIC_FAULT_MESSAGE);
    }

    #[test]
    fn converts_into_http_response() {
        let envelope = ResponseEnvelope::new(StatusCode::OK, "application/json; charset=utf-8", "{}");
        let response: Response<String> = envelope.into();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("application/json; charset=utf-8")
        );
        assert!(response.headers().contains_key(VARY));
        assert_eq!(response.body(), "{}");
    }
}
