//! Inbound payload translation for write verbs.

use serde_json::Value;
use tracing::debug;

use crate::dispatch::{DISPATCH_TARGET, Request};
use crate::errors::ApiError;

/// The single media type accepted for request bodies.
pub const SUPPORTED_MEDIA_TYPE: &str = "application/json";

/// Parses request bodies into the normalised payload handlers consume.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadTranslator;

impl PayloadTranslator {
    /// Parses the body of `request` and attaches the result as its payload.
    ///
    /// An empty body yields no payload and skips the content-type check. Any
    /// form data submitted with the request is cleared.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming `mime_type` when the declared
    /// content type is not JSON, or `JSON` when the body does not parse.
    pub fn translate(self, request: &mut Request) -> Result<(), ApiError> {
        let payload = self.normalise(request)?;
        request.attach_payload(payload);
        Ok(())
    }

    fn normalise(self, request: &Request) -> Result<Option<Value>, ApiError> {
        if request.body().iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let declared = request.content_type().unwrap_or_default();
        if !is_json_media_type(declared) {
            debug!(target: DISPATCH_TARGET, content_type = declared, "unsupported content type");
            return Err(ApiError::invalid_parameter("mime_type"));
        }

        serde_json::from_slice(request.body())
            .map(Some)
            .map_err(|error| {
                debug!(target: DISPATCH_TARGET, %error, "malformed request body");
                ApiError::invalid_parameter("JSON")
            })
    }
}

/// Compares the media type of a `Content-Type` value, ignoring parameters.
fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(SUPPORTED_MEDIA_TYPE))
}

#[cfg(test)]
mod tests {
    use http::Method;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorKind;

    fn translate(request: &mut Request) -> Result<(), ApiError> {
        PayloadTranslator.translate(request)
    }

    #[rstest]
    #[case("application/json")]
    #[case("application/json; charset=utf-8")]
    #[case("Application/JSON")]
    fn json_bodies_become_payloads(#[case] content_type: &str) {
        let mut request = Request::new(Method::PUT)
            .with_body(content_type, r#"{"name": "gear", "sizes": [1, 2]}"#)
            .with_form_field("name", "stale");
        translate(&mut request).expect("translate");
        assert_eq!(request.payload(), Some(&json!({"name": "gear", "sizes": [1, 2]})));
        assert!(request.form().is_empty());
    }

    #[test]
    fn scalar_bodies_are_accepted() {
        let mut request = Request::new(Method::POST).with_body("application/json", "5");
        translate(&mut request).expect("translate");
        assert_eq!(request.payload(), Some(&json!(5)));
    }

    #[test]
    fn empty_bodies_yield_no_payload() {
        let mut request = Request::new(Method::POST).with_form_field("name", "stale");
        translate(&mut request).expect("translate");
        assert_eq!(request.payload(), None);
        assert!(request.form().is_empty());
    }

    #[rstest]
    #[case("text/plain")]
    #[case("application/jsonp")]
    #[case("")]
    fn other_media_types_are_rejected(#[case] content_type: &str) {
        let mut request = Request::new(Method::POST).with_body(content_type, "{}");
        let error = translate(&mut request).expect_err("unsupported media type");
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert_eq!(error.message(), "The provided mime_type was invalid.");
        assert!(error.fix().is_some());
    }

    #[rstest]
    #[case("{")]
    #[case("{'single': 'quotes'}")]
    #[case("[1, 2,]")]
    fn malformed_json_names_the_json_parameter(#[case] body: &str) {
        let mut request = Request::new(Method::PUT).with_body("application/json", body);
        let error = translate(&mut request).expect_err("malformed body");
        assert_eq!(error.message(), "The provided JSON was invalid.");
        assert_eq!(request.payload(), None);
    }
}
