//! Failure taxonomy shared by every layer of the framework.
//!
//! Expected API misuse is described by [`ApiError`], a closed set of kinds
//! that each map to exactly one HTTP status and one JSON error body.
//! Anything else a handler can fail with travels as an [`anyhow::Error`]
//! inside [`DispatchFailure::Fault`] and is rendered as the generic
//! internal error by the dispatch pipeline.

use std::fmt;

use http::StatusCode;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, error, info};

/// Tracing target for taxonomy construction.
pub(crate) const ERRORS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::errors");

/// Message shown to callers when an unexpected fault is hidden.
pub const GENERIC_FAULT_MESSAGE: &str = "An API error has occured, please try again later.";

const MIME_TYPE_FIX: &str = "Expected 'application/json' in header 'Content-Type'";
const METHOD_FIX: &str = "Make sure you are using the appropriate HTTP method - GET/POST/PUT/DELETE";

/// Recognised failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The verb has no handler operation, or the handler declined it.
    MethodNotImplemented,
    /// Malformed input, unknown field or failed validation.
    InvalidParameter,
    /// The caller lacks the rights for the action.
    InvalidPermission,
    /// The referenced entity does not exist.
    DoesNotExist,
    /// Any unexpected fault.
    Internal,
}

impl ErrorKind {
    /// Returns the `type` label written into error bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MethodNotImplemented => "NotImplemented",
            Self::InvalidParameter => "InvalidParameter",
            Self::InvalidPermission => "InvalidPermission",
            Self::DoesNotExist => "DoesNotExist",
            Self::Internal => "APIError",
        }
    }

    /// Returns the HTTP status associated with the kind.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MethodNotImplemented => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidParameter => StatusCode::BAD_REQUEST,
            Self::InvalidPermission => StatusCode::UNAUTHORIZED,
            Self::DoesNotExist => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured API failure carrying everything needed to render a response.
///
/// Construction never fails and logs a diagnostic line at a severity that
/// matches the kind. The value is immutable apart from the builder-style
/// `with_*` methods used while it is being assembled.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    fix: Option<String>,
    extra: Vec<(String, Value)>,
}

impl ApiError {
    fn new(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            fix: None,
            extra: Vec::new(),
        }
    }

    /// Creates an error for a verb the resource does not implement.
    pub fn not_implemented(method: impl fmt::Display) -> Self {
        let message = format!("The method '{method}' is not implemented for this resource.");
        info!(target: ERRORS_TARGET, %message, "api usage error");
        let mut error = Self::new(ErrorKind::MethodNotImplemented, message);
        error.fix = Some(METHOD_FIX.to_owned());
        error
    }

    /// Creates an error naming an invalid parameter.
    ///
    /// The `mime_type` parameter carries a fixed hint about the expected
    /// content type.
    pub fn invalid_parameter(parameter: impl fmt::Display) -> Self {
        let parameter = parameter.to_string();
        let message = format!("The provided {parameter} was invalid.");
        debug!(target: ERRORS_TARGET, %message, "api usage error");
        let mut error = Self::new(ErrorKind::InvalidParameter, message);
        if parameter == "mime_type" {
            error.fix = Some(MIME_TYPE_FIX.to_owned());
        }
        error
    }

    /// Creates an invalid parameter error whose message is used verbatim.
    pub fn invalid_parameter_message(message: impl Into<String>) -> Self {
        let message = message.into();
        debug!(target: ERRORS_TARGET, %message, "api usage error");
        Self::new(ErrorKind::InvalidParameter, message)
    }

    /// Creates an error for a caller lacking the required rights.
    pub fn invalid_permission(perm: Option<&str>) -> Self {
        info!(target: ERRORS_TARGET, perm, "api error: invalid permission");
        let mut error = Self::new(
            ErrorKind::InvalidPermission,
            "You do not have permission to do that.".to_owned(),
        );
        if let Some(perm) = perm {
            error.extra.push(("perm".to_owned(), Value::from(perm)));
        }
        error
    }

    /// Creates an error for a missing entity described by named parameters.
    ///
    /// ```
    /// use trellis::ApiError;
    ///
    /// let error = ApiError::does_not_exist("widget", [("primary_key", "42")]);
    /// assert_eq!(
    ///     error.message(),
    ///     "The widget with primary_key {42} does not exist."
    /// );
    /// ```
    pub fn does_not_exist<N, V>(subject: &str, params: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: fmt::Display,
        V: fmt::Display,
    {
        let described = params
            .into_iter()
            .map(|(name, value)| format!("{name} {{{value}}}"))
            .collect::<Vec<_>>()
            .join(" and ");
        let message = format!("The {subject} with {described} does not exist.");
        info!(target: ERRORS_TARGET, %message, "api usage error");
        Self::new(ErrorKind::DoesNotExist, message)
    }

    /// Creates the generic internal error.
    ///
    /// `crash_report` is only exposed to callers when verbose diagnostics are
    /// enabled; pass `None` otherwise.
    pub fn internal(crash_report: Option<&str>) -> Self {
        let message = match crash_report {
            Some(report) => format!(
                "API ({} {}) crash report:\n\n{report}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
            ),
            None => GENERIC_FAULT_MESSAGE.to_owned(),
        };
        error!(target: ERRORS_TARGET, verbose = crash_report.is_some(), "internal api error");
        Self::new(ErrorKind::Internal, message)
    }

    /// Attaches a fix hint.
    #[must_use]
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Attaches the offending value.
    #[must_use]
    pub fn with_value(self, value: impl Into<Value>) -> Self {
        self.with_extra("value", value)
    }

    /// Attaches a kind-specific field to the error body.
    ///
    /// `type`, `message` and `fix` are reserved and ignored here.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if matches!(key.as_str(), "type" | "message" | "fix") {
            return self;
        }
        let value = value.into();
        match self.extra.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.extra.push((key, value)),
        }
        self
    }

    /// Returns the failure kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the HTTP status for the failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the fix hint, if any.
    #[must_use]
    pub fn fix(&self) -> Option<&str> {
        self.fix.as_deref()
    }

    /// Looks up a kind-specific field.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra
            .iter()
            .find_map(|(name, value)| (name == key).then_some(value))
    }

    /// Builds the `{"error": {...}}` body sent to callers.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut error = Map::new();
        error.insert("type".to_owned(), Value::from(self.kind.as_str()));
        error.insert("message".to_owned(), Value::from(self.message.as_str()));
        if let Some(fix) = &self.fix {
            error.insert("fix".to_owned(), Value::from(fix.as_str()));
        }
        for (key, value) in &self.extra {
            error.insert(key.clone(), value.clone());
        }
        json!({ "error": error })
    }
}

/// Anything a handler or collaborator can fail with.
#[derive(Debug, Error)]
pub enum DispatchFailure {
    /// Expected API misuse with a dedicated response.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Unexpected fault rendered as the generic internal error.
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(ApiError::not_implemented("PATCH"), 405, "NotImplemented")]
    #[case(ApiError::invalid_parameter("name"), 400, "InvalidParameter")]
    #[case(ApiError::invalid_permission(None), 401, "InvalidPermission")]
    #[case(ApiError::does_not_exist("widget", [("primary_key", 1)]), 404, "DoesNotExist")]
    #[case(ApiError::internal(None), 500, "APIError")]
    fn every_kind_maps_to_one_status(
        #[case] error: ApiError,
        #[case] status: u16,
        #[case] label: &str,
    ) {
        assert_eq!(error.status().as_u16(), status);
        assert_eq!(error.to_body()["error"]["type"], label);
    }

    #[test]
    fn invalid_parameter_body_has_no_optional_fields() {
        let error = ApiError::invalid_parameter("name");
        assert_eq!(
            error.to_body(),
            json!({"error": {"type": "InvalidParameter", "message": "The provided name was invalid."}})
        );
    }

    #[test]
    fn mime_type_parameter_carries_fix() {
        let error = ApiError::invalid_parameter("mime_type");
        assert_eq!(error.fix(), Some(MIME_TYPE_FIX));
        assert_eq!(error.to_body()["error"]["fix"], MIME_TYPE_FIX);
    }

    #[test]
    fn not_implemented_names_the_method() {
        let error = ApiError::not_implemented("PATCH");
        assert_eq!(
            error.message(),
            "The method 'PATCH' is not implemented for this resource."
        );
    }

    #[test]
    fn does_not_exist_joins_parameters() {
        let error = ApiError::does_not_exist("membership", [("user", "7"), ("group", "3")]);
        assert_eq!(
            error.message(),
            "The membership with user {7} and group {3} does not exist."
        );
    }

    #[test]
    fn extras_are_flattened_into_the_error_body() {
        let error = ApiError::invalid_parameter("emission type")
            .with_value("xml")
            .with_fix("choose from [default]")
            .with_extra("choices", json!(["default"]));
        assert_eq!(
            error.to_body(),
            json!({"error": {
                "type": "InvalidParameter",
                "message": "The provided emission type was invalid.",
                "fix": "choose from [default]",
                "value": "xml",
                "choices": ["default"],
            }})
        );
    }

    #[test]
    fn reserved_extra_keys_are_ignored() {
        let error = ApiError::invalid_parameter("name").with_extra("type", "spoofed");
        assert_eq!(error.to_body()["error"]["type"], "InvalidParameter");
    }

    #[test]
    fn permission_error_records_perm() {
        let error = ApiError::invalid_permission(Some("widgets.delete"));
        assert_eq!(error.extra("perm"), Some(&json!("widgets.delete")));
    }

    #[test]
    fn internal_error_hides_detail_by_default() {
        assert_eq!(ApiError::internal(None).message(), GENERIC_FAULT_MESSAGE);
        let verbose = ApiError::internal(Some("boom"));
        assert!(verbose.message().contains("crash report"));
        assert!(verbose.message().ends_with("boom"));
    }
}
