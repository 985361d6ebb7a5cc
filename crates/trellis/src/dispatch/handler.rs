//! Contract implemented by resource handlers.

use http::StatusCode;

use crate::emitter::Emit;
use crate::errors::{ApiError, DispatchFailure};

use super::request::Request;

/// Outcome of a handler operation.
pub type HandlerResult = Result<Reply, DispatchFailure>;

/// Value returned by a successful handler operation.
///
/// A reply without a body renders as `204 No Content`; otherwise the body is
/// emitted under `data` with the explicit status, or `200 OK` when none was
/// set. Only statuses in [`Reply::SUCCESS_STATUSES`] may be chosen.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    body: Option<Emit>,
    status: Option<StatusCode>,
}

impl Reply {
    /// Statuses a handler may choose for a reply with a body.
    pub const SUCCESS_STATUSES: [StatusCode; 2] = [StatusCode::OK, StatusCode::NO_CONTENT];

    /// Reply carrying no content.
    #[must_use]
    pub fn no_content() -> Self {
        Self::default()
    }

    /// Reply carrying `body`.
    pub fn ok(body: impl Into<Emit>) -> Self {
        Self {
            body: Some(body.into()),
            status: None,
        }
    }

    /// Overrides the response status for a reply with a body.
    ///
    /// A status outside [`Reply::SUCCESS_STATUSES`] is rejected at dispatch
    /// as an internal fault.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Body to emit, if any.
    #[must_use]
    pub const fn body(&self) -> Option<&Emit> {
        self.body.as_ref()
    }

    /// Explicit status, if any.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// Operations a resource handler may implement.
///
/// Every operation defaults to refusing its verb with `NotImplemented`, so a
/// handler only overrides what it supports.
pub trait Handler: Send + Sync {
    /// Handles `GET`.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` unless overridden.
    fn read(&self, _request: &Request) -> HandlerResult {
        Err(ApiError::not_implemented("GET").into())
    }

    /// Handles `POST`.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` unless overridden.
    fn create(&self, _request: &Request) -> HandlerResult {
        Err(ApiError::not_implemented("POST").into())
    }

    /// Handles `PUT`.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` unless overridden.
    fn update(&self, _request: &Request) -> HandlerResult {
        Err(ApiError::not_implemented("PUT").into())
    }

    /// Handles `DELETE`.
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` unless overridden.
    fn delete(&self, _request: &Request) -> HandlerResult {
        Err(ApiError::not_implemented("DELETE").into())
    }
}
