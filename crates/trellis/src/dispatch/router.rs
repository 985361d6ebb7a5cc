//! Verb routing for resource dispatch.
//!
//! The table is fixed: `GET` reads, `POST` creates, `PUT` updates and
//! `DELETE` deletes. Any other verb is rejected before handler code runs.

use http::Method;

use crate::errors::ApiError;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Handler operations a verb can map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `GET`.
    Read,
    /// `POST`.
    Create,
    /// `PUT`.
    Update,
    /// `DELETE`.
    Delete,
}

impl Operation {
    /// Maps an HTTP verb onto an operation.
    ///
    /// # Errors
    ///
    /// Returns a `NotImplemented` error for verbs outside the table.
    pub fn from_method(method: &Method) -> Result<Self, ApiError> {
        match *method {
            Method::GET => Ok(Self::Read),
            Method::POST => Ok(Self::Create),
            Method::PUT => Ok(Self::Update),
            Method::DELETE => Ok(Self::Delete),
            _ => Err(ApiError::not_implemented(method)),
        }
    }

    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns whether the operation carries a request body.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}
