//! HTTP request dispatch for entity-backed resources.
//!
//! A [`Resource`] binds a [`Handler`] to its [`ResourceSettings`] and turns
//! each inbound [`Request`] into exactly one [`ResponseEnvelope`].
//!
//! ## Pipeline
//!
//! 1. An optional [`Authenticator`] resolves the caller.
//! 2. `POST` and `PUT` bodies pass through the payload translator.
//! 3. The verb is mapped onto an [`Operation`]; unmapped verbs answer `405`.
//! 4. The handler operation runs; panics are caught and treated as faults.
//! 5. Empty replies answer `204`. Anything else is emitted through the
//!    output representation named by the `output` query parameter.
//! 6. API errors render their own status and body. Faults are logged in
//!    full and answer a generic `500`, with a crash report only when verbose
//!    diagnostics are enabled.
//!
//! Every response carries `Vary: Authorization`.
//!
//! ```json
//! {"error": {"type": "NotImplemented", "message": "...", "fix": "..."}}
//! ```

mod handler;
mod pattern;
mod request;
mod resource;
mod response;
mod router;

pub use self::handler::{Handler, HandlerResult, Reply};
pub use self::pattern::IdentifierPattern;
pub use self::request::{Caller, Request};
pub use self::resource::{Authenticator, OutputRegistry, Resource, ResourceSettings};
pub use self::response::{ERROR_MIME_TYPE, ResponseEnvelope, TEXT_MIME_TYPE};
pub(crate) use self::router::DISPATCH_TARGET;
pub use self::router::Operation;
