//! Resource dispatch and serialization for JSON REST APIs.
//!
//! A [`Resource`] wraps a [`Handler`] and turns raw [`Request`]s into
//! [`ResponseEnvelope`]s:
//!
//! - **Translation** via [`PayloadTranslator`], which parses JSON bodies on
//!   `POST` and `PUT` before the handler runs
//! - **Routing** via [`Operation`], mapping `GET`, `POST`, `PUT` and
//!   `DELETE` onto read, create, update and delete
//! - **Emission** via [`Emitter`], a two-pass serializer that lets
//!   [`Massager`]s and [`Manipulator`]s batch related lookups before the
//!   final document is rendered
//! - **Error reporting** via [`ApiError`], whose kind fixes the HTTP status
//!   and the `{"error": {...}}` body
//!
//! [`ModelHandler`] implements the handler contract on top of any
//! [`EntityProvider`], with [`InMemoryProvider`] as a reference store.
//!
//! # Example
//!
//! ```
//! use http::{Method, StatusCode};
//! use trellis::{ApiError, Emit, Handler, HandlerResult, Reply, Request, Resource, ResourceSettings};
//!
//! struct Greeting;
//!
//! impl Handler for Greeting {
//!     fn read(&self, request: &Request) -> HandlerResult {
//!         match request.identifier() {
//!             Some(_) => Err(ApiError::does_not_exist("greeting", [("primary_key", 1)]).into()),
//!             None => Ok(Reply::ok(Emit::mapping([("text", "hello")]))),
//!         }
//!     }
//! }
//!
//! let resource = Resource::new(Greeting, ResourceSettings::default());
//!
//! let envelope = resource.dispatch(Request::new(Method::GET));
//! assert_eq!(envelope.status(), StatusCode::OK);
//! assert!(envelope.body().contains("\"hello\""));
//!
//! let envelope = resource.dispatch(Request::new(Method::DELETE));
//! assert_eq!(envelope.status(), StatusCode::METHOD_NOT_ALLOWED);
//! ```

mod dispatch;
mod emitter;
mod entity;
mod errors;
mod model;
mod provider;
pub mod telemetry;
mod translator;

pub use dispatch::{
    Authenticator, Caller, ERROR_MIME_TYPE, Handler, HandlerResult, IdentifierPattern, Operation,
    OutputRegistry, Reply, Request, Resource, ResourceSettings, ResponseEnvelope, TEXT_MIME_TYPE,
};
pub use emitter::{
    Cursor, Emit, Emitter, EmitterConfig, JSON_MIME_TYPE, Manipulator, Massager,
    SerializationContext,
};
pub use entity::{
    Entity, EntityKind, Field, FieldSpec, FieldType, Key, KeyType, Relation, RelationSpec, Schema,
};
pub use errors::{ApiError, DispatchFailure, ErrorKind, GENERIC_FAULT_MESSAGE};
pub use model::ModelHandler;
pub use provider::{Draft, EntityProvider, FieldErrors, InMemoryProvider, ProviderError};
pub use translator::{PayloadTranslator, SUPPORTED_MEDIA_TYPE};

#[cfg(test)]
mod tests;
