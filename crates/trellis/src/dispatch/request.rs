//! Inbound request model for the dispatch pipeline.
//!
//! A [`Request`] carries what the transport layer extracted from the HTTP
//! exchange: verb, optional path identifier, decoded query parameters,
//! headers and raw body. The payload translator later attaches the parsed
//! body so handlers never re-parse it.

use std::collections::BTreeMap;
use std::fmt;

use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use serde_json::Value;
use url::form_urlencoded;

/// Identity resolved by an [`Authenticator`](super::Authenticator).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller(String);

impl Caller {
    /// Creates a caller identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Returns the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound HTTP request addressed to a resource.
///
/// ```
/// use http::Method;
/// use trellis::Request;
///
/// let request = Request::new(Method::GET)
///     .with_identifier("42")
///     .with_query_string("output=default&page=2");
/// assert_eq!(request.identifier(), Some("42"));
/// assert_eq!(request.query("page"), Some("2"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    identifier: Option<String>,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
    body: Vec<u8>,
    payload: Option<Value>,
    form: BTreeMap<String, String>,
    caller: Option<Caller>,
}

impl Request {
    /// Creates an empty request for `method`.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            identifier: None,
            query: BTreeMap::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            payload: None,
            form: BTreeMap::new(),
            caller: None,
        }
    }

    /// Sets the identifier extracted from the resource path.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Decodes an `application/x-www-form-urlencoded` query string.
    ///
    /// Later occurrences of a parameter replace earlier ones.
    #[must_use]
    pub fn with_query_string(mut self, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        self.query.extend(
            form_urlencoded::parse(query.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned())),
        );
        self
    }

    /// Sets a single query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a header. Values that are not valid header text are dropped.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the raw body together with its declared content type.
    #[must_use]
    pub fn with_body(self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let mut request = self.with_header(CONTENT_TYPE, content_type);
        request.body = body.into();
        request
    }

    /// Sets verb-specific form fields, as submitted before translation.
    #[must_use]
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// HTTP verb.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Identifier captured from the path, if any.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Looks up a decoded query parameter.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared content type, if present and readable.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Raw request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Normalised payload attached by the translator.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Form fields that have not been cleared by translation.
    #[must_use]
    pub const fn form(&self) -> &BTreeMap<String, String> {
        &self.form
    }

    /// Caller identity, once authentication has run.
    #[must_use]
    pub const fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub(crate) fn attach_payload(&mut self, payload: Option<Value>) {
        self.payload = payload;
        self.form.clear();
    }

    pub(crate) fn set_caller(&mut self, caller: Option<Caller>) {
        self.caller = caller;
    }
}
