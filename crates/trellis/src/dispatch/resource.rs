//! The per-request dispatch pipeline.
//!
//! [`Resource::dispatch`] runs one request through authentication, payload
//! translation, verb routing and handler invocation, then renders either the
//! handler's reply or its failure. Every path ends in a single
//! [`ResponseEnvelope`].

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use http::StatusCode;
use tracing::{debug, error, info};
use trellis_config::{Config, DEFAULT_OUTPUT_NAME, DEFAULT_OUTPUT_PARAMETER};

use crate::emitter::{Emitter, EmitterConfig};
use crate::errors::{ApiError, DispatchFailure};
use crate::translator::PayloadTranslator;

use super::handler::{Handler, HandlerResult, Reply};
use super::request::{Caller, Request};
use super::response::ResponseEnvelope;
use super::router::{DISPATCH_TARGET, Operation};

/// Resolves the caller behind a request.
pub trait Authenticator: Send + Sync {
    /// Returns the caller identity, or `None` for anonymous requests.
    ///
    /// # Errors
    ///
    /// Returns an error (typically `InvalidPermission`) to reject the request
    /// before any handler code runs.
    fn authenticate(&self, request: &Request) -> Result<Option<Caller>, ApiError>;
}

/// Output representations selectable by name.
///
/// The `default` representation is always present.
#[derive(Debug, Clone)]
pub struct OutputRegistry {
    outputs: BTreeMap<String, Emitter>,
}

impl OutputRegistry {
    /// Creates a registry whose `default` representation is `emitter`.
    #[must_use]
    pub fn new(emitter: Emitter) -> Self {
        let mut outputs = BTreeMap::new();
        outputs.insert(DEFAULT_OUTPUT_NAME.to_owned(), emitter);
        Self { outputs }
    }

    /// Registers a named representation, replacing any previous one.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, emitter: Emitter) -> Self {
        self.outputs.insert(name.into(), emitter);
        self
    }

    /// Looks up a representation.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Emitter> {
        self.outputs.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.outputs.keys().map(String::as_str)
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new(Emitter::default())
    }
}

/// Read-mostly settings shared by every dispatch of a resource.
#[derive(Debug, Clone)]
pub struct ResourceSettings {
    verbose_diagnostics: bool,
    output_parameter: String,
    outputs: OutputRegistry,
}

impl ResourceSettings {
    /// Derives settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            verbose_diagnostics: config.verbose_diagnostics(),
            output_parameter: config.output_parameter().to_owned(),
            outputs: OutputRegistry::new(Emitter::new(EmitterConfig::from_config(config))),
        }
    }

    /// Enables or disables crash reports in internal error bodies.
    #[must_use]
    pub const fn with_verbose_diagnostics(mut self, verbose: bool) -> Self {
        self.verbose_diagnostics = verbose;
        self
    }

    /// Replaces the output registry.
    #[must_use]
    pub fn with_outputs(mut self, outputs: OutputRegistry) -> Self {
        self.outputs = outputs;
        self
    }

    /// Whether internal error bodies carry crash reports.
    #[must_use]
    pub const fn verbose_diagnostics(&self) -> bool {
        self.verbose_diagnostics
    }

    /// Query parameter selecting the output representation.
    #[must_use]
    pub fn output_parameter(&self) -> &str {
        &self.output_parameter
    }

    /// Registered output representations.
    #[must_use]
    pub const fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            verbose_diagnostics: false,
            output_parameter: DEFAULT_OUTPUT_PARAMETER.to_owned(),
            outputs: OutputRegistry::default(),
        }
    }
}

/// A handler bound to its dispatch settings.
pub struct Resource<H> {
    handler: H,
    settings: ResourceSettings,
    authenticator: Option<Arc<dyn Authenticator>>,
    translator: PayloadTranslator,
}

impl<H: Handler> Resource<H> {
    /// Binds `handler` to `settings`.
    pub fn new(handler: H, settings: ResourceSettings) -> Self {
        Self {
            handler,
            settings,
            authenticator: None,
            translator: PayloadTranslator,
        }
    }

    /// Installs the hook that resolves callers.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// The bound handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// The dispatch settings.
    pub const fn settings(&self) -> &ResourceSettings {
        &self.settings
    }

    /// Runs one request to completion.
    ///
    /// Never fails: every outcome, including handler panics, is rendered as
    /// a response.
    pub fn dispatch(&self, mut request: Request) -> ResponseEnvelope {
        debug!(
            target: DISPATCH_TARGET,
            method = %request.method(),
            identifier = request.identifier(),
            "dispatching request"
        );

        let rendered = match self.respond(&mut request) {
            Ok(envelope) => Ok(envelope),
            Err(DispatchFailure::Api(api_error)) => ResponseEnvelope::from_error(&api_error),
            Err(DispatchFailure::Fault(fault)) => self.render_fault(&fault),
        };
        let envelope = rendered.unwrap_or_else(|failure| {
            error!(target: DISPATCH_TARGET, error = %failure, "error body could not be rendered");
            ResponseEnvelope::unrenderable()
        });

        info!(
            target: DISPATCH_TARGET,
            method = %request.method(),
            status = envelope.status().as_u16(),
            "request complete"
        );
        envelope
    }

    fn respond(&self, request: &mut Request) -> Result<ResponseEnvelope, DispatchFailure> {
        if let Some(authenticator) = &self.authenticator {
            let caller = authenticator.authenticate(request)?;
            request.set_caller(caller);
        }

        let operation = Operation::from_method(request.method())?;
        if operation.is_write() {
            self.translator.translate(request)?;
        }

        let reply = self.invoke(operation, request)?;
        self.render_reply(&reply, request)
    }

    fn invoke(&self, operation: Operation, request: &Request) -> HandlerResult {
        debug!(target: DISPATCH_TARGET, operation = operation.as_str(), "invoking handler");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match operation {
            Operation::Read => self.handler.read(request),
            Operation::Create => self.handler.create(request),
            Operation::Update => self.handler.update(request),
            Operation::Delete => self.handler.delete(request),
        }));
        outcome.unwrap_or_else(|payload| {
            Err(DispatchFailure::Fault(anyhow!(
                "handler panicked during {}: {}",
                operation.as_str(),
                panic_message(payload.as_ref())
            )))
        })
    }

    fn render_reply(&self, reply: &Reply, request: &Request) -> Result<ResponseEnvelope, DispatchFailure> {
        let Some(body) = reply.body() else {
            return Ok(ResponseEnvelope::no_content());
        };

        let status = reply.status().unwrap_or(StatusCode::OK);
        if !Reply::SUCCESS_STATUSES.contains(&status) {
            return Err(DispatchFailure::Fault(anyhow!(
                "handler chose unsupported status {status}"
            )));
        }

        let emitter = self.select_output(request)?;
        let document = emitter.emit(body, request.caller().cloned())?;
        Ok(ResponseEnvelope::new(status, emitter.mime_type(), document))
    }

    fn select_output(&self, request: &Request) -> Result<&Emitter, ApiError> {
        let name = request
            .query(self.settings.output_parameter())
            .unwrap_or(DEFAULT_OUTPUT_NAME);
        self.settings.outputs().get(name).ok_or_else(|| {
            let choices: Vec<&str> = self.settings.outputs().names().collect();
            let fix = format!("choose from [{}]", choices.join(", "));
            ApiError::invalid_parameter("emission type")
                .with_value(name)
                .with_fix(fix)
                .with_extra("choices", choices)
        })
    }

    fn render_fault(&self, fault: &anyhow::Error) -> anyhow::Result<ResponseEnvelope> {
        let detail = format!("{fault:?}");
        error!(target: DISPATCH_TARGET, error = %detail, "unhandled fault");
        let crash_report = self.settings.verbose_diagnostics().then_some(detail.as_str());
        ResponseEnvelope::from_error(&ApiError::internal(crash_report))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
