//! Generic CRUD handler over an [`EntityProvider`].
//!
//! | Verb | Without identifier | With identifier |
//! |---|---|---|
//! | `GET` | every entity | the entity, or `DoesNotExist` |
//! | `POST` | create from the payload, no content | `NotImplemented` |
//! | `PUT` | bulk update from a list, no content | update and return the entity |
//! | `DELETE` | `NotImplemented` | delete, no content |
//!
//! Payload keys must name the primary key, a declared field or a declared
//! relation. Relations take a list of related primary keys and are saved
//! with the scalar values, so a rejected member leaves nothing stored. Bulk
//! updates are validated as a whole before any item is written.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::{DISPATCH_TARGET, Handler, HandlerResult, IdentifierPattern, Reply, Request};
use crate::emitter::Emit;
use crate::entity::{Entity, Key, Schema};
use crate::errors::{ApiError, DispatchFailure};
use crate::provider::{Draft, EntityProvider, FieldErrors, ProviderError};

/// Handler exposing one entity kind through an [`EntityProvider`].
#[derive(Debug)]
pub struct ModelHandler<P> {
    provider: P,
    schema: Schema,
}

impl<P: EntityProvider> ModelHandler<P> {
    /// Creates a handler for the kind described by `schema`.
    pub const fn new(provider: P, schema: Schema) -> Self {
        Self { provider, schema }
    }

    /// Schema of the exposed kind.
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Identifier pattern matching the primary-key type.
    pub const fn pattern(&self) -> IdentifierPattern {
        IdentifierPattern::for_key_type(self.schema.key_type())
    }

    fn key(&self, request: &Request) -> Result<Option<Key>, ApiError> {
        request
            .identifier()
            .map(|raw| {
                Key::parse(raw, self.schema.key_type())
                    .ok_or_else(|| ApiError::invalid_parameter(self.schema.primary_key()))
            })
            .transpose()
    }

    fn payload_object<'r>(&self, request: &'r Request) -> Result<&'r Map<String, Value>, ApiError> {
        request
            .payload()
            .and_then(Value::as_object)
            .ok_or_else(|| ApiError::invalid_parameter("JSON"))
    }

    /// Builds a draft from a payload object.
    fn draft(&self, key: Option<Key>, payload: &Map<String, Value>) -> Result<Draft, ApiError> {
        let kind = self.schema.kind().clone();
        let mut draft = match key {
            Some(key) => Draft::update(kind, key, Map::new()),
            None => Draft::create(kind, Map::new()),
        };
        for (name, value) in payload {
            if name == self.schema.primary_key() {
                continue;
            }
            if self.schema.field(name).is_some() {
                draft.values.insert(name.clone(), value.clone());
            } else if self.schema.relation(name).is_some() {
                let members = value
                    .as_array()
                    .ok_or_else(|| ApiError::invalid_parameter(name))?;
                draft.relations.insert(name.clone(), members.clone());
            } else {
                return Err(ApiError::invalid_parameter(name));
            }
        }
        Ok(draft)
    }

    fn save(&self, draft: Draft) -> Result<Arc<dyn Entity>, DispatchFailure> {
        let entity = self.provider.save(draft).map_err(provider_failure)?;
        debug!(
            target: DISPATCH_TARGET,
            kind = %self.schema.kind(),
            key = %entity.primary_key(),
            "entity stored"
        );
        Ok(entity)
    }

    fn save_all(&self, drafts: Vec<Draft>) -> Result<(), DispatchFailure> {
        let saved = self.provider.save_all(drafts).map_err(provider_failure)?;
        debug!(
            target: DISPATCH_TARGET,
            kind = %self.schema.kind(),
            count = saved.len(),
            "entities stored"
        );
        Ok(())
    }
}

impl<P: EntityProvider> Handler for ModelHandler<P> {
    fn read(&self, request: &Request) -> HandlerResult {
        let kind = self.schema.kind();
        let body = match self.key(request)? {
            Some(key) => Emit::Entity(self.provider.get(kind, &key).map_err(provider_failure)?),
            None => Emit::Cursor(self.provider.list_all(kind).map_err(provider_failure)?),
        };
        Ok(Reply::ok(body))
    }

    fn create(&self, request: &Request) -> HandlerResult {
        if request.identifier().is_some() {
            return Err(ApiError::not_implemented("POST").into());
        }
        let payload = self.payload_object(request)?;
        self.save(self.draft(None, payload)?)?;
        Ok(Reply::no_content())
    }

    fn update(&self, request: &Request) -> HandlerResult {
        if let Some(key) = self.key(request)? {
            let payload = self.payload_object(request)?;
            let entity = self.save(self.draft(Some(key), payload)?)?;
            return Ok(Reply::ok(Emit::Entity(entity)));
        }

        let items = request
            .payload()
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::invalid_parameter("JSON"))?;
        let drafts = items
            .iter()
            .map(|item| {
                let object = item
                    .as_object()
                    .ok_or_else(|| ApiError::invalid_parameter("JSON"))?;
                let key = object
                    .get(self.schema.primary_key())
                    .and_then(|value| Key::from_json(value, self.schema.key_type()))
                    .ok_or_else(|| ApiError::invalid_parameter(self.schema.primary_key()))?;
                self.draft(Some(key), object)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.save_all(drafts)?;
        Ok(Reply::no_content())
    }

    fn delete(&self, request: &Request) -> HandlerResult {
        let Some(key) = self.key(request)? else {
            return Err(ApiError::not_implemented("DELETE").into());
        };
        self.provider
            .delete(self.schema.kind(), &key)
            .map_err(provider_failure)?;
        Ok(Reply::no_content())
    }
}

fn provider_failure(error: ProviderError) -> DispatchFailure {
    match error {
        ProviderError::NotFound { kind, key } => {
            ApiError::does_not_exist(kind.as_str(), [("primary_key", key)]).into()
        }
        ProviderError::Validation(errors) => validation_failure(&errors).into(),
        ProviderError::Backend(fault) => DispatchFailure::Fault(fault),
    }
}

fn validation_failure(errors: &FieldErrors) -> ApiError {
    let message = errors
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ");
    let fields: Map<String, Value> = errors
        .iter()
        .map(|(field, messages)| (field.clone(), Value::from(messages.clone())))
        .collect();
    ApiError::invalid_parameter_message(message).with_extra("fields", fields)
}
