//! Entity storage capability consumed by model handlers.
//!
//! The framework never talks to a database directly. A
//! [`ModelHandler`](crate::ModelHandler) drives an [`EntityProvider`], which
//! looks entities up, lists them, and validates and saves drafts together
//! with their many-to-many links. A save either stores every draft it was
//! given or none of them. [`InMemoryProvider`] is a thread-safe reference
//! implementation.

mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::emitter::Cursor;
use crate::entity::{Entity, EntityKind, Key};

pub use self::memory::InMemoryProvider;

/// Field-level validation messages keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures reported by an [`EntityProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No entity of the kind has the key.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind that was searched.
        kind: EntityKind,
        /// Key that was not found.
        key: Key,
    },
    /// The draft failed validation.
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),
    /// The storage backend failed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ProviderError {
    /// Builds a validation failure for a single field.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation(errors)
    }
}

/// Values and relation members to validate and store for one entity.
///
/// A draft without a key creates a new entity; a draft with a key updates
/// the existing one, leaving fields and relations it does not mention
/// unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Key of the entity to update, or `None` to create one.
    pub key: Option<Key>,
    /// Field values, as received from the caller.
    pub values: Map<String, Value>,
    /// Replacement members per relation, as received from the caller.
    ///
    /// Members are coerced to the related kind's key type by the provider.
    pub relations: BTreeMap<String, Vec<Value>>,
}

impl Draft {
    /// Draft creating a new entity.
    #[must_use]
    pub const fn create(kind: EntityKind, values: Map<String, Value>) -> Self {
        Self {
            kind,
            key: None,
            values,
            relations: BTreeMap::new(),
        }
    }

    /// Draft updating the entity with `key`.
    #[must_use]
    pub const fn update(kind: EntityKind, key: Key, values: Map<String, Value>) -> Self {
        Self {
            kind,
            key: Some(key),
            values,
            relations: BTreeMap::new(),
        }
    }

    /// Replaces the members of `relation` when the draft is saved.
    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>, members: Vec<Value>) -> Self {
        self.relations.insert(relation.into(), members);
        self
    }
}

/// Storage operations needed by model handlers.
pub trait EntityProvider: Send + Sync {
    /// Fetches one entity.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the key is unknown.
    fn get(&self, kind: &EntityKind, key: &Key) -> Result<Arc<dyn Entity>, ProviderError>;

    /// Lists every entity of a kind as a cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Backend`] when the store cannot be read.
    fn list_all(&self, kind: &EntityKind) -> Result<Arc<dyn Cursor>, ProviderError>;

    /// Validates and stores a draft with its relations, returning the saved
    /// entity. Nothing is stored when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] with per-field messages when the
    /// draft or one of its relation members is invalid, or
    /// [`ProviderError::NotFound`] when updating an unknown key.
    fn save(&self, draft: Draft) -> Result<Arc<dyn Entity>, ProviderError>;

    /// Validates every draft, then stores them all, returning the saved
    /// entities in draft order. Nothing is stored when any draft fails.
    ///
    /// # Errors
    ///
    /// Returns the first draft's failure, as for [`EntityProvider::save`].
    fn save_all(&self, drafts: Vec<Draft>) -> Result<Vec<Arc<dyn Entity>>, ProviderError>;

    /// Deletes one entity.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the key is unknown.
    fn delete(&self, kind: &EntityKind, key: &Key) -> Result<(), ProviderError>;
}

impl<P: EntityProvider + ?Sized> EntityProvider for Arc<P> {
    fn get(&self, kind: &EntityKind, key: &Key) -> Result<Arc<dyn Entity>, ProviderError> {
        (**self).get(kind, key)
    }

    fn list_all(&self, kind: &EntityKind) -> Result<Arc<dyn Cursor>, ProviderError> {
        (**self).list_all(kind)
    }

    fn save(&self, draft: Draft) -> Result<Arc<dyn Entity>, ProviderError> {
        (**self).save(draft)
    }

    fn save_all(&self, drafts: Vec<Draft>) -> Result<Vec<Arc<dyn Entity>>, ProviderError> {
        (**self).save_all(drafts)
    }

    fn delete(&self, kind: &EntityKind, key: &Key) -> Result<(), ProviderError> {
        (**self).delete(kind, key)
    }
}
