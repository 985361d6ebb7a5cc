//! Object-graph serializer ("emitter").
//!
//! The emitter reduces an [`Emit`] tree to a JSON-safe [`Value`] following a
//! fixed dispatch rule: text verbatim, cursors and collections element-wise,
//! mappings value-wise, decimals as exact strings, entities through the
//! entity rule, temporal values in fixed ISO-8601 profiles, anything else as
//! text.
//!
//! ## Entity rule
//!
//! Scalar fields outside the exclusion set are reduced under their names and
//! many-to-many relations become the list of related primary keys. When a
//! [`Massager`] is registered for the entity's kind it receives the assembled
//! map and its return value replaces it.
//!
//! ## Two-pass emission
//!
//! [`Emitter::construct`] first runs a collection pass in which massagers
//! record the identifiers they need through
//! [`SerializationContext::defer`]. If anything was recorded, every
//! [`Manipulator`] batch-resolves its kind and the value is reduced again with
//! the resolved data available; otherwise the first pass is the result.

mod context;
mod value;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value, json};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};
use trellis_config::{Config, DEFAULT_EXCLUDED_FIELDS};

use crate::dispatch::Caller;
use crate::entity::{Entity, EntityKind};
use crate::errors::DispatchFailure;

pub use self::context::SerializationContext;
pub use self::value::{Cursor, Emit};

/// Tracing target for emitter operations.
pub(crate) const EMITTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::emitter");

/// Mime type of documents produced by the default emitter.
pub const JSON_MIME_TYPE: &str = "application/json; charset=utf-8";

const INDENT: &[u8] = b"    ";

/// Per-kind post-processing hook applied after the entity rule.
pub trait Massager: Send + Sync {
    /// Returns the final serialized form of `entity` given its assembled
    /// field map.
    ///
    /// # Errors
    ///
    /// Returns a failure when the entity cannot be serialized; it aborts the
    /// whole render.
    fn massage(
        &self,
        fields: Map<String, Value>,
        entity: &dyn Entity,
        context: &mut SerializationContext,
    ) -> Result<Value, DispatchFailure>;
}

impl<F> Massager for F
where
    F: Fn(Map<String, Value>, &dyn Entity, &mut SerializationContext) -> Result<Value, DispatchFailure>
        + Send
        + Sync,
{
    fn massage(
        &self,
        fields: Map<String, Value>,
        entity: &dyn Entity,
        context: &mut SerializationContext,
    ) -> Result<Value, DispatchFailure> {
        self(fields, entity, context)
    }
}

/// Deferred enrichment step run between the two emission passes.
///
/// A manipulator reads the identifiers pending for its kind, fetches them in
/// one batch and stores the results with [`SerializationContext::resolve`].
pub trait Manipulator: Send + Sync {
    /// Resolves pending identifiers.
    ///
    /// # Errors
    ///
    /// Returns a failure when the batch lookup fails; it aborts the render.
    fn resolve(&self, context: &mut SerializationContext) -> Result<(), DispatchFailure>;
}

impl<F> Manipulator for F
where
    F: Fn(&mut SerializationContext) -> Result<(), DispatchFailure> + Send + Sync,
{
    fn resolve(&self, context: &mut SerializationContext) -> Result<(), DispatchFailure> {
        self(context)
    }
}

/// Registrations and settings shared by every render of an emitter.
///
/// ```
/// use trellis::EmitterConfig;
///
/// let config = EmitterConfig::default().exclude("password");
/// assert!(config.is_excluded("password"));
/// assert!(config.is_excluded("active"));
/// ```
#[derive(Clone)]
pub struct EmitterConfig {
    excluded_fields: BTreeSet<String>,
    massagers: HashMap<EntityKind, Arc<dyn Massager>>,
    manipulators: Vec<Arc<dyn Manipulator>>,
    mime_type: String,
}

impl EmitterConfig {
    /// Builds a configuration honouring the shared exclusion set.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::default().with_excluded_fields(config.excluded_fields())
    }

    /// Replaces the exclusion set.
    #[must_use]
    pub fn with_excluded_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a field to the exclusion set.
    #[must_use]
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.excluded_fields.insert(field.into());
        self
    }

    /// Registers the massager for an entity kind, replacing any previous one.
    #[must_use]
    pub fn with_massager(mut self, kind: EntityKind, massager: impl Massager + 'static) -> Self {
        self.massagers.insert(kind, Arc::new(massager));
        self
    }

    /// Registers a manipulator. Manipulators run in registration order.
    #[must_use]
    pub fn with_manipulator(mut self, manipulator: impl Manipulator + 'static) -> Self {
        self.manipulators.push(Arc::new(manipulator));
        self
    }

    /// Overrides the mime type of rendered documents.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Returns whether `field` is withheld from entity output.
    #[must_use]
    pub fn is_excluded(&self, field: &str) -> bool {
        self.excluded_fields.contains(field)
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            excluded_fields: DEFAULT_EXCLUDED_FIELDS
                .iter()
                .map(|field| (*field).to_owned())
                .collect(),
            massagers: HashMap::new(),
            manipulators: Vec::new(),
            mime_type: JSON_MIME_TYPE.to_owned(),
        }
    }
}

impl fmt::Debug for EmitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterConfig")
            .field("excluded_fields", &self.excluded_fields)
            .field("massagers", &self.massagers.keys().collect::<Vec<_>>())
            .field("manipulators", &self.manipulators.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Serializer for one output representation.
///
/// Cloning is cheap; the configuration is shared and immutable.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    config: Arc<EmitterConfig>,
}

impl Emitter {
    /// Creates an emitter from its configuration.
    #[must_use]
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Mime type of rendered documents.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.config.mime_type
    }

    /// Reduces `value` and wraps it as `{"data": ...}`, rendered as JSON text.
    ///
    /// # Errors
    ///
    /// Returns any failure raised by massagers, manipulators or temporal
    /// formatting.
    pub fn emit(&self, value: &Emit, caller: Option<Caller>) -> Result<String, DispatchFailure> {
        let constructed = self.construct(value, caller)?;
        self.render(&json!({ "data": constructed }))
    }

    /// Reduces `value` with the two-pass discipline.
    ///
    /// # Errors
    ///
    /// Returns any failure raised by massagers, manipulators or temporal
    /// formatting.
    pub fn construct(&self, value: &Emit, caller: Option<Caller>) -> Result<Value, DispatchFailure> {
        let mut context = SerializationContext::new(caller);

        debug!(target: EMITTER_TARGET, "collection pass (enter)");
        context.set_collecting(true);
        let collected = self.reduce(value, &mut context)?;
        context.set_collecting(false);
        debug!(target: EMITTER_TARGET, "collection pass (exit)");

        if !context.has_pending() {
            return Ok(collected);
        }

        for manipulator in &self.config.manipulators {
            manipulator.resolve(&mut context)?;
        }

        debug!(target: EMITTER_TARGET, "enrichment pass (enter)");
        let enriched = self.reduce(value, &mut context)?;
        debug!(target: EMITTER_TARGET, "enrichment pass (exit)");
        Ok(enriched)
    }

    /// Reduces `value` in a single pass using `context`.
    ///
    /// # Errors
    ///
    /// Returns any failure raised by massagers or temporal formatting.
    pub fn reduce(
        &self,
        value: &Emit,
        context: &mut SerializationContext,
    ) -> Result<Value, DispatchFailure> {
        Ok(match value {
            Emit::Null => Value::Null,
            Emit::Bool(flag) => Value::Bool(*flag),
            Emit::Integer(number) => Value::from(*number),
            Emit::Unsigned(number) => Value::from(*number),
            Emit::Float(number) => serde_json::Number::from_f64(*number)
                .map_or_else(|| Value::String(number.to_string()), Value::Number),
            Emit::Text(text) | Emit::Other(text) => Value::String(text.clone()),
            Emit::Cursor(cursor) => Value::Array(
                cursor
                    .rows()
                    .map(|row| self.reduce(&row, context))
                    .collect::<Result<_, _>>()?,
            ),
            Emit::Sequence(items) | Emit::Set(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.reduce(item, context))
                    .collect::<Result<_, _>>()?,
            ),
            Emit::Mapping(entries) => {
                let mut map = Map::new();
                for (key, entry) in entries {
                    map.insert(key.clone(), self.reduce(entry, context)?);
                }
                Value::Object(map)
            }
            Emit::Decimal(number) => Value::String(number.to_string()),
            Emit::Entity(entity) => self.reduce_entity(entity.as_ref(), context)?,
            Emit::DateTime(moment) => Value::String(format_datetime(*moment)?),
            Emit::LocalDateTime(moment) => Value::String(format_datetime(moment.assume_utc())?),
            Emit::Date(date) => Value::String(
                date.format(format_description!("[year]-[month]-[day]"))
                    .map_err(temporal_fault)?,
            ),
            Emit::Time(time) => Value::String(
                time.format(format_description!("[hour]:[minute]:[second]"))
                    .map_err(temporal_fault)?,
            ),
            Emit::Json(json) => json.clone(),
        })
    }

    fn reduce_entity(
        &self,
        entity: &dyn Entity,
        context: &mut SerializationContext,
    ) -> Result<Value, DispatchFailure> {
        let mut fields = Map::new();
        for field in entity.fields() {
            if self.config.is_excluded(&field.name) {
                continue;
            }
            let reduced = self.reduce(&field.value, context)?;
            fields.insert(field.name, reduced);
        }

        for relation in entity.relations() {
            if self.config.is_excluded(&relation.name) {
                continue;
            }
            let keys = relation.keys.iter().map(Value::from).collect();
            fields.insert(relation.name, Value::Array(keys));
        }

        match self.config.massagers.get(entity.kind()) {
            Some(massager) => massager.massage(fields, entity, context),
            None => Ok(Value::Object(fields)),
        }
    }

    /// Renders a reduced structure as indented JSON text.
    ///
    /// # Errors
    ///
    /// Returns a fault if the document cannot be written.
    pub fn render(&self, data: &Value) -> Result<String, DispatchFailure> {
        let document = to_pretty_json(data).map_err(DispatchFailure::Fault)?;
        info!(
            target: EMITTER_TARGET,
            characters = document.chars().count(),
            mime_type = self.mime_type(),
            "rendered document"
        );
        Ok(document)
    }
}

/// Writes `value` as JSON indented by four spaces, keeping non-ASCII text.
pub(crate) fn to_pretty_json(value: &Value) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer)?)
}

fn format_datetime(moment: OffsetDateTime) -> Result<String, DispatchFailure> {
    moment
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
        ))
        .map_err(temporal_fault)
}

fn temporal_fault(error: time::error::Format) -> DispatchFailure {
    DispatchFailure::Fault(error.into())
}

#[cfg(test)]
mod tests;
