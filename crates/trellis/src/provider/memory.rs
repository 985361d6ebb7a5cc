//! Thread-safe in-memory entity store.
//!
//! Values are kept as JSON scalars and checked against the registered
//! [`Schema`] on every save. Entities handed out are snapshots; later writes
//! do not affect them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};
use tracing::debug;

use super::{Draft, EntityProvider, FieldErrors, ProviderError};
use crate::emitter::{Cursor, Emit};
use crate::entity::{Entity, EntityKind, Field, FieldType, Key, KeyType, Relation, Schema};

const PROVIDER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::provider");

const REQUIRED: &str = "This field is required.";

type Tables = HashMap<EntityKind, Table>;

#[derive(Debug, Clone, Default)]
struct Row {
    values: Map<String, Value>,
    links: BTreeMap<String, Vec<Key>>,
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Key, Row>,
    last_id: i64,
}

/// Entity provider backed by in-process maps.
///
/// ```
/// use serde_json::{Map, json};
/// use trellis::{
///     Draft, Entity, EntityKind, EntityProvider, FieldType, InMemoryProvider, KeyType, Schema,
/// };
///
/// let widget = EntityKind::new("widget");
/// let provider = InMemoryProvider::new().with_schema(
///     Schema::new(widget.clone(), "id", KeyType::Auto).with_field("name", FieldType::Text, true),
/// );
/// let mut values = Map::new();
/// values.insert("name".to_owned(), json!("sprocket"));
/// let saved = provider.save(Draft::create(widget, values)).expect("valid draft");
/// assert_eq!(saved.primary_key().to_string(), "1");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    schemas: HashMap<EntityKind, Arc<Schema>>,
    tables: RwLock<Tables>,
}

impl InMemoryProvider {
    /// Creates a store with no registered kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the schema of a kind, replacing any previous one.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.insert(schema.kind().clone(), Arc::new(schema));
        self
    }

    /// Returns the schema registered for `kind`.
    #[must_use]
    pub fn schema(&self, kind: &EntityKind) -> Option<&Schema> {
        self.schemas.get(kind).map(Arc::as_ref)
    }

    fn schema_for(&self, kind: &EntityKind) -> Result<Arc<Schema>, ProviderError> {
        self.schemas
            .get(kind)
            .cloned()
            .ok_or_else(|| anyhow!("no schema registered for kind '{kind}'").into())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, ProviderError> {
        self.tables
            .read()
            .map_err(|_| anyhow!("entity store lock poisoned").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, ProviderError> {
        self.tables
            .write()
            .map_err(|_| anyhow!("entity store lock poisoned").into())
    }
}

impl EntityProvider for InMemoryProvider {
    fn get(&self, kind: &EntityKind, key: &Key) -> Result<Arc<dyn Entity>, ProviderError> {
        let schema = self.schema_for(kind)?;
        let tables = self.read()?;
        let row = tables
            .get(kind)
            .and_then(|table| table.rows.get(key))
            .ok_or_else(|| not_found(kind, key))?;
        Ok(Arc::new(StoredEntity {
            schema,
            key: key.clone(),
            row: row.clone(),
        }))
    }

    fn list_all(&self, kind: &EntityKind) -> Result<Arc<dyn Cursor>, ProviderError> {
        let schema = self.schema_for(kind)?;
        let tables = self.read()?;
        let rows = tables
            .get(kind)
            .into_iter()
            .flat_map(|table| table.rows.iter())
            .map(|(key, row)| {
                Emit::entity(StoredEntity {
                    schema: Arc::clone(&schema),
                    key: key.clone(),
                    row: row.clone(),
                })
            })
            .collect();
        Ok(Arc::new(EntityRows(rows)))
    }

    fn save(&self, draft: Draft) -> Result<Arc<dyn Entity>, ProviderError> {
        let mut tables = self.write()?;
        let staged = Batch::new(self, &tables).stage(draft)?;
        Ok(commit(&mut tables, staged))
    }

    fn save_all(&self, drafts: Vec<Draft>) -> Result<Vec<Arc<dyn Entity>>, ProviderError> {
        let mut tables = self.write()?;
        let staged = {
            let mut batch = Batch::new(self, &tables);
            for draft in drafts {
                let entity = batch.stage(draft)?;
                batch.staged.push(entity);
            }
            batch.staged
        };
        Ok(staged
            .into_iter()
            .map(|entity| commit(&mut tables, entity))
            .collect())
    }

    fn delete(&self, kind: &EntityKind, key: &Key) -> Result<(), ProviderError> {
        let mut tables = self.write()?;
        tables
            .get_mut(kind)
            .and_then(|table| table.rows.remove(key))
            .ok_or_else(|| not_found(kind, key))?;

        // Drop links that pointed at the deleted entity.
        for (owner_kind, table) in tables.iter_mut() {
            let Some(owner) = self.schemas.get(owner_kind) else {
                continue;
            };
            let names: Vec<&str> = owner
                .relations()
                .iter()
                .filter(|spec| &spec.target == kind)
                .map(|spec| spec.name.as_str())
                .collect();
            if names.is_empty() {
                continue;
            }
            for row in table.rows.values_mut() {
                for name in &names {
                    if let Some(members) = row.links.get_mut(*name) {
                        members.retain(|member| member != key);
                    }
                }
            }
        }
        debug!(target: PROVIDER_TARGET, %kind, %key, "entity deleted");
        Ok(())
    }
}

fn not_found(kind: &EntityKind, key: &Key) -> ProviderError {
    ProviderError::NotFound {
        kind: kind.clone(),
        key: key.clone(),
    }
}

/// Drafts validated against the committed tables plus the drafts staged
/// before them in the same write.
struct Batch<'t> {
    provider: &'t InMemoryProvider,
    tables: &'t Tables,
    staged: Vec<StoredEntity>,
}

impl<'t> Batch<'t> {
    const fn new(provider: &'t InMemoryProvider, tables: &'t Tables) -> Self {
        Self {
            provider,
            tables,
            staged: Vec::new(),
        }
    }

    fn row(&self, kind: &EntityKind, key: &Key) -> Option<&Row> {
        self.staged
            .iter()
            .rev()
            .find(|entity| entity.schema.kind() == kind && &entity.key == key)
            .map(|entity| &entity.row)
            .or_else(|| self.tables.get(kind).and_then(|table| table.rows.get(key)))
    }

    fn last_id(&self, kind: &EntityKind) -> i64 {
        let committed = self.tables.get(kind).map_or(0, |table| table.last_id);
        self.staged
            .iter()
            .filter(|entity| entity.schema.kind() == kind)
            .filter_map(|entity| match entity.key {
                Key::Integer(id) => Some(id),
                Key::Text(_) => None,
            })
            .fold(committed, i64::max)
    }

    /// Validates one draft, returning the entity it would store.
    fn stage(&self, draft: Draft) -> Result<StoredEntity, ProviderError> {
        let schema = self.provider.schema_for(&draft.kind)?;
        let mut row = match &draft.key {
            Some(key) => self
                .row(&draft.kind, key)
                .cloned()
                .ok_or_else(|| not_found(&draft.kind, key))?,
            None => Row::default(),
        };

        let mut errors = FieldErrors::new();
        for (name, value) in &draft.values {
            if name == schema.primary_key() {
                continue;
            }
            if schema.field(name).is_some() {
                row.values.insert(name.clone(), value.clone());
            } else {
                push_error(&mut errors, name, "Unknown field.");
            }
        }
        validate_row(&schema, &row.values, &mut errors);

        for (relation, members) in &draft.relations {
            if let Some(keys) = self.members(&schema, relation, members, &mut errors)? {
                row.links.insert(relation.clone(), keys);
            }
        }

        let key = match draft.key {
            Some(key) => Some(key),
            None => match self.new_key(&schema, &draft.values) {
                Ok(key) => Some(key),
                Err(message) => {
                    push_error(&mut errors, schema.primary_key(), message);
                    None
                }
            },
        };

        match key.filter(|_| errors.is_empty()) {
            Some(key) => Ok(StoredEntity { schema, key, row }),
            None => {
                debug!(target: PROVIDER_TARGET, kind = %draft.kind, ?errors, "draft rejected");
                Err(ProviderError::Validation(errors))
            }
        }
    }

    /// Coerces relation members to the related kind's key type and checks
    /// that each one exists. Returns `None` when a member was rejected.
    fn members(
        &self,
        schema: &Schema,
        relation: &str,
        members: &[Value],
        errors: &mut FieldErrors,
    ) -> Result<Option<Vec<Key>>, ProviderError> {
        let Some(spec) = schema.relation(relation) else {
            push_error(errors, relation, "Unknown relation.");
            return Ok(None);
        };
        let target = self.provider.schema_for(&spec.target)?;

        let mut keys = Vec::with_capacity(members.len());
        let mut valid = true;
        for member in members {
            match Key::from_json(member, target.key_type())
                .filter(|key| self.row(&spec.target, key).is_some())
            {
                Some(key) => keys.push(key),
                None => {
                    valid = false;
                    push_error(
                        errors,
                        relation,
                        format!("Unknown {} {}.", spec.target, member_label(member)),
                    );
                }
            }
        }
        Ok(valid.then_some(keys))
    }

    fn new_key(&self, schema: &Schema, values: &Map<String, Value>) -> Result<Key, String> {
        match schema.key_type() {
            KeyType::Auto => Ok(Key::Integer(self.last_id(schema.kind()) + 1)),
            KeyType::Text => {
                let key = values
                    .get(schema.primary_key())
                    .and_then(|value| Key::from_json(value, KeyType::Text))
                    .ok_or_else(|| REQUIRED.to_owned())?;
                if self.row(schema.kind(), &key).is_some() {
                    return Err(format!("A {} with this key already exists.", schema.kind()));
                }
                Ok(key)
            }
        }
    }
}

fn commit(tables: &mut Tables, entity: StoredEntity) -> Arc<dyn Entity> {
    let table = tables.entry(entity.schema.kind().clone()).or_default();
    if let Key::Integer(id) = entity.key {
        table.last_id = table.last_id.max(id);
    }
    table.rows.insert(entity.key.clone(), entity.row.clone());
    debug!(target: PROVIDER_TARGET, kind = %entity.schema.kind(), key = %entity.key, "entity saved");
    Arc::new(entity)
}

fn member_label(member: &Value) -> String {
    match member {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn push_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_owned()).or_default().push(message.into());
}

fn validate_row(schema: &Schema, values: &Map<String, Value>, errors: &mut FieldErrors) {
    for spec in schema.fields() {
        match values.get(&spec.name) {
            None | Some(Value::Null) if spec.required => push_error(errors, &spec.name, REQUIRED),
            None | Some(Value::Null) => {}
            Some(value) if !accepts(spec.field_type, value) => push_error(
                errors,
                &spec.name,
                format!("Enter a valid {}.", spec.field_type.describe()),
            ),
            Some(_) => {}
        }
    }
}

fn accepts(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (FieldType::Boolean, Value::Bool(_))
        | (FieldType::Float | FieldType::Decimal, Value::Number(_))
        | (FieldType::Text, Value::String(_)) => true,
        (FieldType::Integer, Value::Number(number)) => number.is_i64(),
        (FieldType::Decimal, Value::String(text)) => Decimal::from_str_exact(text).is_ok(),
        (FieldType::DateTime, Value::String(text)) => OffsetDateTime::parse(text, &Rfc3339).is_ok(),
        (FieldType::Date, Value::String(text)) => {
            Date::parse(text, format_description!("[year]-[month]-[day]")).is_ok()
        }
        (FieldType::Time, Value::String(text)) => {
            Time::parse(text, format_description!("[hour]:[minute]:[second]")).is_ok()
        }
        _ => false,
    }
}

/// Converts a stored JSON scalar back into its typed form.
fn to_emit(field_type: FieldType, value: Option<&Value>) -> Emit {
    let Some(value) = value else {
        return Emit::Null;
    };
    let typed = match (field_type, value) {
        (FieldType::Decimal, Value::String(text)) => {
            Decimal::from_str_exact(text).ok().map(Emit::Decimal)
        }
        (FieldType::Decimal, Value::Number(number)) => {
            Decimal::from_str_exact(&number.to_string()).ok().map(Emit::Decimal)
        }
        (FieldType::DateTime, Value::String(text)) => {
            OffsetDateTime::parse(text, &Rfc3339).ok().map(Emit::DateTime)
        }
        (FieldType::Date, Value::String(text)) => {
            Date::parse(text, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(Emit::Date)
        }
        (FieldType::Time, Value::String(text)) => {
            Time::parse(text, format_description!("[hour]:[minute]:[second]"))
                .ok()
                .map(Emit::Time)
        }
        _ => None,
    };
    typed.unwrap_or_else(|| Emit::Json(value.clone()))
}

#[derive(Debug)]
struct StoredEntity {
    schema: Arc<Schema>,
    key: Key,
    row: Row,
}

impl Entity for StoredEntity {
    fn kind(&self) -> &EntityKind {
        self.schema.kind()
    }

    fn primary_key(&self) -> Key {
        self.key.clone()
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::with_capacity(self.schema.fields().len() + 1);
        fields.push(Field::new(self.schema.primary_key(), self.key.clone()));
        fields.extend(self.schema.fields().iter().map(|spec| {
            Field::new(
                spec.name.clone(),
                to_emit(spec.field_type, self.row.values.get(&spec.name)),
            )
        }));
        fields
    }

    fn relations(&self) -> Vec<Relation> {
        self.schema
            .relations()
            .iter()
            .map(|spec| {
                Relation::new(
                    spec.name.clone(),
                    self.row.links.get(&spec.name).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }
}

/// Snapshot of a kind's rows in key order.
#[derive(Debug)]
struct EntityRows(Vec<Emit>);

impl Cursor for EntityRows {
    fn rows(&self) -> Box<dyn Iterator<Item = Emit> + '_> {
        Box::new(self.0.iter().cloned())
    }
}
