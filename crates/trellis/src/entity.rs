//! Capability contract for persisted entities.
//!
//! The serializer never inspects concrete entity types. Anything stored by an
//! [`EntityProvider`](crate::EntityProvider) implements [`Entity`] and
//! describes itself through its kind tag, primary key, ordered scalar fields
//! and ordered many-to-many relations.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::emitter::Emit;

/// Stable string tag naming an entity kind.
///
/// Registries key massagers and pending identifiers by this tag rather than by
/// Rust type identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(Cow<'static, str>);

impl EntityKind {
    /// Creates a kind from a static label.
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self(Cow::Borrowed(label))
    }

    /// Returns the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityKind {
    fn from(label: String) -> Self {
        Self(Cow::Owned(label))
    }
}

impl From<&'static str> for EntityKind {
    fn from(label: &'static str) -> Self {
        Self::new(label)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Auto-incremented integer key.
    Integer(i64),
    /// Free-form text key.
    Text(String),
}

impl Key {
    /// Interprets a JSON value as a key of the given type.
    ///
    /// Integer keys accept JSON numbers and numeric strings; text keys accept
    /// strings and integers.
    #[must_use]
    pub fn from_json(value: &Value, key_type: KeyType) -> Option<Self> {
        match (key_type, value) {
            (KeyType::Auto, Value::Number(number)) => number.as_i64().map(Self::Integer),
            (KeyType::Auto, Value::String(text)) => text.parse().ok().map(Self::Integer),
            (KeyType::Text, Value::String(text)) => Some(Self::Text(text.clone())),
            (KeyType::Text, Value::Number(number)) if number.is_i64() || number.is_u64() => {
                Some(Self::Text(number.to_string()))
            }
            _ => None,
        }
    }

    /// Parses an identifier captured from a request path.
    #[must_use]
    pub fn parse(raw: &str, key_type: KeyType) -> Option<Self> {
        match key_type {
            KeyType::Auto => raw.parse().ok().map(Self::Integer),
            KeyType::Text => (!raw.is_empty()).then(|| Self::Text(raw.to_owned())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Integer(value) => Self::from(*value),
            Key::Text(value) => Self::from(value.as_str()),
        }
    }
}

/// Declared type of a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Auto-incremented integer; identifiers are digits only.
    Auto,
    /// Text; identifiers are word characters.
    Text,
}

/// Named scalar field of an entity instance.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name as written in serialized output.
    pub name: String,
    /// Field value.
    pub value: Emit,
}

impl Field {
    /// Creates a field.
    pub fn new(name: impl Into<String>, value: impl Into<Emit>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Named many-to-many relation of an entity instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation name as written in serialized output.
    pub name: String,
    /// Primary keys of the related entities, in relation order.
    pub keys: Vec<Key>,
}

impl Relation {
    /// Creates a relation.
    pub fn new(name: impl Into<String>, keys: Vec<Key>) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }
}

/// Capability every persisted entity exposes to the serializer.
pub trait Entity: fmt::Debug + Send + Sync {
    /// Kind tag of the entity.
    fn kind(&self) -> &EntityKind;

    /// Primary key of the instance.
    fn primary_key(&self) -> Key;

    /// Scalar fields in declaration order, primary key included.
    fn fields(&self) -> Vec<Field>;

    /// Many-to-many relations in declaration order.
    fn relations(&self) -> Vec<Relation> {
        Vec::new()
    }
}

/// Declared type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean flag.
    Boolean,
    /// Signed integer.
    Integer,
    /// Binary floating point number.
    Float,
    /// Exact decimal, stored as text.
    Decimal,
    /// Free text.
    Text,
    /// Date and time, stored as RFC 3339 text.
    DateTime,
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// Time of day, stored as `HH:MM:SS`.
    Time,
}

impl FieldType {
    /// Returns the name used in validation messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Decimal => "decimal number",
            Self::Text => "string",
            Self::DateTime => "date/time",
            Self::Date => "date",
            Self::Time => "time",
        }
    }
}

/// Declaration of a scalar field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether a value must be present on save.
    pub required: bool,
}

/// Declaration of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Relation name.
    pub name: String,
    /// Kind of the related entities.
    pub target: EntityKind,
}

/// Schema of an entity kind: primary key, scalar fields and relations.
///
/// ```
/// use trellis::{EntityKind, FieldType, KeyType, Schema};
///
/// let schema = Schema::new(EntityKind::new("widget"), "id", KeyType::Auto)
///     .with_field("name", FieldType::Text, true)
///     .with_relation("tags", EntityKind::new("tag"));
/// assert!(schema.has_field("name"));
/// assert!(schema.relation("tags").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    kind: EntityKind,
    primary_key: String,
    key_type: KeyType,
    fields: Vec<FieldSpec>,
    relations: Vec<RelationSpec>,
}

impl Schema {
    /// Creates a schema with only a primary key.
    #[must_use]
    pub fn new(kind: EntityKind, primary_key: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            kind,
            primary_key: primary_key.into(),
            key_type,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declares a scalar field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            required,
        });
        self
    }

    /// Declares a many-to-many relation.
    #[must_use]
    pub fn with_relation(mut self, name: impl Into<String>, target: EntityKind) -> Self {
        self.relations.push(RelationSpec {
            name: name.into(),
            target,
        });
        self
    }

    /// Kind described by the schema.
    #[must_use]
    pub const fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Name of the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Declared primary-key type.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Declared scalar fields, primary key excluded.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Declared relations.
    #[must_use]
    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    /// Looks up a scalar field declaration.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Looks up a relation declaration.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Returns whether `name` is the primary key or a declared scalar field.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        name == self.primary_key || self.field(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(json!(42), KeyType::Auto, Some(Key::Integer(42)))]
    #[case(json!("42"), KeyType::Auto, Some(Key::Integer(42)))]
    #[case(json!("forty"), KeyType::Auto, None)]
    #[case(json!("alpha"), KeyType::Text, Some(Key::Text("alpha".to_owned())))]
    #[case(json!(7), KeyType::Text, Some(Key::Text("7".to_owned())))]
    #[case(json!(null), KeyType::Text, None)]
    fn keys_are_read_from_json(
        #[case] value: Value,
        #[case] key_type: KeyType,
        #[case] expected: Option<Key>,
    ) {
        assert_eq!(Key::from_json(&value, key_type), expected);
    }

    #[test]
    fn keys_convert_to_json_scalars() {
        assert_eq!(Value::from(&Key::Integer(3)), json!(3));
        assert_eq!(Value::from(&Key::from("x")), json!("x"));
    }

    #[test]
    fn schema_treats_primary_key_as_field() {
        let schema = Schema::new(EntityKind::new("widget"), "id", KeyType::Auto)
            .with_field("name", FieldType::Text, true);
        assert!(schema.has_field("id"));
        assert!(schema.has_field("name"));
        assert!(!schema.has_field("colour"));
    }
}
