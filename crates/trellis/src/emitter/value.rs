//! Closed set of values the emitter knows how to reduce.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::entity::{Entity, Key};

/// Provider-native result set, reduced to an ordered sequence.
///
/// The emitter walks a cursor once per traversal pass, so implementations
/// must yield the same rows each time [`Cursor::rows`] is called.
pub trait Cursor: fmt::Debug + Send + Sync {
    /// Iterates the rows of the result set in order.
    fn rows(&self) -> Box<dyn Iterator<Item = Emit> + '_>;
}

/// A value handed to the emitter for reduction to JSON.
#[derive(Debug, Clone)]
pub enum Emit {
    /// JSON `null`.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Integer(i64),
    /// Unsigned integer scalar.
    Unsigned(u64),
    /// Binary floating point scalar. Non-finite values fall back to text.
    Float(f64),
    /// Text, returned verbatim.
    Text(String),
    /// Exact decimal, rendered as its string form.
    Decimal(Decimal),
    /// Timestamp with offset, rendered in UTC.
    DateTime(OffsetDateTime),
    /// Timestamp without offset, taken to be UTC.
    LocalDateTime(PrimitiveDateTime),
    /// Calendar date.
    Date(Date),
    /// Time of day.
    Time(Time),
    /// Ordered collection.
    Sequence(Vec<Emit>),
    /// Unordered collection; output follows iteration order.
    Set(Vec<Emit>),
    /// Key-value mapping with keys copied verbatim.
    Mapping(Vec<(String, Emit)>),
    /// Provider result set.
    Cursor(Arc<dyn Cursor>),
    /// Persisted entity.
    Entity(Arc<dyn Entity>),
    /// Already JSON-safe value, passed through.
    Json(Value),
    /// Best-effort text representation of anything else.
    Other(String),
}

impl Emit {
    /// Wraps an entity.
    pub fn entity(entity: impl Entity + 'static) -> Self {
        Self::Entity(Arc::new(entity))
    }

    /// Wraps a cursor.
    pub fn cursor(cursor: impl Cursor + 'static) -> Self {
        Self::Cursor(Arc::new(cursor))
    }

    /// Builds a mapping from key-value pairs.
    pub fn mapping<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
    {
        Self::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Builds an unordered collection.
    pub fn set<V: Into<Self>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Captures the display form of a value the emitter has no rule for.
    pub fn display(value: &impl fmt::Display) -> Self {
        Self::Other(value.to_string())
    }
}

macro_rules! emit_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Emit {
                fn from(value: $source) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

emit_from! {
    bool => Bool,
    i32 => Integer,
    i64 => Integer,
    u32 => Unsigned,
    u64 => Unsigned,
    f64 => Float,
    String => Text,
    Decimal => Decimal,
    OffsetDateTime => DateTime,
    PrimitiveDateTime => LocalDateTime,
    Date => Date,
    Time => Time,
    Value => Json,
    Arc<dyn Entity> => Entity,
    Arc<dyn Cursor> => Cursor,
}

impl From<&str> for Emit {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Key> for Emit {
    fn from(key: Key) -> Self {
        match key {
            Key::Integer(value) => Self::Integer(value),
            Key::Text(value) => Self::Text(value),
        }
    }
}

impl<T: Into<Emit>> From<Option<T>> for Emit {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Emit>> From<Vec<T>> for Emit {
    fn from(items: Vec<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Emit>> From<BTreeSet<T>> for Emit {
    fn from(items: BTreeSet<T>) -> Self {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Emit>, S: BuildHasher> From<HashSet<T, S>> for Emit {
    fn from(items: HashSet<T, S>) -> Self {
        Self::set(items)
    }
}

impl<T: Into<Emit>> From<BTreeMap<String, T>> for Emit {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Self::mapping(entries)
    }
}

impl<T: Into<Emit>, S: BuildHasher> From<HashMap<String, T, S>> for Emit {
    fn from(entries: HashMap<String, T, S>) -> Self {
        Self::mapping(entries)
    }
}
