//! Per-render scratch state for two-pass emission.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::dispatch::Caller;
use crate::entity::{EntityKind, Key};

/// Mutable state owned by a single top-level render.
///
/// During the collection pass massagers and manipulators record the
/// identifiers they will need with [`defer`](Self::defer). Manipulators then
/// resolve each kind in one batch and store the results with
/// [`resolve`](Self::resolve), and the second pass reads them back with
/// [`lookup`](Self::lookup).
#[derive(Debug, Default)]
pub struct SerializationContext {
    collecting: bool,
    pending: BTreeMap<EntityKind, BTreeSet<Key>>,
    resolved: BTreeMap<EntityKind, BTreeMap<Key, Value>>,
    caller: Option<Caller>,
}

impl SerializationContext {
    /// Creates an empty context for the given caller.
    #[must_use]
    pub fn new(caller: Option<Caller>) -> Self {
        Self {
            caller,
            ..Self::default()
        }
    }

    /// Returns whether the collection pass is running.
    #[must_use]
    pub const fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub(crate) fn set_collecting(&mut self, collecting: bool) {
        self.collecting = collecting;
    }

    /// Records an identifier to resolve after the collection pass.
    ///
    /// Returns `false`, recording nothing, outside the collection pass.
    pub fn defer(&mut self, kind: &EntityKind, key: Key) -> bool {
        if !self.collecting {
            return false;
        }
        self.pending.entry(kind.clone()).or_default().insert(key);
        true
    }

    /// Identifiers recorded for `kind`, in key order.
    pub fn pending(&self, kind: &EntityKind) -> impl Iterator<Item = &Key> + '_ {
        self.pending.get(kind).into_iter().flatten()
    }

    /// Returns whether any kind accumulated pending identifiers.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|keys| !keys.is_empty())
    }

    /// Stores data resolved for an identifier.
    pub fn resolve(&mut self, kind: &EntityKind, key: Key, value: Value) {
        self.resolved.entry(kind.clone()).or_default().insert(key, value);
    }

    /// Returns data resolved for an identifier, if any.
    #[must_use]
    pub fn lookup(&self, kind: &EntityKind, key: &Key) -> Option<&Value> {
        self.resolved.get(kind).and_then(|entries| entries.get(key))
    }

    /// Caller identity resolved by the dispatch pipeline.
    #[must_use]
    pub const fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const TAG: EntityKind = EntityKind::new("tag");

    #[test]
    fn defer_only_records_while_collecting() {
        let mut context = SerializationContext::new(None);
        assert!(!context.defer(&TAG, Key::Integer(1)));
        assert!(!context.has_pending());

        context.set_collecting(true);
        assert!(context.defer(&TAG, Key::Integer(2)));
        assert!(context.defer(&TAG, Key::Integer(2)));
        assert!(context.has_pending());
        assert_eq!(context.pending(&TAG).collect::<Vec<_>>(), vec![&Key::Integer(2)]);
    }

    #[test]
    fn resolved_values_are_looked_up_by_kind_and_key() {
        let mut context = SerializationContext::new(None);
        context.resolve(&TAG, Key::Integer(3), json!({"label": "red"}));
        assert_eq!(context.lookup(&TAG, &Key::Integer(3)), Some(&json!({"label": "red"})));
        assert_eq!(context.lookup(&TAG, &Key::Integer(4)), None);
        assert_eq!(context.pending(&TAG).count(), 0);
    }
}
