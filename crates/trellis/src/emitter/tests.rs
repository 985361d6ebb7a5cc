//! Unit tests for the emitter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mockall::mock;
use rstest::{fixture, rstest};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use time::macros::{date, datetime, time};

use super::*;
use crate::entity::{Field, Key, Relation};

static WIDGET: EntityKind = EntityKind::new("widget");
static OWNER: EntityKind = EntityKind::new("owner");

#[derive(Debug)]
struct Widget {
    id: i64,
    name: &'static str,
    owner: i64,
    tags: Vec<i64>,
}

impl Entity for Widget {
    fn kind(&self) -> &EntityKind {
        &WIDGET
    }

    fn primary_key(&self) -> Key {
        Key::Integer(self.id)
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("id", self.id),
            Field::new("name", self.name),
            Field::new("owner", self.owner),
            Field::new("active", true),
            Field::new("price", Decimal::new(1999, 2)),
        ]
    }

    fn relations(&self) -> Vec<Relation> {
        vec![Relation::new(
            "tags",
            self.tags.iter().copied().map(Key::Integer).collect(),
        )]
    }
}

#[derive(Debug)]
struct Rows(Vec<Emit>);

impl Cursor for Rows {
    fn rows(&self) -> Box<dyn Iterator<Item = Emit> + '_> {
        Box::new(self.0.iter().cloned())
    }
}

mock! {
    Enricher {}
    impl Manipulator for Enricher {
        fn resolve(&self, context: &mut SerializationContext) -> Result<(), DispatchFailure>;
    }
}

#[fixture]
fn widgets() -> Emit {
    Emit::from(vec![
        Emit::entity(Widget {
            id: 1,
            name: "sprocket",
            owner: 10,
            tags: vec![3, 1],
        }),
        Emit::entity(Widget {
            id: 2,
            name: "gear",
            owner: 11,
            tags: Vec::new(),
        }),
    ])
}

fn construct(emitter: &Emitter, value: &Emit) -> Value {
    emitter.construct(value, None).expect("construct should succeed")
}

/// Massager that looks the owner up during the second pass.
fn owner_massager(
    mut fields: Map<String, Value>,
    entity: &dyn Entity,
    context: &mut SerializationContext,
) -> Result<Value, DispatchFailure> {
    let owner = fields
        .get("owner")
        .and_then(|value| Key::from_json(value, crate::entity::KeyType::Auto));
    if let Some(owner) = owner {
        if context.is_collecting() {
            context.defer(&OWNER, owner);
        } else if let Some(resolved) = context.lookup(&OWNER, &owner) {
            fields.insert("owner".to_owned(), resolved.clone());
        }
    }
    fields.insert("kind".to_owned(), Value::from(entity.kind().as_str()));
    Ok(Value::Object(fields))
}

#[rstest]
#[case(Emit::Null, json!(null))]
#[case(Emit::from(true), json!(true))]
#[case(Emit::from(-4_i64), json!(-4))]
#[case(Emit::from(u64::MAX), json!(u64::MAX))]
#[case(Emit::from(1.5_f64), json!(1.5))]
#[case(Emit::from("plain"), json!("plain"))]
#[case(Emit::from(json!({"nested": [1, 2]})), json!({"nested": [1, 2]}))]
#[case(Emit::display(&std::net::Ipv4Addr::LOCALHOST), json!("127.0.0.1"))]
fn scalars_reduce_to_json(#[case] value: Emit, #[case] expected: Value) {
    assert_eq!(construct(&Emitter::default(), &value), expected);
}

#[test]
fn non_finite_floats_fall_back_to_text() {
    assert_eq!(construct(&Emitter::default(), &Emit::from(f64::NAN)), json!("NaN"));
}

#[test]
fn nested_collections_round_trip_through_rendering() {
    let value = Emit::mapping([
        ("name", Emit::from("crate")),
        ("sizes", Emit::from(vec![1_i64, 2, 3])),
        ("meta", Emit::mapping([("ok", Emit::from(true)), ("none", Emit::Null)])),
    ]);
    let emitter = Emitter::default();
    let document = emitter.emit(&value, None).expect("emit");
    let parsed: Value = serde_json::from_str(&document).expect("valid json");
    assert_eq!(
        parsed,
        json!({"data": {"name": "crate", "sizes": [1, 2, 3], "meta": {"ok": true, "none": null}}})
    );
}

#[test]
fn mapping_keys_keep_their_order() {
    let value = Emit::mapping([("zeta", 1_i64), ("alpha", 2)]);
    let reduced = construct(&Emitter::default(), &value);
    let keys: Vec<_> = reduced.as_object().expect("object").keys().cloned().collect();
    assert_eq!(keys, vec!["zeta", "alpha"]);
}

#[test]
fn decimals_render_exactly() {
    let value = Emit::from(Decimal::from_str_exact("0.1000000000000000000000000001").expect("decimal"));
    assert_eq!(
        construct(&Emitter::default(), &value),
        json!("0.1000000000000000000000000001")
    );
}

#[rstest]
#[case(Emit::from(datetime!(2024-03-01 12:00:00 +02:00)), "2024-03-01T10:00:00+0000")]
#[case(Emit::from(datetime!(2024-03-01 12:00:00)), "2024-03-01T12:00:00+0000")]
#[case(Emit::from(date!(2024-03-01)), "2024-03-01")]
#[case(Emit::from(time!(07:05:09)), "07:05:09")]
fn temporal_values_use_fixed_profiles(#[case] value: Emit, #[case] expected: &str) {
    assert_eq!(construct(&Emitter::default(), &value), json!(expected));
}

#[test]
fn cursors_reduce_to_ordered_sequences() {
    let value = Emit::cursor(Rows(vec![Emit::from("b"), Emit::from("a")]));
    assert_eq!(construct(&Emitter::default(), &value), json!(["b", "a"]));
}

#[rstest]
fn entity_rule_skips_excluded_fields_and_flattens_relations(widgets: Emit) {
    let reduced = construct(&Emitter::default(), &widgets);
    assert_eq!(
        reduced,
        json!([
            {"id": 1, "name": "sprocket", "owner": 10, "price": "19.99", "tags": [3, 1]},
            {"id": 2, "name": "gear", "owner": 11, "price": "19.99", "tags": []},
        ])
    );
}

#[rstest]
fn configured_exclusions_apply_to_fields_and_relations(widgets: Emit) {
    let emitter = Emitter::new(EmitterConfig::default().exclude("price").exclude("tags"));
    let reduced = construct(&emitter, &widgets);
    for item in reduced.as_array().expect("array") {
        let object = item.as_object().expect("object");
        assert!(!object.contains_key("price"));
        assert!(!object.contains_key("tags"));
        assert!(!object.contains_key("active"));
    }
}

#[rstest]
fn massager_output_replaces_field_map_once_per_entity(widgets: Emit) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = EmitterConfig::default().with_massager(
        WIDGET.clone(),
        move |fields: Map<String, Value>,
              _entity: &dyn Entity,
              _context: &mut SerializationContext|
              -> Result<Value, DispatchFailure> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"summary": fields["name"]}))
        },
    );

    let reduced = construct(&Emitter::new(config), &widgets);
    assert_eq!(reduced, json!([{"summary": "sprocket"}, {"summary": "gear"}]));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[rstest]
fn collection_pass_is_returned_when_nothing_is_pending(widgets: Emit) {
    let mut enricher = MockEnricher::new();
    enricher.expect_resolve().never();
    let emitter = Emitter::new(EmitterConfig::default().with_manipulator(enricher));

    let two_pass = construct(&emitter, &widgets);
    let mut context = SerializationContext::new(None);
    let single_pass = emitter.reduce(&widgets, &mut context).expect("reduce");
    assert_eq!(two_pass, single_pass);
}

#[rstest]
fn pending_identifiers_are_resolved_in_one_batch(widgets: Emit) {
    let mut enricher = MockEnricher::new();
    enricher.expect_resolve().times(1).returning(|context| {
        let keys: Vec<Key> = context.pending(&OWNER).cloned().collect();
        assert_eq!(keys, vec![Key::Integer(10), Key::Integer(11)]);
        for key in keys {
            let name = format!("owner-{key}");
            context.resolve(&OWNER, key, json!({"name": name}));
        }
        Ok(())
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = EmitterConfig::default()
        .with_massager(
            WIDGET.clone(),
            move |fields: Map<String, Value>,
                  entity: &dyn Entity,
                  context: &mut SerializationContext|
                  -> Result<Value, DispatchFailure> {
                counter.fetch_add(1, Ordering::SeqCst);
                owner_massager(fields, entity, context)
            },
        )
        .with_manipulator(enricher);

    let reduced = construct(&Emitter::new(config), &widgets);
    assert_eq!(reduced[0]["owner"], json!({"name": "owner-10"}));
    assert_eq!(reduced[1]["owner"], json!({"name": "owner-11"}));
    assert_eq!(reduced[0]["kind"], json!("widget"));
    // Two entities, each massaged once in the collection pass and once after.
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[rstest]
fn manipulator_failures_abort_the_render(widgets: Emit) {
    let mut enricher = MockEnricher::new();
    enricher
        .expect_resolve()
        .times(1)
        .returning(|_| Err(DispatchFailure::Fault(anyhow::anyhow!("bulk fetch failed"))));
    let config = EmitterConfig::default()
        .with_massager(WIDGET.clone(), owner_massager)
        .with_manipulator(enricher);

    let result = Emitter::new(config).construct(&widgets, None);
    assert!(matches!(result, Err(DispatchFailure::Fault(_))));
}

#[test]
fn rendering_indents_by_four_spaces_and_keeps_unicode() {
    let document = Emitter::default()
        .render(&json!({"data": {"name": "café"}}))
        .expect("render");
    assert_eq!(document, "{\n    \"data\": {\n        \"name\": \"café\"\n    }\n}");
}

#[test]
fn context_exposes_the_caller() {
    let caller = Caller::new("user-7");
    let emitter = Emitter::new(EmitterConfig::default().with_massager(
        WIDGET.clone(),
        |_fields: Map<String, Value>,
         _entity: &dyn Entity,
         context: &mut SerializationContext|
         -> Result<Value, DispatchFailure> {
            Ok(json!(context.caller().map(Caller::as_str)))
        },
    ));
    let value = Emit::entity(Widget {
        id: 5,
        name: "cog",
        owner: 1,
        tags: Vec::new(),
    });
    let reduced = emitter.construct(&value, Some(caller)).expect("construct");
    assert_eq!(reduced, json!("user-7"));
}
