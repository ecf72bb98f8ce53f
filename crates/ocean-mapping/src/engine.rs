use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use ocean_model::{Entity, RawRecord, RelationValue, SearchIdentifier};
use serde_json::Value;
use tracing::instrument;

use crate::compiled::CompiledResourceConfig;
use crate::error::MappingError;
use crate::resolver::SearchResolver;

/// ResolutionPolicy selects how strict-mode search-identifier relations are
/// handled during mapping (`spec.md` §9, Open Question: search-identifier
/// resolution mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Strict resolves every search identifier to exactly one target
    /// identifier via the injected [`SearchResolver`], failing the record on
    /// zero or multiple matches.
    Strict,
    /// Permissive passes the search identifier through unresolved, letting
    /// the remote catalog interpret it at upsert time.
    Permissive,
}

/// MapOutcome is the result of mapping a single record (or a single exploded
/// item, when `itemsToParse` is set).
#[derive(Debug, Clone)]
pub enum MapOutcome {
    /// Filtered means the resource's selector evaluated falsy; the record was
    /// deliberately skipped, not an error.
    Filtered,
    /// Mapped carries the successfully produced entity.
    Mapped(Box<Entity>),
    /// Failed carries the reason mapping could not produce an entity.
    Failed(MappingError),
}

/// map_record maps one raw record against a compiled resource config,
/// producing zero, one, or (when `itemsToParse` explodes the record) many
/// outcomes. Selector filtering and the `itemsToParse` explosion are
/// evaluated once against the whole record; everything downstream of that
/// runs per exploded item (or once, against the record itself, when there is
/// no `itemsToParse`).
#[instrument(skip_all, fields(kind = %rc.kind))]
pub async fn map_record(
    record: &RawRecord,
    rc: &CompiledResourceConfig,
    policy: ResolutionPolicy,
    resolver: &dyn SearchResolver,
) -> Vec<MapOutcome> {
    let root = record.value();

    if let Some(selector) = &rc.selector_query {
        match selector.evaluate_truthy(root) {
            Ok(true) => {}
            Ok(false) => return vec![MapOutcome::Filtered],
            Err(e) => return vec![MapOutcome::Failed(MappingError::SelectorFailed(e))],
        }
    }

    let Some(items_expr) = &rc.items_to_parse else {
        return vec![map_single(root, rc, policy, resolver).await];
    };

    let items = match items_expr.evaluate(root) {
        Ok(items) => items,
        Err(e) => return vec![MapOutcome::Failed(MappingError::ItemsToParseFailed(e))],
    };

    // An empty explosion is not an error: the record simply contributes no
    // entities (`spec.md` §9, itemsToParse boundary case).
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let ctx = build_item_context(root, item, rc.embed_original_data);
        outcomes.push(map_single(&ctx, rc, policy, resolver).await);
    }
    outcomes
}

/// map_batch maps a batch of raw records concurrently, bounded to
/// `concurrency` in-flight mappings at a time, and flattens every record's
/// outcomes (one or many, per `itemsToParse`) into a single ordered list.
pub async fn map_batch(
    records: &[RawRecord],
    rc: &CompiledResourceConfig,
    policy: ResolutionPolicy,
    resolver: &dyn SearchResolver,
    concurrency: usize,
) -> Vec<MapOutcome> {
    stream::iter(records.iter())
        .map(|record| map_record(record, rc, policy, resolver))
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// build_item_context builds the evaluation context for one exploded
/// `itemsToParse` item. When `embed` is set the outer record's fields stay
/// reachable alongside the item under `item`; otherwise only the item itself
/// is visible, so expressions cannot retain a reference to the (potentially
/// much larger) parent record.
fn build_item_context(root: &Value, item: Value, embed: bool) -> Value {
    if !embed {
        return item;
    }
    match root {
        Value::Object(map) => {
            let mut ctx = map.clone();
            ctx.insert("item".to_string(), item);
            Value::Object(ctx)
        }
        other => {
            let mut ctx = serde_json::Map::new();
            ctx.insert("original".to_string(), other.clone());
            ctx.insert("item".to_string(), item);
            Value::Object(ctx)
        }
    }
}

async fn map_single(
    ctx: &Value,
    rc: &CompiledResourceConfig,
    policy: ResolutionPolicy,
    resolver: &dyn SearchResolver,
) -> MapOutcome {
    let identifier = match eval_required_string(&rc.mapping.identifier, ctx) {
        Ok(s) => s,
        Err(e) => return MapOutcome::Failed(MappingError::MissingIdentifier(e)),
    };
    let blueprint = match eval_required_string(&rc.mapping.blueprint, ctx) {
        Ok(s) => s,
        Err(e) => return MapOutcome::Failed(MappingError::MissingBlueprint(e)),
    };

    let title = eval_optional_string(rc.mapping.title.as_ref(), ctx);
    let team = eval_optional_string(rc.mapping.team.as_ref(), ctx);
    let icon = eval_optional_string(rc.mapping.icon.as_ref(), ctx);

    let mut properties = BTreeMap::new();
    for (name, prop) in &rc.mapping.properties {
        match prop.program.evaluate_one(ctx) {
            Ok(value) => {
                properties.insert(name.clone(), value);
            }
            Err(e) if prop.required => {
                return MapOutcome::Failed(MappingError::RequiredPropertyFailed {
                    property: name.clone(),
                    source: e,
                });
            }
            Err(_) => {
                // Soft-fail: omit the property, keep the entity.
            }
        }
    }

    let mut relations = BTreeMap::new();
    for (name, program) in &rc.mapping.relations {
        let values = match program.evaluate(ctx) {
            Ok(values) => values,
            Err(e) => {
                return MapOutcome::Failed(MappingError::RelationFailed {
                    relation: name.clone(),
                    source: e,
                });
            }
        };
        match relation_value_from(values) {
            Ok(None) => {}
            Ok(Some(RelationShape::Direct(rv))) => {
                relations.insert(name.clone(), rv);
            }
            Ok(Some(RelationShape::Search(search))) => match policy {
                ResolutionPolicy::Permissive => {
                    relations.insert(name.clone(), RelationValue::Search(search));
                }
                ResolutionPolicy::Strict => match resolver.resolve(&search).await {
                    Ok(mut ids) if ids.len() == 1 => {
                        relations.insert(name.clone(), RelationValue::Single(ids.remove(0)));
                    }
                    Ok(ids) => {
                        let source = if ids.is_empty() {
                            crate::resolver::ResolverError::NoMatch
                        } else {
                            crate::resolver::ResolverError::Ambiguous(ids.len())
                        };
                        return MapOutcome::Failed(MappingError::SearchUnresolved {
                            relation: name.clone(),
                            source,
                        });
                    }
                    Err(source) => {
                        return MapOutcome::Failed(MappingError::SearchUnresolved {
                            relation: name.clone(),
                            source,
                        });
                    }
                },
            },
            Err(()) => {
                return MapOutcome::Failed(MappingError::InvalidRelationShape {
                    relation: name.clone(),
                });
            }
        }
    }

    MapOutcome::Mapped(Box::new(Entity {
        blueprint,
        identifier,
        title,
        team,
        icon,
        properties,
        relations,
    }))
}

enum RelationShape {
    Direct(RelationValue),
    Search(SearchIdentifier),
}

/// relation_value_from interprets the (possibly multi-valued) result of a
/// relation expression. Zero values or a lone null means "no relation";
/// a single string or a list of strings map directly; a single object
/// matching the search-identifier shape defers to the caller for
/// resolution; anything else is an unsupported shape.
fn relation_value_from(values: Vec<Value>) -> Result<Option<RelationShape>, ()> {
    let non_null: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return Ok(None);
    }
    if non_null.len() == 1 {
        match &non_null[0] {
            Value::String(s) => return Ok(Some(RelationShape::Direct(RelationValue::Single(s.clone())))),
            Value::Array(items) => return Ok(Some(RelationShape::Direct(array_to_relation(items)?))),
            Value::Object(_) => {
                if let Ok(search) =
                    serde_json::from_value::<SearchIdentifier>(non_null[0].clone())
                {
                    return Ok(Some(RelationShape::Search(search)));
                }
                return Err(());
            }
            _ => return Err(()),
        }
    }
    Ok(Some(RelationShape::Direct(array_to_relation(&non_null)?)))
}

fn array_to_relation(items: &[Value]) -> Result<RelationValue, ()> {
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => ids.push(s.clone()),
            _ => return Err(()),
        }
    }
    Ok(RelationValue::Many(ids))
}

fn eval_required_string(
    program: &ocean_expr::Program,
    ctx: &Value,
) -> Result<String, ocean_expr::EvalError> {
    match program.evaluate_one(ctx)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        other => Err(ocean_expr::EvalError::custom(
            program.source(),
            format!("expected a non-empty string, got {other:?}"),
        )),
    }
}

fn eval_optional_string(program: Option<&ocean_expr::Program>, ctx: &Value) -> Option<String> {
    let program = program?;
    match program.evaluate_one(ctx) {
        Ok(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ocean_expr::Expression;

    use super::*;
    use crate::compiled::{CompiledEntityMapping, CompiledProperty};
    use crate::resolver::{PermissiveResolver, ResolverError};

    fn compile(src: &str) -> ocean_expr::Program {
        Expression::compile(src).expect("compiles")
    }

    fn base_rc(identifier: &str, blueprint: &str) -> CompiledResourceConfig {
        CompiledResourceConfig {
            kind: "service".into(),
            selector_query: None,
            mapping: CompiledEntityMapping {
                identifier: compile(identifier),
                blueprint: compile(blueprint),
                title: None,
                team: None,
                icon: None,
                properties: BTreeMap::new(),
                relations: BTreeMap::new(),
            },
            items_to_parse: None,
            embed_original_data: true,
        }
    }

    struct FailResolver;

    #[async_trait::async_trait]
    impl SearchResolver for FailResolver {
        async fn resolve(
            &self,
            _search: &SearchIdentifier,
        ) -> Result<Vec<String>, ResolverError> {
            Err(ResolverError::NoMatch)
        }
    }

    #[tokio::test]
    async fn pure_function_same_input_same_output() {
        let rc = base_rc(".id", "\"service\"");
        let record = RawRecord::new(serde_json::json!({"id": "svc-1"}));
        let resolver = PermissiveResolver;

        let a = map_record(&record, &rc, ResolutionPolicy::Permissive, &resolver).await;
        let b = map_record(&record, &rc, ResolutionPolicy::Permissive, &resolver).await;
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        match (&a[0], &b[0]) {
            (MapOutcome::Mapped(x), MapOutcome::Mapped(y)) => assert_eq!(x.key(), y.key()),
            _ => panic!("expected both mapped"),
        }
    }

    #[tokio::test]
    async fn empty_items_to_parse_yields_no_entities_and_no_errors() {
        let mut rc = base_rc(".id", "\"service\"");
        rc.items_to_parse = Some(compile(".items[]"));
        let record = RawRecord::new(serde_json::json!({"id": "svc-1", "items": []}));
        let resolver = PermissiveResolver;

        let outcomes = map_record(&record, &rc, ResolutionPolicy::Permissive, &resolver).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn missing_identifier_fails_without_affecting_other_records() {
        let rc = base_rc(".missing", "\"service\"");
        let good = RawRecord::new(serde_json::json!({"id": "svc-1"}));
        let bad = RawRecord::new(serde_json::json!({}));
        let resolver = PermissiveResolver;

        let bad_outcome = &map_record(&bad, &rc, ResolutionPolicy::Permissive, &resolver).await[0];
        assert!(matches!(
            bad_outcome,
            MapOutcome::Failed(MappingError::MissingIdentifier(_))
        ));

        let rc_good = base_rc(".id", "\"service\"");
        let good_outcome =
            &map_record(&good, &rc_good, ResolutionPolicy::Permissive, &resolver).await[0];
        assert!(matches!(good_outcome, MapOutcome::Mapped(_)));
    }

    #[tokio::test]
    async fn required_property_failure_fails_entity_soft_property_does_not() {
        let mut rc = base_rc(".id", "\"service\"");
        rc.mapping.properties.insert(
            "owner".into(),
            CompiledProperty {
                program: compile(".owner"),
                required: true,
            },
        );
        let record = RawRecord::new(serde_json::json!({"id": "svc-1"}));
        let resolver = PermissiveResolver;
        let outcome = &map_record(&record, &rc, ResolutionPolicy::Permissive, &resolver).await[0];
        assert!(matches!(
            outcome,
            MapOutcome::Failed(MappingError::RequiredPropertyFailed { .. })
        ));

        let mut rc_soft = base_rc(".id", "\"service\"");
        rc_soft.mapping.properties.insert(
            "owner".into(),
            CompiledProperty {
                program: compile(".owner"),
                required: false,
            },
        );
        let outcome =
            &map_record(&record, &rc_soft, ResolutionPolicy::Permissive, &resolver).await[0];
        match outcome {
            MapOutcome::Mapped(e) => assert!(!e.properties.contains_key("owner")),
            _ => panic!("expected mapped entity with property omitted"),
        }
    }

    #[tokio::test]
    async fn strict_search_identifier_unresolved_fails_record() {
        let mut rc = base_rc(".id", "\"service\"");
        rc.mapping.relations.insert(
            "team".into(),
            compile("{targetBlueprint: \"team\", combinator: \"and\", rules: []}"),
        );
        let record = RawRecord::new(serde_json::json!({"id": "svc-1"}));
        let resolver = FailResolver;

        let outcome = &map_record(&record, &rc, ResolutionPolicy::Strict, &resolver).await[0];
        assert!(matches!(
            outcome,
            MapOutcome::Failed(MappingError::SearchUnresolved { .. })
        ));
    }
}
