use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::{Error, Result};

/// Blueprint is a type definition in the remote catalog. The core does not own its
/// schema; it only consults the declared relations to derive kind ordering for the
/// resync orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    /// Identifier is unique within the Port tenant.
    #[validate(length(min = 1))]
    pub identifier: String,
    /// Relations declares, for each relation name, the target blueprint identifier.
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
}

/// EntityKey canonically identifies an entity by `(blueprint, identifier)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Blueprint is the owning blueprint's identifier.
    pub blueprint: String,
    /// Identifier is unique within `blueprint`.
    pub identifier: String,
}

impl EntityKey {
    /// New constructs a key from a blueprint and identifier.
    pub fn new(blueprint: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            blueprint: blueprint.into(),
            identifier: identifier.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.blueprint, self.identifier)
    }
}

/// SearchCombinator joins a [`SearchIdentifier`]'s rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCombinator {
    /// And requires every rule to match.
    And,
    /// Or requires at least one rule to match.
    Or,
}

/// SearchRule is a single `property operator value` clause of a [`SearchIdentifier`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRule {
    /// Property is the target blueprint's property name to match against.
    pub property: String,
    /// Operator is the comparison operator, e.g. `"="`, `"contains"`.
    pub operator: String,
    /// Value is the value the property is compared against.
    pub value: Value,
}

/// SearchIdentifier stands in for a literal identifier when the mapping author knows
/// a property of the relation's target but not its identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIdentifier {
    /// TargetBlueprint is the blueprint the rules are evaluated against.
    pub target_blueprint: String,
    /// Combinator joins `rules`.
    pub combinator: SearchCombinator,
    /// Rules is the list of property/operator/value clauses.
    pub rules: Vec<SearchRule>,
}

/// RelationValue is the possible shapes a relation mapping expression can produce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationValue {
    /// Single is a literal target identifier.
    Single(String),
    /// Many is a list of target identifiers.
    Many(Vec<String>),
    /// Search is an unresolved search identifier, left for the port client to resolve.
    Search(SearchIdentifier),
}

impl RelationValue {
    /// Union merges `other` into `self` as a multi-valued union, used when a kind's
    /// mapping declares relation merging. Search identifiers are not unioned; the
    /// later value wins for those, since there is no well-defined union of two rule
    /// sets.
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Search(_), b) => b,
            (a, Self::Search(b)) => {
                let _ = a;
                Self::Search(b)
            }
            (a, b) => {
                let mut ids: Vec<String> = match a {
                    Self::Single(s) => vec![s],
                    Self::Many(v) => v,
                    Self::Search(_) => unreachable!(),
                };
                let mut more: Vec<String> = match b {
                    Self::Single(s) => vec![s],
                    Self::Many(v) => v,
                    Self::Search(_) => unreachable!(),
                };
                ids.append(&mut more);
                ids.dedup();
                Self::Many(ids)
            }
        }
    }
}

/// Entity is an instance of a blueprint, identified by `(blueprint, identifier)`.
///
/// Entities are short-lived values: created by the mapping engine, consumed by the
/// port client, never cached beyond a single batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Blueprint is the owning blueprint's identifier.
    #[validate(length(min = 1))]
    pub blueprint: String,
    /// Identifier is unique within `blueprint`.
    #[validate(length(min = 1))]
    pub identifier: String,
    /// Title is a human-readable label, if the mapping produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Team assigns ownership, if the mapping produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Icon names a catalog icon, if the mapping produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Properties holds the mapped scalar/object properties.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Relations holds the mapped relation values, keyed by relation name.
    #[serde(default)]
    pub relations: BTreeMap<String, RelationValue>,
}

impl Entity {
    /// Key returns the entity's canonical `(blueprint, identifier)` key.
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.blueprint.clone(), self.identifier.clone())
    }

    /// Validate checks that `blueprint` and `identifier` are present and non-empty,
    /// as required by every upsert.
    pub fn validate_required(&self) -> Result<()> {
        if self.blueprint.is_empty() {
            return Err(Error::MissingName("blueprint"));
        }
        if self.identifier.is_empty() {
            return Err(Error::MissingName("identifier"));
        }
        Ok(())
    }

    /// Merge folds `other` into `self`, assuming both share a key. Scalar fields use
    /// last-writer-wins (the argument's fields take precedence when present);
    /// relations become a multi-valued union when `union_relations` is set (the
    /// PAC's `enableMergeEntity` flag), otherwise last-writer-wins as well.
    pub fn merge(mut self, other: Self, union_relations: bool) -> Self {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.team.is_some() {
            self.team = other.team;
        }
        if other.icon.is_some() {
            self.icon = other.icon;
        }
        for (k, v) in other.properties {
            self.properties.insert(k, v);
        }
        for (k, v) in other.relations {
            match self.relations.remove(&k) {
                Some(existing) if union_relations => {
                    self.relations.insert(k, existing.union(v));
                }
                _ => {
                    self.relations.insert(k, v);
                }
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_last_writer_wins_for_scalars() {
        let a = Entity {
            blueprint: "service".into(),
            identifier: "svc-1".into(),
            title: Some("old".into()),
            ..Default::default()
        };
        let b = Entity {
            blueprint: "service".into(),
            identifier: "svc-1".into(),
            title: Some("new".into()),
            ..Default::default()
        };
        let merged = a.merge(b, false);
        assert_eq!(merged.title.as_deref(), Some("new"));
    }

    #[test]
    fn merge_unions_relations_when_requested() {
        let mut a = Entity {
            blueprint: "service".into(),
            identifier: "svc-1".into(),
            ..Default::default()
        };
        a.relations
            .insert("owners".into(), RelationValue::Single("alice".into()));
        let mut b = Entity {
            blueprint: "service".into(),
            identifier: "svc-1".into(),
            ..Default::default()
        };
        b.relations
            .insert("owners".into(), RelationValue::Single("bob".into()));

        let merged = a.merge(b, true);
        match merged.relations.get("owners").unwrap() {
            RelationValue::Many(v) => {
                assert_eq!(v, &vec!["alice".to_string(), "bob".to_string()]);
            }
            other => panic!("expected Many, got {other:?}"),
        }
    }

    #[test]
    fn key_is_blueprint_and_identifier() {
        let e = Entity {
            blueprint: "service".into(),
            identifier: "svc-1".into(),
            ..Default::default()
        };
        assert_eq!(e.key(), EntityKey::new("service", "svc-1"));
    }
}
