use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Selector narrows which raw records a [`ResourceConfig`] applies to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    /// Query is a boolean expression source; records for which it evaluates falsy
    /// are filtered out before mapping runs (not an error).
    #[serde(default)]
    pub query: Option<String>,
}

/// PropertyMapping is one property's expression source, plus whether a failure to
/// evaluate it should fail the whole entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMapping {
    /// Expr is the expression source producing this property's value.
    pub expr: String,
    /// Required marks the property as failing the entire entity on evaluation error,
    /// rather than being soft-failed and omitted.
    #[serde(default)]
    pub required: bool,
}

/// EntityMapping describes how one kind's raw records become entities: the
/// expression sources for `identifier`/`title`/`blueprint`/`team`/`icon`, plus
/// per-property and per-relation expressions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMapping {
    /// Identifier is the expression source producing the entity's identifier; must
    /// evaluate to a non-empty string.
    pub identifier: String,
    /// Blueprint is the expression source producing the entity's blueprint, or a
    /// literal blueprint identifier when the mapping targets a fixed blueprint.
    pub blueprint: String,
    /// Title is an optional expression source for the entity's title.
    #[serde(default)]
    pub title: Option<String>,
    /// Team is an optional expression source for the entity's team.
    #[serde(default)]
    pub team: Option<String>,
    /// Icon is an optional expression source for the entity's icon.
    #[serde(default)]
    pub icon: Option<String>,
    /// Properties maps property name to its mapping.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyMapping>,
    /// Relations maps relation name to its expression source.
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
}

/// ResourceConfig (RC) is one kind's fetch selector plus its entity mapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Kind names the logical bucket of raw records this config applies to.
    pub kind: String,
    /// Selector narrows the records this config applies to.
    #[serde(default)]
    pub selector: Selector,
    /// Mappings is the `port.entity.mappings` block.
    pub port: PortMapping,
    /// ItemsToParse is an expression returning a sub-sequence of a record to
    /// explode into multiple entities, e.g. `.items[]`.
    #[serde(default)]
    pub items_to_parse: Option<String>,
    /// EmbedOriginalData controls whether each exploded item from `itemsToParse`
    /// retains the original record's fields alongside `item`. Defaults to `true`
    /// for backwards compatibility, per `scheduledResyncInterval`-era integrations.
    #[serde(default = "default_embed_original_data")]
    pub embed_original_data: bool,
}

fn default_embed_original_data() -> bool {
    true
}

/// PortMapping wraps the `entity` mapping block, matching the PAC's
/// `resources[].port.entity` shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Entity is the entity-producing mapping for this kind.
    pub entity: EntityMapping,
}

/// PortAppConfig (PAC) is the ordered list of resource configs plus run-level
/// behavior flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAppConfig {
    /// Resources is the ordered list of kind configs.
    pub resources: Vec<ResourceConfig>,
    /// CreateMissingRelatedEntities, when true, creates a placeholder entity for a
    /// relation target that does not yet exist instead of failing the relation.
    #[serde(default)]
    pub create_missing_related_entities: bool,
    /// DeleteDependentEntities, when true, issues stale-deletion deletes in reverse
    /// dependency order (leaves first).
    #[serde(default)]
    pub delete_dependent_entities: bool,
    /// EnableMergeEntity, when true, merges same-key entities within a run by
    /// unioning list relations instead of last-writer-wins.
    #[serde(default)]
    pub enable_merge_entity: bool,
}

impl PortAppConfig {
    /// Resource_for returns the resource config for `kind`, if configured.
    pub fn resource_for(&self, kind: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|rc| rc.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pac_round_trips_through_yaml() {
        let yaml = r#"
resources:
  - kind: repository
    selector:
      query: .archived == false
    port:
      entity:
        identifier: .name
        blueprint: service
        properties:
          language:
            expr: .language
createMissingRelatedEntities: true
"#;
        let pac: PortAppConfig = serde_yaml::from_str(yaml).expect("valid PAC");
        assert_eq!(pac.resources.len(), 1);
        assert!(pac.create_missing_related_entities);
        assert_eq!(pac.resource_for("repository").unwrap().kind, "repository");
        assert!(pac.resource_for("missing").is_none());
    }
}
