use std::collections::BTreeMap;

use ocean_expr::Expression;
use ocean_mapping::{CompiledEntityMapping, CompiledProperty, CompiledResourceConfig};
use ocean_model::{PortAppConfig, ResourceConfig};

use crate::quote::quote_if_bare;

/// CompiledPac is a [`PortAppConfig`] with every resource's expressions compiled,
/// ready to drive the mapping engine. Resources whose mapping failed to compile
/// are excluded from [`resources`](Self::resources) and reported in
/// [`disabled`](Self::disabled) instead of failing the whole PAC.
#[derive(Clone, Debug, Default)]
pub struct CompiledPac {
    /// Resources maps kind to its compiled resource config.
    pub resources: BTreeMap<String, CompiledResourceConfig>,
    /// Disabled lists resources whose mapping failed to compile, with the reason.
    pub disabled: Vec<DisabledResource>,
    /// CreateMissingRelatedEntities mirrors the PAC flag of the same name.
    pub create_missing_related_entities: bool,
    /// DeleteDependentEntities mirrors the PAC flag of the same name.
    pub delete_dependent_entities: bool,
    /// EnableMergeEntity mirrors the PAC flag of the same name.
    pub enable_merge_entity: bool,
}

/// DisabledResource names a kind whose mapping did not compile, and why.
#[derive(Clone, Debug)]
pub struct DisabledResource {
    /// Kind is the resource's logical kind name.
    pub kind: String,
    /// Reason is the compile failure's message.
    pub reason: String,
}

/// Compile turns every resource in `pac` into a [`CompiledResourceConfig`]. A
/// resource is compiled independently of its siblings: one kind's malformed
/// mapping never prevents the rest of the PAC from loading.
pub fn compile(pac: &PortAppConfig) -> CompiledPac {
    let mut resources = BTreeMap::new();
    let mut disabled = Vec::new();

    for rc in &pac.resources {
        match compile_resource(rc) {
            Ok(compiled) => {
                resources.insert(rc.kind.clone(), compiled);
            }
            Err(reason) => disabled.push(DisabledResource {
                kind: rc.kind.clone(),
                reason,
            }),
        }
    }

    CompiledPac {
        resources,
        disabled,
        create_missing_related_entities: pac.create_missing_related_entities,
        delete_dependent_entities: pac.delete_dependent_entities,
        enable_merge_entity: pac.enable_merge_entity,
    }
}

fn compile_resource(rc: &ResourceConfig) -> Result<CompiledResourceConfig, String> {
    let selector_query = rc
        .selector
        .query
        .as_deref()
        .map(Expression::compile)
        .transpose()
        .map_err(|e| e.to_string())?;

    let entity = &rc.port.entity;
    let identifier = Expression::compile(&entity.identifier).map_err(|e| e.to_string())?;
    let blueprint =
        Expression::compile(&quote_if_bare(&entity.blueprint)).map_err(|e| e.to_string())?;
    let title = compile_optional(entity.title.as_deref())?;
    let team = compile_optional(entity.team.as_deref())?;
    let icon = compile_optional(entity.icon.as_deref())?;

    let mut properties = BTreeMap::new();
    for (name, prop) in &entity.properties {
        let program =
            Expression::compile(&quote_if_bare(&prop.expr)).map_err(|e| e.to_string())?;
        properties.insert(
            name.clone(),
            CompiledProperty {
                program,
                required: prop.required,
            },
        );
    }

    let mut relations = BTreeMap::new();
    for (name, expr) in &entity.relations {
        let program = Expression::compile(&quote_if_bare(expr)).map_err(|e| e.to_string())?;
        relations.insert(name.clone(), program);
    }

    let items_to_parse = rc
        .items_to_parse
        .as_deref()
        .map(Expression::compile)
        .transpose()
        .map_err(|e| e.to_string())?;

    Ok(CompiledResourceConfig {
        kind: rc.kind.clone(),
        selector_query,
        mapping: CompiledEntityMapping {
            identifier,
            blueprint,
            title,
            team,
            icon,
            properties,
            relations,
        },
        items_to_parse,
        embed_original_data: rc.embed_original_data,
    })
}

fn compile_optional(src: Option<&str>) -> Result<Option<ocean_expr::Program>, String> {
    src.map(|s| Expression::compile(&quote_if_bare(s)))
        .transpose()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pac_with_blueprint(blueprint: &str) -> PortAppConfig {
        let yaml = format!(
            r#"
resources:
  - kind: repository
    port:
      entity:
        identifier: .name
        blueprint: {blueprint}
"#
        );
        serde_yaml::from_str(&yaml).expect("valid PAC")
    }

    #[test]
    fn compiles_bare_blueprint_as_literal() {
        let pac = pac_with_blueprint("service");
        let compiled = compile(&pac);
        assert!(compiled.disabled.is_empty());
        let rc = compiled.resources.get("repository").unwrap();
        let out = rc
            .mapping
            .blueprint
            .evaluate_one(&serde_json::json!({}))
            .unwrap();
        assert_eq!(out, serde_json::json!("service"));
    }

    #[test]
    fn malformed_mapping_disables_only_that_kind() {
        let mut pac = pac_with_blueprint("service");
        pac.resources.push(ResourceConfig {
            kind: "broken".into(),
            selector: Default::default(),
            port: ocean_model::PortMapping {
                entity: ocean_model::EntityMapping {
                    identifier: ".[".into(),
                    ..Default::default()
                },
            },
            items_to_parse: None,
            embed_original_data: true,
        });

        let compiled = compile(&pac);
        assert_eq!(compiled.resources.len(), 1);
        assert_eq!(compiled.disabled.len(), 1);
        assert_eq!(compiled.disabled[0].kind, "broken");
    }
}
