use std::collections::BTreeMap;

use ocean_expr::Program;

/// CompiledProperty pairs a property's compiled expression with whether its
/// evaluation failure should fail the whole entity (required) or just omit the
/// property (soft-fail).
#[derive(Clone, Debug)]
pub struct CompiledProperty {
    /// Program evaluates to the property's value.
    pub program: Program,
    /// Required marks the property as fatal to the entity on evaluation error.
    pub required: bool,
}

/// CompiledEntityMapping is an [`ocean_model::EntityMapping`] with every expression
/// source compiled once, ready to run against many records.
#[derive(Clone, Debug)]
pub struct CompiledEntityMapping {
    /// Identifier evaluates to the entity's identifier; must yield a single
    /// non-empty string.
    pub identifier: Program,
    /// Blueprint evaluates to the entity's blueprint identifier.
    pub blueprint: Program,
    /// Title optionally evaluates to the entity's title.
    pub title: Option<Program>,
    /// Team optionally evaluates to the entity's team.
    pub team: Option<Program>,
    /// Icon optionally evaluates to the entity's icon.
    pub icon: Option<Program>,
    /// Properties maps property name to its compiled mapping.
    pub properties: BTreeMap<String, CompiledProperty>,
    /// Relations maps relation name to its compiled expression.
    pub relations: BTreeMap<String, Program>,
}

/// CompiledResourceConfig is an [`ocean_model::ResourceConfig`] with every
/// expression compiled once by the config loader and cached for the lifetime of
/// the PAC snapshot that produced it.
#[derive(Clone, Debug)]
pub struct CompiledResourceConfig {
    /// Kind names the logical bucket of raw records this config applies to.
    pub kind: String,
    /// Selector optionally filters records before mapping runs.
    pub selector_query: Option<Program>,
    /// Mapping is the compiled entity mapping.
    pub mapping: CompiledEntityMapping,
    /// ItemsToParse optionally explodes one record into many mapping inputs.
    pub items_to_parse: Option<Program>,
    /// EmbedOriginalData controls whether exploded items retain the outer
    /// record's fields (`spec.md` §9).
    pub embed_original_data: bool,
}
