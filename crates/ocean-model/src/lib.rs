#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_model holds the data types shared by every crate in the Ocean runtime:
//! blueprints, entities, search identifiers, raw records, and the port-app-config
//! (PAC) that ties a kind to its mapping.
//!
//! The core does not own blueprint schema or persist raw records; this crate only
//! holds the shapes the mapping engine, port client, and orchestrator pass between
//! each other.

mod config;
mod entity;
mod error;
mod raw_record;
mod run_state;

pub use config::{
    EntityMapping, PortAppConfig, PortMapping, PropertyMapping, ResourceConfig, Selector,
};
pub use entity::{Blueprint, Entity, EntityKey, RelationValue, SearchCombinator, SearchIdentifier, SearchRule};
pub use error::Error;
pub use raw_record::RawRecord;
pub use run_state::{ErrorSample, KindOutcome, KindRunState, RunState, Summary};

/// Result typedef used across the Ocean model crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
