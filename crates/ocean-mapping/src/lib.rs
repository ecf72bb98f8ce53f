#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_mapping applies a compiled resource mapping to a single raw record,
//! producing zero or one [`Entity`](ocean_model::Entity), or a structured
//! [`MappingError`]. It is the part of the runtime the spec calls the mapping
//! engine (`spec.md` §4.C4): pure apart from the injected search-identifier
//! resolver, so the same `(record, mapping, policy)` always produces the same
//! entity.

mod compiled;
mod engine;
mod error;
mod resolver;

pub use compiled::{CompiledEntityMapping, CompiledProperty, CompiledResourceConfig};
pub use engine::{map_batch, map_record, MapOutcome, ResolutionPolicy};
pub use error::MappingError;
pub use resolver::{PermissiveResolver, ResolverError, SearchResolver};
