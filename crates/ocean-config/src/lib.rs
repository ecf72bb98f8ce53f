#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

//! Ocean_config loads a Port app config (PAC) from a local file or a remote Port
//! endpoint, compiles every resource's expression sources into a
//! [`ocean_mapping::CompiledResourceConfig`], and watches the source for changes so
//! a long-running core can pick up a new PAC without restarting.
//!
//! A resource whose mapping fails to compile does not take the whole PAC down: it
//! is recorded in [`CompiledPac::disabled`] and excluded from
//! [`CompiledPac::resources`], the way a malformed CRD field disables just that
//! reconcile target rather than the whole controller.

mod compile;
mod error;
mod quote;
mod source;
mod watch;

pub use compile::{compile, CompiledPac, DisabledResource};
pub use error::ConfigError;
pub use source::{load, Source};
pub use watch::ConfigService;
