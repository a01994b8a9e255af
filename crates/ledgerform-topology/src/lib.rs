//! Ledgerform Topology - Declarative Network Loading
//!
//! Turns an operator's declared network (TOML, JSON or YAML) into the
//! immutable `Topology` the convergence engine runs against.
//!
//! - sections may be declared as maps or as lists of single-entry maps; both
//!   normalize to insertion-ordered maps
//! - file references resolve relative to the declaring file
//! - cross references are validated before the topology is handed out
//!
//! `FileIdentityProvider` reads the admin certificates and keys the topology
//! references.

#![forbid(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod loader;
mod raw;
pub mod resolve;
pub mod validate;

pub use errors::TopologyError;
pub use identity::FileIdentityProvider;
pub use loader::{load_topology, parse_topology, TopologyFormat};
pub use resolve::FileResolver;
pub use validate::validate_topology;
