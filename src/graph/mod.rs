//! Word graph layer: node derivation, node sets, flags, queries, search.

pub mod consistency;
pub mod finder;
pub mod flags;
pub mod node;
pub mod node_set;
pub mod query;
pub mod store;
