//! System definition and view update data consumed by the package builder.
//!
//! These types describe what the surrounding tool hands to the package core:
//! the ordered node list with Data Blocks and device information, the bus
//! list, and per-view update settings for each node. Parsing the tool's own
//! project formats is outside this crate; the types are `serde`-derived so a
//! JSON [`ProjectFile`](crate::project::ProjectFile) can carry them.

mod node;
mod update_info;

pub use node::{Bus, BusKind, DataBlock, DataBlockKind, Node, NodeInterface, SystemDefinition};
pub use update_info::{DebuggerState, NodeUpdateInfo, PemUpdate, SecurityState, UpdateEntry};
