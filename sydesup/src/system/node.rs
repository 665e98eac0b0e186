//! Nodes, buses and Data Blocks of a system definition.

use serde::{Deserialize, Serialize};

/// The parts of a system definition the package core needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDefinition {
    /// Nodes in system-definition order. Node identity is the index.
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Buses in system-definition order.
    #[serde(default)]
    pub buses: Vec<Bus>,
}

impl SystemDefinition {
    /// Create a system definition from nodes and buses.
    pub fn new(nodes: Vec<Node>, buses: Vec<Bus>) -> Self {
        Self { nodes, buses }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether there is nothing to update at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Physical bus type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    Can,
    Ethernet,
}

/// A bus of the system definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    pub kind: BusKind,
}

impl Bus {
    pub fn new(name: impl Into<String>, kind: BusKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Communication interface of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInterface {
    pub kind: BusKind,

    /// Index of the connected bus, `None` if the interface is unconnected.
    #[serde(default)]
    pub bus_index: Option<usize>,
}

impl NodeInterface {
    /// Interface connected to the bus at `bus_index`.
    pub fn connected(kind: BusKind, bus_index: usize) -> Self {
        Self {
            kind,
            bus_index: Some(bus_index),
        }
    }
}

/// Data Block type.
///
/// HALC parameter sets are written to NVM rather than flashed, which is the
/// only distinction the package builder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBlockKind {
    #[default]
    Binary,
    FileContainer,
    HalcParameterSet,
}

/// A Data Block (application) assigned to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    pub name: String,

    #[serde(default)]
    pub kind: DataBlockKind,

    /// The Data Block's own project directory, possibly relative to the open
    /// project. Empty if the Data Block has no project of its own.
    #[serde(default)]
    pub project_path: String,

    /// Declared result files, relative to `project_path` unless absolute.
    #[serde(default)]
    pub result_paths: Vec<String>,
}

impl DataBlock {
    pub fn new(name: impl Into<String>, kind: DataBlockKind) -> Self {
        Self {
            name: name.into(),
            kind,
            project_path: String::new(),
            result_paths: Vec::new(),
        }
    }

    /// Set the Data Block project directory.
    pub fn with_project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = path.into();
        self
    }

    /// Add a declared result path.
    pub fn with_result_path(mut self, path: impl Into<String>) -> Self {
        self.result_paths.push(path.into());
        self
    }

    pub fn is_parameter_set(&self) -> bool {
        self.kind == DataBlockKind::HalcParameterSet
    }
}

/// A node (ECU) of the system definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    /// Device type name as listed in the device definition.
    pub device_type: String,

    /// Location of the device-definition file in the tool's device database.
    #[serde(default)]
    pub device_definition_path: String,

    /// Alternate device names accepted for this node's sub-device.
    #[serde(default)]
    pub other_accepted_device_names: Vec<String>,

    #[serde(default)]
    pub interfaces: Vec<NodeInterface>,

    #[serde(default)]
    pub data_blocks: Vec<DataBlock>,
}

impl Node {
    pub fn new(name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            device_definition_path: String::new(),
            other_accepted_device_names: Vec::new(),
            interfaces: Vec::new(),
            data_blocks: Vec::new(),
        }
    }

    pub fn with_device_definition(mut self, path: impl Into<String>) -> Self {
        self.device_definition_path = path.into();
        self
    }

    pub fn with_other_accepted_name(mut self, name: impl Into<String>) -> Self {
        self.other_accepted_device_names.push(name.into());
        self
    }

    pub fn with_interface(mut self, interface: NodeInterface) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_data_block(mut self, data_block: DataBlock) -> Self {
        self.data_blocks.push(data_block);
        self
    }

    /// Whether any interface of this node is connected to the given bus.
    pub fn is_connected_to(&self, bus_index: usize) -> bool {
        self.interfaces
            .iter()
            .any(|interface| interface.bus_index == Some(bus_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_connected_to_bus() {
        let node = Node::new("ECU", "ESX3CM")
            .with_interface(NodeInterface::connected(BusKind::Can, 1))
            .with_interface(NodeInterface {
                kind: BusKind::Ethernet,
                bus_index: None,
            });

        assert!(node.is_connected_to(1));
        assert!(!node.is_connected_to(0));
    }

    #[test]
    fn test_data_block_kind_deserializes_snake_case() {
        let json = r#"{"name":"params","kind":"halc_parameter_set","result_paths":["p.syde_psi"]}"#;
        let data_block: DataBlock = serde_json::from_str(json).unwrap();
        assert!(data_block.is_parameter_set());
        assert!(data_block.project_path.is_empty());
    }

    #[test]
    fn test_data_block_kind_defaults_to_binary() {
        let data_block: DataBlock = serde_json::from_str(r#"{"name":"app"}"#).unwrap();
        assert_eq!(data_block.kind, DataBlockKind::Binary);
    }
}
