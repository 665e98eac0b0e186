//! Per-view update settings of a node.

use serde::{Deserialize, Serialize};

/// One declared file of a node update, with its skip flag.
///
/// An empty `path` means "use the path the Data Block declares".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub skip: bool,
}

impl UpdateEntry {
    /// Entry using the given path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            skip: false,
        }
    }

    /// Entry taking its path from the Data Block.
    pub fn from_data_block() -> Self {
        Self::default()
    }

    /// Entry that is excluded from the update.
    pub fn skipped(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            skip: true,
        }
    }

    /// Whether an explicit override path is set.
    pub fn has_override(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Desired security state after the PEM file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
    #[default]
    NoChange,
    Activate,
    Deactivate,
}

/// Desired debugger state after the PEM file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebuggerState {
    #[default]
    NoChange,
    Activate,
    Deactivate,
}

/// PEM security file settings of a node update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PemUpdate {
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub security: SecurityState,

    #[serde(default)]
    pub debugger: DebuggerState,
}

impl PemUpdate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_security(mut self, state: SecurityState) -> Self {
        self.security = state;
        self
    }

    pub fn with_debugger(mut self, state: DebuggerState) -> Self {
        self.debugger = state;
        self
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Whether any state change is requested.
    pub fn requests_state_change(&self) -> bool {
        self.security != SecurityState::NoChange || self.debugger != DebuggerState::NoChange
    }
}

/// Update settings of one node in one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdateInfo {
    /// Raw update position. May be sparse, duplicated or stale.
    #[serde(default)]
    pub position: Option<u32>,

    /// One entry per result path of the node's flashable Data Blocks,
    /// in Data-Block order.
    #[serde(default)]
    pub data_block_files: Vec<UpdateEntry>,

    /// File-based applications.
    #[serde(default)]
    pub file_based_files: Vec<UpdateEntry>,

    /// NVM parameter-set images.
    #[serde(default)]
    pub parameter_sets: Vec<UpdateEntry>,

    #[serde(default)]
    pub pem: Option<PemUpdate>,
}

impl NodeUpdateInfo {
    pub fn at_position(position: u32) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn with_data_block_file(mut self, entry: UpdateEntry) -> Self {
        self.data_block_files.push(entry);
        self
    }

    pub fn with_file_based_file(mut self, entry: UpdateEntry) -> Self {
        self.file_based_files.push(entry);
        self
    }

    pub fn with_parameter_set(mut self, entry: UpdateEntry) -> Self {
        self.parameter_sets.push(entry);
        self
    }

    pub fn with_pem(mut self, pem: PemUpdate) -> Self {
        self.pem = Some(pem);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_entry_override() {
        assert!(!UpdateEntry::from_data_block().has_override());
        assert!(UpdateEntry::new("out/app.hex").has_override());
        assert!(UpdateEntry::skipped("x").skip);
    }

    #[test]
    fn test_pem_state_change_requested() {
        let pem = PemUpdate::new("keys/node.pem");
        assert!(!pem.requests_state_change());
        assert!(pem
            .with_debugger(DebuggerState::Deactivate)
            .requests_state_change());
    }

    #[test]
    fn test_update_info_deserializes_with_defaults() {
        let info: NodeUpdateInfo = serde_json::from_str(r#"{"position":2}"#).unwrap();
        assert_eq!(info.position, Some(2));
        assert!(info.data_block_files.is_empty());
        assert!(info.pem.is_none());
    }
}
