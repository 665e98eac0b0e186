//! JSON project files describing a system and its update views.
//!
//! A project file bundles everything needed to create a package without the
//! authoring tool: the system definition plus one or more named views, each
//! carrying an active bus, per-node active flags and per-node update info.
//! Relative paths inside the project resolve against the directory holding
//! the project file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SupError, SupResult};
use crate::system::{NodeUpdateInfo, SystemDefinition};

/// Per-node settings of a view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewNode {
    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub update: NodeUpdateInfo,
}

/// A named update view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,

    #[serde(default)]
    pub active_bus_index: usize,

    /// One entry per system-definition node, same order.
    #[serde(default)]
    pub nodes: Vec<ViewNode>,
}

impl ViewDefinition {
    /// Active flags in node order.
    pub fn active_flags(&self) -> Vec<bool> {
        self.nodes.iter().map(|node| node.active).collect()
    }

    /// Update info in node order.
    pub fn update_infos(&self) -> Vec<NodeUpdateInfo> {
        self.nodes.iter().map(|node| node.update.clone()).collect()
    }
}

/// A loaded project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,

    pub system: SystemDefinition,

    #[serde(default)]
    pub views: Vec<ViewDefinition>,

    /// Directory the project was loaded from.
    #[serde(skip)]
    pub directory: PathBuf,
}

impl ProjectFile {
    /// Load a project from a JSON file.
    pub fn load(path: &Path) -> SupResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| SupError::ProjectLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut project: ProjectFile =
            serde_json::from_str(&content).map_err(|e| SupError::ProjectLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        project.directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tracing::debug!(
            project = %project.name,
            nodes = project.system.node_count(),
            views = project.views.len(),
            "Loaded project"
        );

        Ok(project)
    }

    /// Look up a view by name.
    pub fn view(&self, name: &str) -> SupResult<&ViewDefinition> {
        self.views
            .iter()
            .find(|view| view.name == name)
            .ok_or_else(|| SupError::ViewNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    const PROJECT_JSON: &str = r#"{
        "name": "Demo",
        "system": {
            "nodes": [{"name": "ECU", "device_type": "ESX3CM"}],
            "buses": [{"name": "CAN1", "kind": "can"}]
        },
        "views": [{
            "name": "Main",
            "active_bus_index": 0,
            "nodes": [{"active": true, "update": {"position": 0}}]
        }]
    }"#;

    #[test]
    fn test_load_sets_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("demo.json");
        fs::write(&path, PROJECT_JSON).unwrap();

        let project = ProjectFile::load(&path).unwrap();
        assert_eq!(project.directory, temp.path());
        assert_eq!(project.system.nodes[0].name, "ECU");
        assert_eq!(project.view("Main").unwrap().active_flags(), vec![true]);
    }

    #[test]
    fn test_missing_view_is_input_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("demo.json");
        fs::write(&path, PROJECT_JSON).unwrap();

        let project = ProjectFile::load(&path).unwrap();
        let err = project.view("Service").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_malformed_project_is_input_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ProjectFile::load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.to_string().contains("broken.json"));
    }
}
