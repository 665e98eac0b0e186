//! Package definition document and device-identification file.
//!
//! The definition is an XML document at the package root describing every
//! node of the system in system-definition order: whether it takes part in
//! the update, its rank in the update order, its packaged files with their
//! SHA-256 digests, and the PEM security settings. Paths are always relative
//! to the package root.
//!
//! # Determinism
//!
//! Serializing the same [`PackageDefinition`] with the same [`DocumentMeta`]
//! produces byte-identical output. Only `generator` and `created` vary
//! between runs.
//!
//! # Versioning
//!
//! Readers probe `file-version` before parsing anything else. Older versions
//! are reported as [`SupError::OlderFileVersion`], which callers treat as a
//! request to use a different loader rather than as a failure.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use ini::Ini;
use serde::{Deserialize, Serialize};

use crate::error::{SupError, SupResult};
use crate::system::{Bus, BusKind};

use super::content::{PemStates, StateFlag};
use super::naming::{DEFINITION_FILE_NAME, DEVICE_DEFINITIONS_FILE_NAME};

/// Definition format written by this crate.
pub const CURRENT_FILE_VERSION: u32 = 3;

const DEVICE_SECTION: &str = "DeviceDefinitions";
const DEVICE_COUNT_KEY: &str = "DeviceDefinitionCount";

/// A file inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedFile {
    /// Package-relative path with `/` separators.
    pub path: String,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

impl PackagedFile {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
        }
    }
}

/// Definition entry of one node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeDefinitionEntry {
    pub name: String,
    pub device_type: String,
    pub device_definition_path: String,
    pub other_accepted_device_names: Vec<String>,
    pub active: bool,
    /// Position in the update order; `None` for inactive nodes.
    pub update_position: Option<u32>,
    pub application_files: Vec<PackagedFile>,
    pub nvm_files: Vec<PackagedFile>,
    pub pem_file: Option<PackagedFile>,
    pub pem_states: PemStates,
}

/// Serializable package content, node identity is the entry position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDefinition {
    pub active_bus_index: usize,
    pub active_bus: Bus,
    pub nodes: Vec<NodeDefinitionEntry>,
}

/// Metadata that is allowed to differ between otherwise identical documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub file_version: u32,
    pub generator: String,
    pub created: String,
}

impl DocumentMeta {
    /// Metadata for a document written now by this crate.
    pub fn now() -> Self {
        Self::at(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }

    /// Metadata with a fixed creation time.
    pub fn at(created: impl Into<String>) -> Self {
        Self {
            file_version: CURRENT_FILE_VERSION,
            generator: generator_name(),
            created: created.into(),
        }
    }

    /// Version of the crate that wrote the document, if recorded.
    pub fn generator_version(&self) -> Option<semver::Version> {
        self.generator
            .rsplit(' ')
            .next()
            .and_then(|version| semver::Version::parse(version).ok())
    }
}

/// Generator string recorded in new documents.
pub fn generator_name() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// XML document model
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename = "service-update-package")]
struct XmlVersionProbe {
    #[serde(rename = "file-version")]
    file_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "service-update-package")]
struct XmlDocument {
    #[serde(rename = "file-version")]
    file_version: u32,
    generator: String,
    created: String,
    #[serde(rename = "active-bus")]
    active_bus: XmlBus,
    #[serde(default)]
    nodes: XmlNodes,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlBus {
    index: usize,
    name: String,
    kind: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlNodes {
    #[serde(rename = "node", default)]
    nodes: Vec<XmlNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlNode {
    name: String,
    #[serde(rename = "device-type")]
    device_type: String,
    #[serde(rename = "device-definition", default)]
    device_definition: String,
    #[serde(rename = "other-accepted-device-names", default)]
    other_accepted_device_names: XmlNameList,
    active: bool,
    #[serde(
        rename = "update-position",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    update_position: Option<u32>,
    #[serde(rename = "application-files", default)]
    application_files: XmlFileList,
    #[serde(rename = "nvm-files", default)]
    nvm_files: XmlFileList,
    #[serde(rename = "pem-file", default, skip_serializing_if = "Option::is_none")]
    pem_file: Option<XmlFile>,
    #[serde(rename = "pem-states", default)]
    pem_states: XmlPemStates,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlNameList {
    #[serde(rename = "device-name", default)]
    names: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlFileList {
    #[serde(rename = "file", default)]
    files: Vec<XmlFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlFile {
    path: String,
    sha256: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct XmlPemStates {
    #[serde(rename = "send-security-state", default)]
    send_security_state: bool,
    #[serde(rename = "security-enabled", default)]
    security_enabled: bool,
    #[serde(rename = "send-debugger-state", default)]
    send_debugger_state: bool,
    #[serde(rename = "debugger-enabled", default)]
    debugger_enabled: bool,
}

fn bus_kind_name(kind: BusKind) -> &'static str {
    match kind {
        BusKind::Can => "can",
        BusKind::Ethernet => "ethernet",
    }
}

fn parse_bus_kind(name: &str) -> SupResult<BusKind> {
    match name {
        "can" => Ok(BusKind::Can),
        "ethernet" => Ok(BusKind::Ethernet),
        other => Err(SupError::InvalidPackage(format!(
            "unknown bus kind \"{}\"",
            other
        ))),
    }
}

impl From<&PackagedFile> for XmlFile {
    fn from(file: &PackagedFile) -> Self {
        Self {
            path: file.path.clone(),
            sha256: file.sha256.clone(),
        }
    }
}

impl From<XmlFile> for PackagedFile {
    fn from(file: XmlFile) -> Self {
        PackagedFile::new(file.path, file.sha256)
    }
}

impl From<&NodeDefinitionEntry> for XmlNode {
    fn from(entry: &NodeDefinitionEntry) -> Self {
        Self {
            name: entry.name.clone(),
            device_type: entry.device_type.clone(),
            device_definition: entry.device_definition_path.clone(),
            other_accepted_device_names: XmlNameList {
                names: entry.other_accepted_device_names.clone(),
            },
            active: entry.active,
            update_position: entry.update_position,
            application_files: XmlFileList {
                files: entry.application_files.iter().map(XmlFile::from).collect(),
            },
            nvm_files: XmlFileList {
                files: entry.nvm_files.iter().map(XmlFile::from).collect(),
            },
            pem_file: entry.pem_file.as_ref().map(XmlFile::from),
            pem_states: XmlPemStates {
                send_security_state: entry.pem_states.security.send,
                security_enabled: entry.pem_states.security.enabled,
                send_debugger_state: entry.pem_states.debugger.send,
                debugger_enabled: entry.pem_states.debugger.enabled,
            },
        }
    }
}

impl From<XmlNode> for NodeDefinitionEntry {
    fn from(node: XmlNode) -> Self {
        Self {
            name: node.name,
            device_type: node.device_type,
            device_definition_path: node.device_definition,
            other_accepted_device_names: node.other_accepted_device_names.names,
            active: node.active,
            update_position: node.update_position,
            application_files: node
                .application_files
                .files
                .into_iter()
                .map(PackagedFile::from)
                .collect(),
            nvm_files: node
                .nvm_files
                .files
                .into_iter()
                .map(PackagedFile::from)
                .collect(),
            pem_file: node.pem_file.map(PackagedFile::from),
            pem_states: PemStates {
                security: StateFlag::new(
                    node.pem_states.send_security_state,
                    node.pem_states.security_enabled,
                ),
                debugger: StateFlag::new(
                    node.pem_states.send_debugger_state,
                    node.pem_states.debugger_enabled,
                ),
            },
        }
    }
}

// ============================================================================
// Definition document
// ============================================================================

/// Serialize a definition to its XML text.
pub fn definition_to_xml(definition: &PackageDefinition, meta: &DocumentMeta) -> SupResult<String> {
    let document = XmlDocument {
        file_version: meta.file_version,
        generator: meta.generator.clone(),
        created: meta.created.clone(),
        active_bus: XmlBus {
            index: definition.active_bus_index,
            name: definition.active_bus.name.clone(),
            kind: bus_kind_name(definition.active_bus.kind).to_string(),
        },
        nodes: XmlNodes {
            nodes: definition.nodes.iter().map(XmlNode::from).collect(),
        },
    };

    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| SupError::InvalidPackage(format!("failed to serialize definition: {}", e)))?;

    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{}\n",
        body
    ))
}

/// Parse a definition from its XML text.
pub fn definition_from_xml(xml: &str) -> SupResult<(PackageDefinition, DocumentMeta)> {
    let probe: XmlVersionProbe = quick_xml::de::from_str(xml).map_err(|e| {
        SupError::InvalidPackage(format!("definition has no readable file version: {}", e))
    })?;

    if probe.file_version < CURRENT_FILE_VERSION {
        return Err(SupError::OlderFileVersion {
            found: probe.file_version,
            current: CURRENT_FILE_VERSION,
        });
    }
    if probe.file_version > CURRENT_FILE_VERSION {
        return Err(SupError::UnsupportedVersion {
            found: probe.file_version,
            supported: CURRENT_FILE_VERSION,
        });
    }

    let document: XmlDocument = quick_xml::de::from_str(xml)
        .map_err(|e| SupError::InvalidPackage(format!("malformed definition: {}", e)))?;

    let definition = PackageDefinition {
        active_bus_index: document.active_bus.index,
        active_bus: Bus::new(
            document.active_bus.name,
            parse_bus_kind(&document.active_bus.kind)?,
        ),
        nodes: document
            .nodes
            .nodes
            .into_iter()
            .map(NodeDefinitionEntry::from)
            .collect(),
    };
    let meta = DocumentMeta {
        file_version: document.file_version,
        generator: document.generator,
        created: document.created,
    };
    Ok((definition, meta))
}

/// Write the definition document into a package root.
pub fn write_definition(
    root: &Path,
    definition: &PackageDefinition,
    meta: &DocumentMeta,
) -> SupResult<()> {
    let path = root.join(DEFINITION_FILE_NAME);
    let xml = definition_to_xml(definition, meta)?;
    fs::write(&path, xml).map_err(|e| SupError::WriteFailed { path, source: e })
}

/// Read the definition document from a package root.
pub fn read_definition(root: &Path) -> SupResult<(PackageDefinition, DocumentMeta)> {
    let path = root.join(DEFINITION_FILE_NAME);
    if !path.is_file() {
        return Err(SupError::InvalidPackage(format!(
            "{} not found in package",
            DEFINITION_FILE_NAME
        )));
    }
    let xml = fs::read_to_string(&path).map_err(|e| SupError::ReadFailed { path, source: e })?;
    definition_from_xml(&xml)
}

// ============================================================================
// Device-identification file
// ============================================================================

/// Distinct device-definition paths referenced by the definition, sorted.
pub fn referenced_device_definitions(definition: &PackageDefinition) -> BTreeSet<String> {
    definition
        .nodes
        .iter()
        .map(|node| node.device_definition_path.clone())
        .filter(|path| !path.is_empty())
        .collect()
}

/// Write the device-identification file into a package root.
pub fn write_device_definitions(root: &Path, device_definitions: &BTreeSet<String>) -> SupResult<()> {
    let path = root.join(DEVICE_DEFINITIONS_FILE_NAME);

    let mut conf = Ini::new();
    conf.set_to(
        Some(DEVICE_SECTION),
        DEVICE_COUNT_KEY.to_string(),
        device_definitions.len().to_string(),
    );
    for (index, device_definition) in device_definitions.iter().enumerate() {
        conf.set_to(
            Some(DEVICE_SECTION),
            format!("DeviceDefinition{}", index + 1),
            device_definition.clone(),
        );
    }

    conf.write_to_file(&path)
        .map_err(|e| SupError::WriteFailed { path, source: e })
}

/// Read the device-identification file from a package root.
pub fn read_device_definitions(root: &Path) -> SupResult<Vec<String>> {
    let path = root.join(DEVICE_DEFINITIONS_FILE_NAME);
    if !path.is_file() {
        return Err(SupError::InvalidPackage(format!(
            "{} not found in package",
            DEVICE_DEFINITIONS_FILE_NAME
        )));
    }

    let conf = Ini::load_from_file(&path).map_err(|e| {
        SupError::InvalidPackage(format!("malformed {}: {}", DEVICE_DEFINITIONS_FILE_NAME, e))
    })?;
    let section = conf.section(Some(DEVICE_SECTION)).ok_or_else(|| {
        SupError::InvalidPackage(format!(
            "{} has no [{}] section",
            DEVICE_DEFINITIONS_FILE_NAME, DEVICE_SECTION
        ))
    })?;
    let count: usize = section
        .get(DEVICE_COUNT_KEY)
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| {
            SupError::InvalidPackage(format!("{} is missing a valid count", DEVICE_DEFINITIONS_FILE_NAME))
        })?;

    (1..=count)
        .map(|index| {
            section
                .get(&format!("DeviceDefinition{}", index))
                .map(str::to_string)
                .ok_or_else(|| {
                    SupError::InvalidPackage(format!(
                        "{} is missing DeviceDefinition{}",
                        DEVICE_DEFINITIONS_FILE_NAME, index
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_definition() -> PackageDefinition {
        PackageDefinition {
            active_bus_index: 1,
            active_bus: Bus::new("CAN_Body", BusKind::Can),
            nodes: vec![
                NodeDefinitionEntry {
                    name: "ECU_Main".to_string(),
                    device_type: "ESX3CM".to_string(),
                    device_definition_path: "devices/ESX3CM/ESX3CM.syde_devdef".to_string(),
                    other_accepted_device_names: vec!["ESX3CM_B".to_string()],
                    active: true,
                    update_position: Some(1),
                    application_files: vec![
                        PackagedFile::new("000_ECU_Main/flash_00/app.hex", "aa"),
                        PackagedFile::new("000_ECU_Main/flash_01/boot.hex", "bb"),
                    ],
                    nvm_files: vec![PackagedFile::new("000_ECU_Main/nvm_00/p.syde_psi", "cc")],
                    pem_file: Some(PackagedFile::new("000_ECU_Main/pem/ecu.pem", "dd")),
                    pem_states: PemStates {
                        security: StateFlag::new(true, true),
                        debugger: StateFlag::new(true, false),
                    },
                },
                NodeDefinitionEntry {
                    name: "IO_Module".to_string(),
                    device_type: "IOM".to_string(),
                    device_definition_path: "devices/ESX3CM/ESX3CM.syde_devdef".to_string(),
                    ..Default::default()
                },
                NodeDefinitionEntry {
                    name: "Gateway".to_string(),
                    device_type: "GW".to_string(),
                    active: true,
                    update_position: Some(0),
                    application_files: vec![PackagedFile::new("002_Gateway/flash_00/gw.s19", "ee")],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_xml_roundtrip() {
        let definition = sample_definition();
        let meta = DocumentMeta::at("2024-05-01T10:00:00Z");

        let xml = definition_to_xml(&definition, &meta).unwrap();
        let (parsed, parsed_meta) = definition_from_xml(&xml).unwrap();

        assert_eq!(parsed, definition);
        assert_eq!(parsed_meta, meta);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let meta = DocumentMeta::at("2024-05-01T10:00:00Z");
        let first = definition_to_xml(&sample_definition(), &meta).unwrap();
        let second = definition_to_xml(&sample_definition(), &meta).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("<?xml"));
        assert!(first.contains("<file-version>3</file-version>"));
    }

    #[test]
    fn test_older_file_version_requests_different_loader() {
        let xml = "<service-update-package><file-version>2</file-version></service-update-package>";
        let err = definition_from_xml(xml).unwrap_err();
        assert!(matches!(
            err,
            SupError::OlderFileVersion {
                found: 2,
                current: CURRENT_FILE_VERSION
            }
        ));
    }

    #[test]
    fn test_newer_file_version_is_rejected() {
        let xml = "<service-update-package><file-version>9</file-version></service-update-package>";
        let err = definition_from_xml(xml).unwrap_err();
        assert!(matches!(err, SupError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn test_garbage_is_invalid_package() {
        let err = definition_from_xml("not xml at all").unwrap_err();
        assert!(matches!(err, SupError::InvalidPackage(_)));
    }

    #[test]
    fn test_generator_version() {
        let meta = DocumentMeta::at("x");
        assert_eq!(
            meta.generator_version(),
            Some(semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap())
        );
    }

    #[test]
    fn test_device_definitions_deduplicated() {
        let temp = TempDir::new().unwrap();
        let devices = referenced_device_definitions(&sample_definition());
        assert_eq!(devices.len(), 1);

        write_device_definitions(temp.path(), &devices).unwrap();
        let read = read_device_definitions(temp.path()).unwrap();
        assert_eq!(read, vec!["devices/ESX3CM/ESX3CM.syde_devdef".to_string()]);
    }

    #[test]
    fn test_definition_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let meta = DocumentMeta::now();
        write_definition(temp.path(), &sample_definition(), &meta).unwrap();

        let (definition, read_meta) = read_definition(temp.path()).unwrap();
        assert_eq!(definition, sample_definition());
        assert_eq!(read_meta.file_version, CURRENT_FILE_VERSION);
    }

    #[test]
    fn test_missing_definition_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            read_definition(temp.path()),
            Err(SupError::InvalidPackage(_))
        ));
    }
}
