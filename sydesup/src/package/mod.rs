//! Service update package creation and unpacking.
//!
//! # Overview
//!
//! Creating a package runs strictly sequential stages, each fully finished
//! before the next one starts:
//!
//! ```text
//! system + view ─► content ─► order ─► definition ─► archive
//!                  (per node)  (ranks)  (XML + INI)   (zip or directory)
//! ```
//!
//! - **paths**: placeholder resolution and Data Block path independence
//! - **content**: files each node receives, auto-deactivation of empty nodes
//! - **order**: deterministic update order from raw positions
//! - **definition**: the versioned XML document and device file
//! - **archive**: staging, [`ZipFormat`] and [`LegacyDirectoryFormat`]
//! - **orchestrator**: [`create_package`] and [`process_package`]
//!
//! # Package layout
//!
//! ```text
//! update.syde_sup
//! ├── sup_definition.xml
//! ├── device_definitions.ini
//! ├── 000_ECU_Main/
//! │   ├── flash_00/app.hex
//! │   ├── nvm_00/params.syde_psi
//! │   └── pem/ecu.pem
//! └── 002_Gateway/
//!     └── flash_00/app.hex
//! ```

mod archive;
mod checksum;
mod content;
mod definition;
mod naming;
mod order;
mod orchestrator;
mod paths;

// Entry points
pub use orchestrator::{
    create_package, create_package_from_project, process_package, BuildContext, CreateReport,
    PackageFailure, PackageInput, PackageOptions, PackageStatus, ProcessOutcome, UnpackReport,
};

// Collected content and unpacked packages
pub use archive::{
    archive_format, ArchiveFormat, LegacyDirectoryFormat, PackageContent, ZipFormat,
};
pub use content::{collect_node_content, NodeUpdateContent, PemStates, StateFlag};

// Definition document
pub use definition::{
    definition_from_xml, definition_to_xml, DocumentMeta, NodeDefinitionEntry, PackageDefinition,
    PackagedFile, CURRENT_FILE_VERSION,
};

// Ordering and paths
pub use order::{normalized_positions, order_from_positions, plan_update_order};
pub use paths::{
    contains_placeholder, make_independent_of_data_block_project, resolve_data_block_output_path,
    resolve_file_based_path, resolve_nvm_image_path, resolve_pem_path, Placeholders,
};

// Naming utilities
pub use checksum::calculate_file_checksum;
pub use naming::{
    has_package_extension, node_directory_name, packaged_file_path, FileSlot,
    DEFINITION_FILE_NAME, DEVICE_DEFINITIONS_FILE_NAME, PACKAGE_EXTENSION,
};
