//! SYDE SUP - Service update packages for multi-node embedded systems
//!
//! This library turns a system definition (nodes, buses, Data Blocks, NVM
//! parameter sets, PEM security files) plus one update view into a
//! self-contained, versioned package, and reads such packages back for a
//! sequential flashing run.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use sydesup::package::{create_package_from_project, PackageOptions};
//!
//! let report = create_package_from_project(
//!     Path::new("project.json"),
//!     "Main",
//!     Path::new("update.syde_sup"),
//!     &PackageOptions::new(),
//! )?;
//! println!("update order: {:?}", report.update_order);
//! # Ok::<(), sydesup::package::PackageFailure>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod package;
pub mod project;
pub mod system;

pub use error::{ErrorKind, SupError, SupResult};
