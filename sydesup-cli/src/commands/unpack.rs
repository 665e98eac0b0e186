//! `sydesup unpack`: extract and validate a package.

use std::path::PathBuf;

use clap::Args;
use sydesup::package::{process_package, PackageContent, ProcessOutcome};

use super::print_warnings;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct UnpackArgs {
    /// Package file, or package directory with --directory
    pub package: PathBuf,

    /// Directory to extract into (removed and recreated)
    #[arg(long, short)]
    pub target: PathBuf,

    /// Read an already extracted or legacy directory package in place
    #[arg(long)]
    pub directory: bool,
}

pub fn run(args: UnpackArgs) -> Result<(), CliError> {
    match process_package(&args.package, &args.target, !args.directory)? {
        ProcessOutcome::Unpacked(report) => {
            print_warnings(&report.warnings);
            print_summary(&report.content);
            Ok(())
        }
        ProcessOutcome::UseDifferentLoader { file_version } => {
            Err(CliError::UseDifferentLoader { file_version })
        }
    }
}

fn print_summary(content: &PackageContent) {
    println!("Package content in {}", content.root.display());
    println!(
        "Active bus: {} (index {})",
        content.active_bus.name, content.active_bus_index
    );
    println!("Created by {} at {}", content.meta.generator, content.meta.created);

    for (rank, &node_index) in content.update_order.iter().enumerate() {
        let node = &content.system.nodes[node_index];
        let application = &content.applications[node_index];
        println!("{}. {} ({})", rank + 1, node.name, node.device_type);
        for file in &application.files_to_flash {
            println!("     flash {}", file.display());
        }
        for file in &application.files_to_write_to_nvm {
            println!("     nvm   {}", file.display());
        }
        if let Some(pem) = &application.pem_file {
            println!("     pem   {}", pem.display());
        }
    }
}
