//! `sydesup create`: build a package from a project view.

use std::path::PathBuf;

use clap::Args;
use sydesup::config::SupConfig;
use sydesup::package::{create_package_from_project, PackageOptions};

use super::print_warnings;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Project file (JSON)
    #[arg(long)]
    pub project: PathBuf,

    /// Name of the view to package
    #[arg(long)]
    pub view: String,

    /// Package to write (a directory with --compat)
    #[arg(long, short)]
    pub output: PathBuf,

    /// Write the legacy directory layout instead of a zip file
    #[arg(long)]
    pub compat: bool,

    /// Working directory for staging (overrides config)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Active bus index (overrides the view)
    #[arg(long)]
    pub bus: Option<usize>,
}

impl CreateArgs {
    fn options(&self, config: &SupConfig) -> PackageOptions {
        let mut options = PackageOptions::new()
            .with_compatibility_format(self.compat || config.compatibility_format);
        if let Some(dir) = self.temp_dir.as_ref().or(config.temp_dir.as_ref()) {
            options = options.with_temp_dir(dir);
        }
        if let Some(bus) = self.bus {
            options = options.with_active_bus(bus);
        }
        options
    }
}

pub fn run(args: CreateArgs, config: &SupConfig) -> Result<(), CliError> {
    let options = args.options(config);
    let report = create_package_from_project(&args.project, &args.view, &args.output, &options)?;

    print_warnings(&report.warnings);
    println!("Package written to {}", report.package_path.display());
    println!(
        "Nodes in update order: {}",
        report
            .update_order
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(compat: bool, temp_dir: Option<&str>) -> CreateArgs {
        CreateArgs {
            project: PathBuf::from("project.json"),
            view: "Main".to_string(),
            output: PathBuf::from("out.syde_sup"),
            compat,
            temp_dir: temp_dir.map(PathBuf::from),
            bus: Some(1),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = SupConfig::default().with_temp_dir(PathBuf::from("/config/tmp"));
        let options = args(true, Some("/cli/tmp")).options(&config);

        assert!(options.compatibility_format);
        assert_eq!(options.temp_dir, Some(PathBuf::from("/cli/tmp")));
        assert_eq!(options.active_bus_index, Some(1));
    }

    #[test]
    fn test_config_used_without_flags() {
        let config = SupConfig::default()
            .with_temp_dir(PathBuf::from("/config/tmp"))
            .with_compatibility_format(true);
        let options = args(false, None).options(&config);

        assert!(options.compatibility_format);
        assert_eq!(options.temp_dir, Some(PathBuf::from("/config/tmp")));
    }
}
