//! Resolution of node file references into absolute, machine-independent paths.
//!
//! File references in a system definition come in three flavours:
//!
//! - Data Block result paths, relative to the Data Block's own project
//!   directory and possibly containing placeholder variables
//! - file-based application paths, relative to the open project
//! - explicit override paths from the view's update settings
//!
//! Data Block paths are first rewritten to no longer depend on the Data Block
//! project directory, then placeholders are substituted, then the result is
//! anchored at the open project directory. The order matters: a placeholder
//! may expand to an absolute path, which must not be re-rooted under the Data
//! Block project afterwards.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Variable holding the open project directory.
pub const VAR_PROJECT_DIR: &str = "OPENSYDE_PROJECT";
/// Variable holding the project name.
pub const VAR_PROJECT_NAME: &str = "PROJECT_NAME";
/// Variable holding the current Data Block's project directory.
pub const VAR_DATA_BLOCK_PROJECT: &str = "DATABLOCK_PROJECT";
/// Variable holding the login name of the current user.
pub const VAR_USER_NAME: &str = "USER_NAME";
/// Variable holding the host name.
pub const VAR_COMPUTER_NAME: &str = "COMPUTER_NAME";

/// Matches `%{NAME}` and `${NAME}` tokens.
fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"[%$]\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Whether the string contains any placeholder token.
pub fn contains_placeholder(path: &str) -> bool {
    placeholder_regex().is_match(path)
}

/// Whether the string starts with a placeholder token.
///
/// Such paths are anchored by their variable and are never treated as
/// relative to a Data Block project.
fn starts_with_placeholder(path: &str) -> bool {
    placeholder_regex()
        .find(path)
        .is_some_and(|m| m.start() == 0)
}

/// Placeholder variable table.
///
/// Unknown tokens are left untouched; a path still carrying one will fail the
/// file existence check when the package is staged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    variables: BTreeMap<String, String>,
}

impl Placeholders {
    /// Empty variable table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard variables for an open project.
    ///
    /// The project name is available both as `PROJECT_NAME` and as
    /// `ProjectName`.
    pub fn for_project(project_dir: &Path, project_name: &str) -> Self {
        let mut placeholders = Self::new()
            .with_variable(VAR_PROJECT_DIR, project_dir.to_string_lossy())
            .with_variable(VAR_PROJECT_NAME, project_name)
            .with_variable("ProjectName", project_name);

        if let Some(user) = std::env::var("USER")
            .ok()
            .or_else(|| std::env::var("USERNAME").ok())
        {
            placeholders.set(VAR_USER_NAME, user);
        }
        if let Some(host) = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::env::var("COMPUTERNAME").ok())
        {
            placeholders.set(VAR_COMPUTER_NAME, host);
        }
        placeholders
    }

    /// Add a variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set or replace a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Substitute all known tokens.
    pub fn resolve(&self, input: &str) -> String {
        placeholder_regex()
            .replace_all(input, |caps: &Captures<'_>| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Lexically normalize a path: drop `.` and fold `..` where possible.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Anchor a path at `base` if it is relative, then normalize.
pub fn make_absolute(path: &str, base: &Path) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        normalize_path(candidate)
    } else {
        normalize_path(&base.join(candidate))
    }
}

/// Rewrite a Data Block result path so it no longer depends on the Data
/// Block's project directory.
///
/// The `DATABLOCK_PROJECT` token is replaced by the Data Block project
/// directory, and relative paths are re-rooted there. Paths starting with any
/// other placeholder are left for placeholder resolution. Without a Data
/// Block project the path is returned as declared.
pub fn make_independent_of_data_block_project(
    data_block_project: &str,
    project_dir: &Path,
    path: &str,
) -> String {
    if data_block_project.is_empty() {
        return path.to_string();
    }

    let data_block_dir = make_absolute(data_block_project, project_dir);
    let substituted = Placeholders::new()
        .with_variable(VAR_DATA_BLOCK_PROJECT, data_block_dir.to_string_lossy())
        .resolve(path);

    if Path::new(&substituted).is_absolute() || starts_with_placeholder(&substituted) {
        return substituted;
    }

    normalize_path(&data_block_dir.join(&substituted))
        .to_string_lossy()
        .into_owned()
}

/// Resolve one Data Block output of a node.
///
/// A non-empty `declared` override wins and only gets placeholder resolution.
/// Otherwise the Data Block's `result_path` is made independent of the Data
/// Block project first and placeholders are resolved afterwards.
pub fn resolve_data_block_output_path(
    declared: &str,
    result_path: &str,
    data_block_project: &str,
    project_dir: &Path,
    placeholders: &Placeholders,
) -> PathBuf {
    let path = if declared.is_empty() {
        let independent =
            make_independent_of_data_block_project(data_block_project, project_dir, result_path);
        placeholders.resolve(&independent)
    } else {
        placeholders.resolve(declared)
    };
    make_absolute(&path, project_dir)
}

/// Resolve a file-based application path.
///
/// File-based paths never get placeholder substitution.
pub fn resolve_file_based_path(declared: &str, project_dir: &Path) -> PathBuf {
    make_absolute(declared, project_dir)
}

/// Resolve an NVM parameter-set image path.
///
/// `parameter_set_output` is the HALC parameter-set Data Block output at the
/// same position as the entry, used when no override is declared.
pub fn resolve_nvm_image_path(
    declared: &str,
    parameter_set_output: &str,
    data_block_project: &str,
    project_dir: &Path,
    placeholders: &Placeholders,
) -> PathBuf {
    resolve_data_block_output_path(
        declared,
        parameter_set_output,
        data_block_project,
        project_dir,
        placeholders,
    )
}

/// Resolve a PEM file path against the open project.
pub fn resolve_pem_path(declared: &str, project_dir: &Path) -> PathBuf {
    make_absolute(declared, project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> PathBuf {
        PathBuf::from("/work/projects/demo")
    }

    fn placeholders() -> Placeholders {
        Placeholders::new()
            .with_variable(VAR_PROJECT_DIR, "/work/projects/demo")
            .with_variable("ProjectName", "Demo")
    }

    #[test]
    fn test_placeholder_substitution_in_result_path() {
        let resolved = resolve_data_block_output_path(
            "",
            "output/${ProjectName}.hex",
            "",
            &project(),
            &placeholders(),
        );
        assert_eq!(resolved, PathBuf::from("/work/projects/demo/output/Demo.hex"));
    }

    #[test]
    fn test_result_path_rerooted_at_data_block_project() {
        let resolved = resolve_data_block_output_path(
            "",
            "output/${ProjectName}.hex",
            "../firmware/ecu",
            &project(),
            &placeholders(),
        );
        assert_eq!(
            resolved,
            PathBuf::from("/work/projects/firmware/ecu/output/Demo.hex")
        );
        assert!(!contains_placeholder(&resolved.to_string_lossy()));
    }

    #[test]
    fn test_data_block_project_token_is_replaced() {
        let resolved = resolve_data_block_output_path(
            "",
            "%{DATABLOCK_PROJECT}/bin/app.s19",
            "db",
            &project(),
            &placeholders(),
        );
        assert_eq!(resolved, PathBuf::from("/work/projects/demo/db/bin/app.s19"));
    }

    #[test]
    fn test_anchored_placeholder_not_rerooted() {
        // Resolution must happen after the independence rewrite; otherwise
        // this would land under the Data Block project.
        let resolved = resolve_data_block_output_path(
            "",
            "%{OPENSYDE_PROJECT}/shared/boot.hex",
            "db",
            &project(),
            &placeholders(),
        );
        assert_eq!(
            resolved,
            PathBuf::from("/work/projects/demo/shared/boot.hex")
        );
    }

    #[test]
    fn test_override_path_used_verbatim() {
        let resolved = resolve_data_block_output_path(
            "custom/${ProjectName}_v2.hex",
            "output/app.hex",
            "db",
            &project(),
            &placeholders(),
        );
        assert_eq!(
            resolved,
            PathBuf::from("/work/projects/demo/custom/Demo_v2.hex")
        );
    }

    #[test]
    fn test_file_based_path_skips_placeholders() {
        let resolved = resolve_file_based_path("files/${ProjectName}.bin", &project());
        assert_eq!(
            resolved,
            PathBuf::from("/work/projects/demo/files/${ProjectName}.bin")
        );
    }

    #[test]
    fn test_absolute_paths_stay_absolute() {
        assert_eq!(
            resolve_pem_path("/keys/node.pem", &project()),
            PathBuf::from("/keys/node.pem")
        );
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        assert_eq!(placeholders().resolve("%{UNKNOWN}/x"), "%{UNKNOWN}/x");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/./c/../d")),
            PathBuf::from("/a/b/d")
        );
        assert_eq!(normalize_path(Path::new("../x/../y")), PathBuf::from("../y"));
        assert_eq!(normalize_path(Path::new("/../x")), PathBuf::from("/x"));
    }
}
