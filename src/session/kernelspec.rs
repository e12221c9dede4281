//! Kernelspec discovery.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::QkernelError;
use crate::Result;

/// Placeholder in `argv` replaced by the connection file path.
const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Placeholder in `argv` replaced by the kernelspec directory.
const RESOURCE_DIR_PLACEHOLDER: &str = "{resource_dir}";

/// A `kernel.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KernelSpec {
    /// Command line used to launch the kernel.
    pub argv: Vec<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub language: String,
    /// Extra environment for the kernel process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A kernelspec together with where it was found.
#[derive(Debug, Clone)]
pub struct ResolvedKernelSpec {
    pub name: String,
    /// Directory holding `kernel.json`; `None` for the built-in fallback.
    pub resource_dir: Option<PathBuf>,
    pub spec: KernelSpec,
}

impl ResolvedKernelSpec {
    /// Launch command with placeholders substituted.
    pub fn command_line(&self, connection_file: &Path) -> Vec<String> {
        let connection = connection_file.display().to_string();
        let resources = self
            .resource_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();

        self.spec
            .argv
            .iter()
            .map(|arg| {
                arg.replace(CONNECTION_FILE_PLACEHOLDER, &connection)
                    .replace(RESOURCE_DIR_PLACEHOLDER, &resources)
            })
            .collect()
    }
}

/// The spec used for `python3` when none is installed.
pub fn python3_fallback() -> KernelSpec {
    KernelSpec {
        argv: [
            "python3",
            "-m",
            "ipykernel_launcher",
            "-f",
            CONNECTION_FILE_PLACEHOLDER,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        display_name: "Python 3".to_string(),
        language: "python".to_string(),
        env: HashMap::new(),
    }
}

/// Jupyter data directories in lookup order, most specific first.
pub fn data_dirs() -> Vec<PathBuf> {
    let mut found = Vec::new();

    if let Some(path) = env::var_os("JUPYTER_PATH") {
        found.extend(env::split_paths(&path).filter(|p| !p.as_os_str().is_empty()));
    }
    if let Some(dir) = env::var_os("JUPYTER_DATA_DIR") {
        found.push(PathBuf::from(dir));
    } else if let Some(home) = dirs::home_dir() {
        found.push(home.join(".local").join("share").join("jupyter"));
    }
    for prefix in ["VIRTUAL_ENV", "CONDA_PREFIX"] {
        if let Some(root) = env::var_os(prefix) {
            found.push(PathBuf::from(root).join("share").join("jupyter"));
        }
    }
    found.push(PathBuf::from("/usr/local/share/jupyter"));
    found.push(PathBuf::from("/usr/share/jupyter"));

    found
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != ".."
}

/// Find kernelspec `name` in `search_dirs`.
///
/// A missing `python3` spec resolves to [`python3_fallback`].
pub fn find_kernel_spec(name: &str, search_dirs: &[PathBuf]) -> Result<ResolvedKernelSpec> {
    if !valid_name(name) {
        return Err(QkernelError::KernelSpecNotFound(format!("invalid kernel name '{name}'")));
    }

    for base in search_dirs {
        let dir = base.join("kernels").join(name);
        let file = dir.join("kernel.json");
        if !file.is_file() {
            continue;
        }

        let content = fs::read_to_string(&file)?;
        let spec: KernelSpec = serde_json::from_str(&content).map_err(|e| {
            QkernelError::KernelSpecNotFound(format!("{}: {e}", file.display()))
        })?;
        if spec.argv.is_empty() {
            return Err(QkernelError::KernelSpecNotFound(format!(
                "{}: empty argv",
                file.display()
            )));
        }

        debug!(kernel = name, path = %file.display(), "resolved kernelspec");
        return Ok(ResolvedKernelSpec {
            name: name.to_string(),
            resource_dir: Some(dir),
            spec,
        });
    }

    if name == "python3" {
        debug!("no python3 kernelspec installed, using ipykernel_launcher");
        return Ok(ResolvedKernelSpec {
            name: name.to_string(),
            resource_dir: None,
            spec: python3_fallback(),
        });
    }

    Err(QkernelError::KernelSpecNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn install(base: &Path, name: &str, json: &str) {
        let dir = base.join("kernels").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("kernel.json"), json).unwrap();
    }

    #[test]
    fn test_find_installed_spec() {
        let base = tempdir().unwrap();
        install(
            base.path(),
            "ir",
            r#"{"argv": ["R", "--slave", "-e", "IRkernel::main()", "--args", "{connection_file}"],
                "display_name": "R", "language": "R", "env": {"R_LIBS": "/opt/r"}}"#,
        );

        let resolved = find_kernel_spec("ir", &[base.path().to_path_buf()]).unwrap();
        assert_eq!(resolved.spec.language, "R");
        assert_eq!(resolved.spec.env.get("R_LIBS").map(String::as_str), Some("/opt/r"));

        let argv = resolved.command_line(Path::new("/run/kernel-1.json"));
        assert_eq!(argv.last().map(String::as_str), Some("/run/kernel-1.json"));
        assert_eq!(argv[0], "R");
    }

    #[test]
    fn test_first_directory_wins() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        install(first.path(), "k", r#"{"argv": ["first", "{connection_file}"]}"#);
        install(second.path(), "k", r#"{"argv": ["second", "{connection_file}"]}"#);

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let resolved = find_kernel_spec("k", &dirs).unwrap();
        assert_eq!(resolved.spec.argv[0], "first");
    }

    #[test]
    fn test_resource_dir_substitution() {
        let base = tempdir().unwrap();
        install(base.path(), "x", r#"{"argv": ["{resource_dir}/run.sh", "-f", "{connection_file}"]}"#);

        let resolved = find_kernel_spec("x", &[base.path().to_path_buf()]).unwrap();
        let argv = resolved.command_line(Path::new("/c.json"));
        assert!(argv[0].ends_with("kernels/x/run.sh"));
        assert_eq!(argv[2], "/c.json");
    }

    #[test]
    fn test_python3_fallback() {
        let empty = tempdir().unwrap();
        let resolved = find_kernel_spec("python3", &[empty.path().to_path_buf()]).unwrap();
        assert!(resolved.resource_dir.is_none());

        let argv = resolved.command_line(Path::new("/c.json"));
        assert_eq!(argv, vec!["python3", "-m", "ipykernel_launcher", "-f", "/c.json"]);
    }

    #[test]
    fn test_unknown_kernel() {
        let empty = tempdir().unwrap();
        let err = find_kernel_spec("julia-1.10", &[empty.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, QkernelError::KernelSpecNotFound(_)));
    }

    #[test]
    fn test_rejects_path_like_names() {
        assert!(find_kernel_spec("../etc", &[]).is_err());
        assert!(find_kernel_spec("", &[]).is_err());
    }

    #[test]
    fn test_empty_argv_rejected() {
        let base = tempdir().unwrap();
        install(base.path(), "bad", r#"{"argv": []}"#);
        assert!(find_kernel_spec("bad", &[base.path().to_path_buf()]).is_err());
    }
}
