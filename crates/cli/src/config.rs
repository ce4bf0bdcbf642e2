//! Settings and cluster selection for the CLI

use anyhow::{Context, Result};
use kedaflow_lib::{EndpointHint, Settings};
use std::path::{Path, PathBuf};

/// Load layered settings, naming the file in the error when one was given
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(Some(path))
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Settings::load(None).context("Failed to load settings"),
    }
}

/// Cluster selection from the global flags
pub fn endpoint_hint(kubeconfig: Option<PathBuf>, context: Option<String>) -> EndpointHint {
    EndpointHint { kubeconfig, context }
}

/// Kubeconfig that will be used, for display
pub fn kubeconfig_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs_next::home_dir().map(|home| home.join(".kube").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_kubeconfig_wins() {
        let path = kubeconfig_path(Some(Path::new("/tmp/kind.yaml")));
        assert_eq!(path, Some(PathBuf::from("/tmp/kind.yaml")));
    }

    #[test]
    fn test_missing_settings_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("kedaflow.toml");
        let err = load_settings(Some(&missing)).unwrap_err();
        assert!(format!("{:#}", err).contains("kedaflow.toml"));
    }
}
