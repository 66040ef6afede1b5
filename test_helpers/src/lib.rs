//! Test helpers for the photometry workspace
//!
//! Locates the workspace root so integration tests can find checked-in
//! fixtures and write artifacts to a shared output directory, regardless
//! of the directory `cargo test` runs them from.

use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("Failed to find workspace root: {0}")]
    WorkspaceRootNotFound(String),

    #[error("Fixture not found: {0}")]
    FixtureNotFound(PathBuf),
}

/// Walk up from the current directory to the Cargo.toml declaring `[workspace]`.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut dir = env::current_dir().map_err(|e| {
        TestHelperError::WorkspaceRootNotFound(format!("cannot read current directory: {e}"))
    })?;

    loop {
        let manifest = dir.join("Cargo.toml");
        if manifest.is_file() {
            let content = std::fs::read_to_string(&manifest).map_err(|e| {
                TestHelperError::WorkspaceRootNotFound(format!(
                    "cannot read {}: {e}",
                    manifest.display()
                ))
            })?;
            if content.lines().any(|line| line.trim() == "[workspace]") {
                return Ok(dir);
            }
        }

        if !dir.pop() {
            return Err(TestHelperError::WorkspaceRootNotFound(
                "no Cargo.toml with a [workspace] table above the current directory".to_string(),
            ));
        }
    }
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find workspace root directory"));

/// Directory for test artifacts, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }
    output_dir
}

/// A path inside [`get_output_dir`].
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Directory holding the checked-in photometry fixtures.
pub fn fixtures_dir() -> PathBuf {
    PROJECT_ROOT.join("photometry").join("tests").join("fixtures")
}

/// Path to a named fixture, which must exist.
///
/// # Arguments
/// * `name` - File name relative to [`fixtures_dir`]
pub fn fixture_path<P: AsRef<Path>>(name: P) -> Result<PathBuf, TestHelperError> {
    let path = fixtures_dir().join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(TestHelperError::FixtureNotFound(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_root_is_workspace() {
        let root = find_project_root().expect("Failed to find workspace root");
        assert!(root.join("Cargo.toml").is_file());
        assert!(root.join("photometry").is_dir());
    }

    #[test]
    fn test_output_path() {
        let path = output_path("summary.json");
        assert_eq!(path, get_output_dir().join("summary.json"));
        assert!(get_output_dir().is_dir());
    }

    #[test]
    fn test_missing_fixture() {
        let err = fixture_path("does_not_exist.json").unwrap_err();
        assert!(matches!(err, TestHelperError::FixtureNotFound(_)));
    }

    #[test]
    fn test_quality_fixture_present() {
        assert!(fixture_path("quality_fixture.json").is_ok());
    }
}
