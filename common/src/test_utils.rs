use std::path::PathBuf;

/// Returns the workspace root (parent of the calling crate's manifest directory).
fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// Returns `test_output/<name>` under the workspace root, creating the directory.
pub fn test_output_path(name: &str) -> PathBuf {
    let dir = workspace_root().join("test_output");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("Failed to create {}: {}", dir.display(), e);
    }
    dir.join(name)
}
