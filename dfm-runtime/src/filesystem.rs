//! A minimal async filesystem seam for adapters that read from a
//! provider-backed store. `LocalFileSystem` is the only implementation
//! shipped here (backing the `protocol = "file"` case); a remote-backed
//! implementation (S3, GCS, ...) plugs in behind the same trait without
//! touching adapter code.

use std::path::PathBuf;

use async_trait::async_trait;
use dfm_core::{DfmError, DfmResult};

/// Joins path segments with `/`, tolerating segments that already carry
/// leading/trailing slashes.
pub fn join_paths(segments: &[&str]) -> String {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_matches('/'))
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Files directly inside `dir` whose name ends in `.{extension}`,
    /// returned as full paths relative to the filesystem root.
    async fn list_files(&self, dir: &str, extension: &str) -> DfmResult<Vec<String>>;

    /// Every immediate subdirectory name of `dir`.
    async fn list_subdirectories(&self, dir: &str) -> DfmResult<Vec<String>>;

    async fn exists(&self, path: &str) -> DfmResult<bool>;

    async fn read_to_string(&self, path: &str) -> DfmResult<String>;
}

/// Backs onto a real directory on the local filesystem rooted at `base`.
pub struct LocalFileSystem {
    base: PathBuf,
}

impl LocalFileSystem {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn list_files(&self, dir: &str, extension: &str) -> DfmResult<Vec<String>> {
        let resolved = self.resolve(dir);
        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DfmError::server(e.to_string())),
        };
        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DfmError::server(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    found.push(join_paths(&[dir, name]));
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn list_subdirectories(&self, dir: &str) -> DfmResult<Vec<String>> {
        let resolved = self.resolve(dir);
        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DfmError::server(e.to_string())),
        };
        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DfmError::server(e.to_string()))?
        {
            let file_type = entry.file_type().await.map_err(|e| DfmError::server(e.to_string()))?;
            if file_type.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    found.push(name.to_string());
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn exists(&self, path: &str) -> DfmResult<bool> {
        Ok(tokio::fs::metadata(self.resolve(path)).await.is_ok())
    }

    async fn read_to_string(&self, path: &str) -> DfmResult<String> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| DfmError::data(format!("could not read {path}: {e}")))
    }
}

/// Two-level subdirectory enumeration used by `ListTextureFiles`' field
/// advisor: every `{level1}/{level2}` pair under `base` that contains at
/// least one `*.{format}` file.
pub async fn advise_two_level_subdirectories(
    fs: &dyn FileSystem,
    base: &str,
    format: &str,
) -> DfmResult<Vec<String>> {
    let mut paths = Vec::new();
    for level1 in fs.list_subdirectories(base).await? {
        let level1_path = join_paths(&[base, &level1]);
        for level2 in fs.list_subdirectories(&level1_path).await? {
            let level2_path = join_paths(&[&level1_path, &level2]);
            if !fs.list_files(&level2_path, format).await?.is_empty() {
                paths.push(join_paths(&[&level1, &level2]));
            }
        }
    }
    paths.sort();
    Ok(paths)
}
