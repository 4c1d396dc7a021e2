// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem object store for invoice PDFs.
//!
//! Blobs are content-addressed (`<sha256>-<name>`) under a two-character fan-out
//! directory, so storing the same attachment twice is a no-op overwrite.

use std::path::{Path, PathBuf};

use apflow_core::{AdapterType, ApflowError, HealthStatus, ObjectStore, PluginAdapter};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

const URL_SCHEME: &str = "file://";

fn io_error(context: &str, e: std::io::Error) -> ApflowError {
    let transient = e.kind() != std::io::ErrorKind::NotFound;
    ApflowError::Dependency {
        dependency: "storage".into(),
        message: format!("{context}: {e}"),
        transient,
        source: Some(Box::new(e)),
    }
}

/// Keeps only characters that are safe in a file name.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Object store backed by a local directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str, content: &[u8]) -> PathBuf {
        let digest = hex::encode(Sha256::digest(content));
        self.root
            .join(&digest[..2])
            .join(format!("{digest}-{}", sanitize_name(name)))
    }

    /// Resolve a `file://` URL, refusing anything outside the store root.
    fn resolve(&self, url: &str) -> Result<PathBuf, ApflowError> {
        let raw = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| ApflowError::Validation(format!("unsupported blob url `{url}`")))?;
        let path = Path::new(raw);
        if !path.starts_with(&self.root)
            || path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ApflowError::Validation(format!(
                "blob url `{url}` is outside the object store"
            )));
        }
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl PluginAdapter for FsObjectStore {
    fn name(&self) -> &str {
        "fs-object-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::ObjectStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ApflowError> {
        match tokio::fs::create_dir_all(&self.root).await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "blob directory {} unusable: {e}",
                self.root.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ApflowError> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<String, ApflowError> {
        let path = self.path_for(name, content);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create blob directory", e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_error("write blob", e))?;
        debug!(path = %path.display(), content_type, bytes = content.len(), "blob stored");
        Ok(format!("{URL_SCHEME}{}", path.display()))
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, ApflowError> {
        let path = self.resolve(url)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| io_error("read blob", e))
    }
}
