//! # Blob Store
//!
//! Stores uploaded photos and proof documents and hands back an opaque path.
//! The registry only ever stores and echoes that path.
//!
//! Names are `{millis}-{uuid}.{ext}`; the extension comes from the declared
//! content type, never from the client's file name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// URL prefix under which stored blobs are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("file exceeds the {max} byte limit")]
    TooLarge { max: usize },
    #[error("unsupported content type {0:?}; expected an image or a PDF")]
    UnsupportedType(String),
    #[error("file is empty")]
    Empty,
    #[error("failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Where blobs go.
#[derive(Debug, Clone)]
pub enum BlobStore {
    /// Files under a directory, served by the HTTP layer.
    Filesystem { root: PathBuf },
    /// An in-process map. Tests only need the returned path.
    Memory(Arc<RwLock<HashMap<String, Vec<u8>>>>),
}

impl BlobStore {
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::Filesystem { root: root.into() }
    }

    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    /// The directory to serve at [`PUBLIC_PREFIX`], if any.
    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Filesystem { root } => Some(root),
            Self::Memory(_) => None,
        }
    }

    /// Store `bytes` and return its public path.
    pub async fn put(&self, content_type: &str, bytes: &[u8]) -> Result<String, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(BlobError::TooLarge {
                max: MAX_UPLOAD_BYTES,
            });
        }
        let ext = extension_for(content_type)
            .ok_or_else(|| BlobError::UnsupportedType(content_type.to_string()))?;
        let name = format!(
            "{}-{}.{ext}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4()
        );

        match self {
            Self::Filesystem { root } => {
                tokio::fs::create_dir_all(root).await?;
                tokio::fs::write(root.join(&name), bytes).await?;
            }
            Self::Memory(map) => {
                map.write().insert(name.clone(), bytes.to_vec());
            }
        }
        tracing::debug!(%name, size = bytes.len(), "blob stored");
        Ok(format!("{PUBLIC_PREFIX}/{name}"))
    }

    /// Read back a blob by its public path.
    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        let name = path.strip_prefix(PUBLIC_PREFIX)?.trim_start_matches('/');
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return None;
        }
        match self {
            Self::Filesystem { root } => tokio::fs::read(root.join(name)).await.ok(),
            Self::Memory(map) => map.read().get(name).cloned(),
        }
    }
}
