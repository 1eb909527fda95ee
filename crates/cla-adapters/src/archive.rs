//! Filesystem-backed archive for signed documents.

use async_trait::async_trait;
use cla_core::collaborators::{archive_key, DocumentArchive};
use cla_core::error::{SignError, SignResult};
use cla_core::types::ClaType;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `{root}/{project}/{TYPE}/{reference}/{signature}.pdf`.
#[derive(Debug, Clone)]
pub struct FilesystemArchive {
    root: PathBuf,
}

impl FilesystemArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(
        &self,
        project_id: &str,
        cla_type: ClaType,
        reference_id: &str,
        signature_id: &str,
    ) -> SignResult<PathBuf> {
        let key = archive_key(project_id, cla_type, reference_id, signature_id);
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(SignError::Validation(format!("invalid archive key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.pdf")))
    }
}

#[async_trait]
impl DocumentArchive for FilesystemArchive {
    async fn upload(
        &self,
        document: Vec<u8>,
        project_id: &str,
        cla_type: ClaType,
        reference_id: &str,
        signature_id: &str,
    ) -> SignResult<()> {
        let path = self.path_for(project_id, cla_type, reference_id, signature_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SignError::collaborator("archive", e.to_string()))?;
        }
        let size = document.len();
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| SignError::collaborator("archive", e.to_string()))?;
        info!(path = %path.display(), bytes = size, "archived signed document");
        Ok(())
    }
}
