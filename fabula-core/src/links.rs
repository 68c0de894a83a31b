//! Cross-reference sidecar index.
//!
//! `links.yaml` maps each chapter's file stem to the cross-references
//! the link-refresh step extracted from it. The data is best-effort:
//! the session layer treats update failures as non-fatal, and a missing
//! file reads as an empty index.

use crate::config::EngineConfig;
use crate::namespace::Namespace;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// File name of the link index within a namespace.
pub const LINKS_FILE: &str = "links.yaml";

/// Errors from link index operations.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link index for session {namespace} is corrupt: {source}")]
    Corrupt {
        namespace: Namespace,
        #[source]
        source: serde_yml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-namespace index of chapter cross-references.
#[derive(Debug, Clone)]
pub struct LinkIndex {
    saves_dir: PathBuf,
}

impl LinkIndex {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            saves_dir: config.saves_dir().to_path_buf(),
        }
    }

    fn links_path(&self, namespace: &Namespace) -> PathBuf {
        namespace.dir(&self.saves_dir).join(LINKS_FILE)
    }

    /// Load the index for a namespace; missing file reads as empty.
    pub async fn load(
        &self,
        namespace: &Namespace,
    ) -> Result<BTreeMap<String, Vec<String>>, LinkError> {
        let content = match fs::read_to_string(self.links_path(namespace)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        serde_yml::from_str(&content).map_err(|source| LinkError::Corrupt {
            namespace: namespace.clone(),
            source,
        })
    }

    /// Record the cross-references for one chapter.
    ///
    /// Read-modify-write of the whole index; existing entries for other
    /// chapters are preserved.
    pub async fn update(
        &self,
        namespace: &Namespace,
        chapter_stem: &str,
        refs: Vec<String>,
    ) -> Result<(), LinkError> {
        let mut index = self.load(namespace).await?;
        index.insert(chapter_stem.to_string(), refs);

        let content = serde_yml::to_string(&index).map_err(|source| LinkError::Corrupt {
            namespace: namespace.clone(),
            source,
        })?;

        fs::create_dir_all(namespace.dir(&self.saves_dir)).await?;
        fs::write(self.links_path(namespace), content).await?;
        debug!(namespace = %namespace, chapter = chapter_stem, "updated link index");
        Ok(())
    }
}
