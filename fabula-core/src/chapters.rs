//! The append-only chapter log.
//!
//! Chapters are immutable markdown documents named `chapter_<N>.md`
//! with a 1-based sequence number. Ordering is defined by the number in
//! the file name, never by modification time, so it survives
//! save-directory restores and clock skew. The next sequence number is
//! one greater than the highest existing number, not a count of files,
//! which keeps numbering correct when chapters are removed out-of-band.

use crate::config::EngineConfig;
use crate::namespace::Namespace;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// File name prefix for chapter documents.
pub const CHAPTER_PREFIX: &str = "chapter_";

/// File extension for chapter documents.
pub const CHAPTER_EXT: &str = "md";

/// Errors from chapter log operations.
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("no chapters found for session {0}")]
    NoChapters(Namespace),

    #[error("chapter {seq} not found for session {namespace}")]
    NotFound { namespace: Namespace, seq: u32 },

    #[error("failed to write chapter {seq}: {source}")]
    Write {
        seq: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference to one immutable chapter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    namespace: Namespace,
    seq: u32,
    path: PathBuf,
}

impl ChapterRef {
    /// The 1-based sequence number within the session.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// The namespace this chapter belongs to.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Path of the chapter document on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem used as the chapter's key in the link index.
    pub fn file_stem(&self) -> String {
        format!("{CHAPTER_PREFIX}{}", self.seq)
    }
}

/// Append-only storage for chapter documents, per namespace.
#[derive(Debug, Clone)]
pub struct ChapterLog {
    saves_dir: PathBuf,
}

impl ChapterLog {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            saves_dir: config.saves_dir().to_path_buf(),
        }
    }

    fn chapter_ref(&self, namespace: &Namespace, seq: u32) -> ChapterRef {
        let path = namespace
            .dir(&self.saves_dir)
            .join(format!("{CHAPTER_PREFIX}{seq}.{CHAPTER_EXT}"));
        ChapterRef {
            namespace: namespace.clone(),
            seq,
            path,
        }
    }

    /// Append a new chapter and return its reference.
    ///
    /// The write either fully succeeds or fails with `Write`; callers
    /// must not assume partial success.
    pub async fn append(
        &self,
        namespace: &Namespace,
        text: &str,
    ) -> Result<ChapterRef, ChapterError> {
        fs::create_dir_all(namespace.dir(&self.saves_dir)).await?;

        let seq = self.max_seq(namespace).await?.map_or(1, |max| max + 1);
        let chapter = self.chapter_ref(namespace, seq);

        fs::write(chapter.path(), text)
            .await
            .map_err(|source| ChapterError::Write { seq, source })?;

        info!(namespace = %namespace, seq, "appended chapter");
        Ok(chapter)
    }

    /// The chapter with the highest sequence number.
    pub async fn latest(&self, namespace: &Namespace) -> Result<ChapterRef, ChapterError> {
        match self.max_seq(namespace).await? {
            Some(seq) => Ok(self.chapter_ref(namespace, seq)),
            None => Err(ChapterError::NoChapters(namespace.clone())),
        }
    }

    /// Read a chapter's text.
    ///
    /// Fails with `NotFound` if the document has been removed
    /// out-of-band since the reference was obtained.
    pub async fn read(&self, chapter: &ChapterRef) -> Result<String, ChapterError> {
        match fs::read_to_string(chapter.path()).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ChapterError::NotFound {
                namespace: chapter.namespace.clone(),
                seq: chapter.seq,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Highest chapter sequence number present, if any.
    ///
    /// Foreign files in the namespace directory and gaps in the
    /// numbering are both tolerated.
    async fn max_seq(&self, namespace: &Namespace) -> Result<Option<u32>, ChapterError> {
        let dir = namespace.dir(&self.saves_dir);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut max: Option<u32> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(seq) = parse_seq(&name.to_string_lossy()) {
                max = Some(max.map_or(seq, |m| m.max(seq)));
            }
        }
        debug!(namespace = %namespace, max = ?max, "scanned chapter log");
        Ok(max)
    }
}

/// Parse the sequence number out of a chapter file name.
///
/// Returns `None` for anything that is not `chapter_<N>.md` with a
/// positive integer `N`.
fn parse_seq(file_name: &str) -> Option<u32> {
    let stem = file_name
        .strip_prefix(CHAPTER_PREFIX)?
        .strip_suffix(&format!(".{CHAPTER_EXT}"))?;
    match stem.parse::<u32>() {
        Ok(seq) if seq > 0 => Some(seq),
        _ => None,
    }
}
