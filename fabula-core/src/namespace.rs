//! Storage namespaces for sessions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The storage partition for one session, keyed by session id.
///
/// All of a session's files (world state, chapters, link index) live in
/// one directory named after the namespace under the saves root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Create a fresh namespace with a random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing session id.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The session id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The directory this namespace occupies under the saves root.
    pub fn dir(&self, saves_dir: &Path) -> PathBuf {
        saves_dir.join(&self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
