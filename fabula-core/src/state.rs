//! World state: the serialized facts, choice history, and metadata for
//! a session.
//!
//! State is a typed structure with free-form `player`/`world` maps for
//! facts the engine does not interpret, plus the `story` and `meta`
//! blocks it does. It persists as `world.yaml` in the session's
//! namespace directory, written atomically so a crash mid-save never
//! leaves a half-written file.

use crate::config::EngineConfig;
use crate::namespace::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// File name of the serialized world state within a namespace.
pub const WORLD_STATE_FILE: &str = "world.yaml";

/// Schema tag written into `meta.version`.
pub const STATE_VERSION: &str = "1.0";

/// Errors from world state operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no world state found for session {0}")]
    NotFound(Namespace),

    #[error("world state for session {namespace} is corrupt: {source}")]
    Corrupt {
        namespace: Namespace,
        #[source]
        source: serde_yml::Error,
    },

    #[error("state patch produced an invalid world state: {0}")]
    InvalidPatch(serde_yml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The complete state of one session's world and story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Free-form facts about the player, opaque to the engine.
    #[serde(default)]
    pub player: BTreeMap<String, Value>,

    /// Free-form facts about the world, opaque to the engine.
    #[serde(default)]
    pub world: BTreeMap<String, Value>,

    /// Story progression the engine does interpret.
    pub story: StoryState,

    /// Bookkeeping metadata.
    pub meta: Meta,

    /// Forward-compatibility extension point for unknown top-level keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Story progression state.
///
/// Invariant at every quiescent point: `choices.len() == chapters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryState {
    /// Number of accepted choices, each of which produced a chapter.
    pub chapters: u32,

    /// Every accepted choice, in the order the chapters were created.
    #[serde(default)]
    pub choices: Vec<String>,

    /// Identifiers of endings this session has reached.
    #[serde(default)]
    pub endings_seen: BTreeSet<String>,
}

/// Session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub created: DateTime<Utc>,
    pub last_saved: DateTime<Utc>,
    pub version: String,
}

impl WorldState {
    /// Create the default state for a brand-new session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            player: BTreeMap::new(),
            world: BTreeMap::new(),
            story: StoryState {
                chapters: 0,
                choices: Vec::new(),
                endings_seen: BTreeSet::new(),
            },
            meta: Meta {
                created: now,
                last_saved: now,
                version: STATE_VERSION.to_string(),
            },
            extra: BTreeMap::new(),
        }
    }

    /// Apply an accepted choice, producing the successor state.
    ///
    /// Pure with respect to storage; the caller persists the result.
    #[must_use]
    pub fn apply_choice(mut self, choice: impl Into<String>) -> Self {
        self.story.choices.push(choice.into());
        self.story.chapters += 1;
        self
    }

    /// Record that an ending has been seen.
    pub fn record_ending(&mut self, ending_id: impl Into<String>) {
        self.story.endings_seen.insert(ending_id.into());
    }

    /// Deep-merge an arbitrary patch into this state.
    ///
    /// Map values merge recursively; anything else replaces wholesale.
    /// A patch that breaks the typed schema is rejected and the state is
    /// left untouched.
    pub fn apply_patch(&mut self, patch: Value) -> Result<(), StateError> {
        let mut value = serde_yml::to_value(&*self).map_err(StateError::InvalidPatch)?;
        deep_merge(&mut value, patch);
        let patched: WorldState =
            serde_yml::from_value(value).map_err(StateError::InvalidPatch)?;
        *self = patched;
        Ok(())
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively merge `patch` into `target`.
///
/// When both sides are mappings the merge descends key by key; any
/// non-mapping patch value replaces the target value wholesale.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Mapping(target_map), Value::Mapping(patch_map)) => {
            for (key, value) in patch_map {
                match target_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Durable storage for world state, one `world.yaml` per namespace.
#[derive(Debug, Clone)]
pub struct WorldStateStore {
    saves_dir: PathBuf,
}

impl WorldStateStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            saves_dir: config.saves_dir().to_path_buf(),
        }
    }

    fn state_path(&self, namespace: &Namespace) -> PathBuf {
        namespace.dir(&self.saves_dir).join(WORLD_STATE_FILE)
    }

    /// Create and persist the default state for a new namespace.
    pub async fn initialize(&self, namespace: &Namespace) -> Result<WorldState, StateError> {
        let mut state = WorldState::new();
        self.save(namespace, &mut state).await?;
        info!(namespace = %namespace, "initialized world state");
        Ok(state)
    }

    /// Load the state for a namespace.
    ///
    /// A missing file is `NotFound`; an unparseable file is `Corrupt`.
    /// Defaults are never substituted for an existing namespace.
    pub async fn load(&self, namespace: &Namespace) -> Result<WorldState, StateError> {
        let path = self.state_path(namespace);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(namespace.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let state = serde_yml::from_str(&content).map_err(|source| StateError::Corrupt {
            namespace: namespace.clone(),
            source,
        })?;
        debug!(namespace = %namespace, "loaded world state");
        Ok(state)
    }

    /// Persist the state for a namespace.
    ///
    /// Stamps `meta.last_saved`, then writes via a temporary file and
    /// rename so the previous save survives a crash mid-write.
    pub async fn save(
        &self,
        namespace: &Namespace,
        state: &mut WorldState,
    ) -> Result<(), StateError> {
        let dir = namespace.dir(&self.saves_dir);
        fs::create_dir_all(&dir).await?;

        state.meta.last_saved = Utc::now();
        let content = serde_yml::to_string(state).map_err(|source| StateError::Corrupt {
            namespace: namespace.clone(),
            source,
        })?;

        let path = self.state_path(namespace);
        let tmp = dir.join(format!("{WORLD_STATE_FILE}.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        debug!(namespace = %namespace, "saved world state");
        Ok(())
    }

    /// Read only the `meta` block of a namespace's state.
    pub async fn peek_meta(&self, namespace: &Namespace) -> Result<Meta, StateError> {
        let path = self.state_path(namespace);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(namespace.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        #[derive(Deserialize)]
        struct Partial {
            meta: Meta,
        }

        let partial: Partial =
            serde_yml::from_str(&content).map_err(|source| StateError::Corrupt {
                namespace: namespace.clone(),
                source,
            })?;
        Ok(partial.meta)
    }

    /// Find the namespace with the greatest `meta.last_saved`.
    ///
    /// Selection is by the saved timestamp, never directory mtime, so it
    /// stays correct across save-file restores. Unreadable entries are
    /// skipped with a warning.
    pub async fn most_recent(&self) -> Result<Option<Namespace>, StateError> {
        let mut entries = match fs::read_dir(&self.saves_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut best: Option<(DateTime<Utc>, Namespace)> = None;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let namespace = Namespace::from_id(entry.file_name().to_string_lossy());
            match self.peek_meta(&namespace).await {
                Ok(meta) => {
                    if best
                        .as_ref()
                        .map(|(saved, _)| meta.last_saved > *saved)
                        .unwrap_or(true)
                    {
                        best = Some((meta.last_saved, namespace));
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "skipping unreadable save");
                }
            }
        }

        Ok(best.map(|(_, namespace)| namespace))
    }
}
