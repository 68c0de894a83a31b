//! Engine configuration.
//!
//! Every component takes its configuration at construction instead of
//! reading ambient globals, so tests can run against isolated storage
//! roots concurrently.

use std::path::{Path, PathBuf};

/// Configuration for the fiction engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding one subdirectory per session.
    saves_dir: PathBuf,

    /// Chapter count at which the story is forced to end.
    max_chapters: u32,

    /// Maximum number of choices to present per chapter.
    max_choices: usize,

    /// Whether to persist state after each accepted choice.
    autosave: bool,

    /// Model override passed to the narrator (client default if unset).
    model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            saves_dir: PathBuf::from("saves"),
            max_chapters: 50,
            max_choices: 4,
            autosave: true,
            model: None,
        }
    }
}

impl EngineConfig {
    /// Set the saves root directory.
    pub fn with_saves_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.saves_dir = dir.into();
        self
    }

    /// Set the chapter ceiling that ends the story.
    pub fn with_max_chapters(mut self, max: u32) -> Self {
        self.max_chapters = max;
        self
    }

    /// Set the maximum number of choices presented per chapter.
    pub fn with_max_choices(mut self, max: usize) -> Self {
        self.max_choices = max.max(1);
        self
    }

    /// Enable or disable autosave after each accepted choice.
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Set the model name passed to the narrator.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn saves_dir(&self) -> &Path {
        &self.saves_dir
    }

    pub fn max_chapters(&self) -> u32 {
        self.max_chapters
    }

    pub fn max_choices(&self) -> usize {
        self.max_choices
    }

    pub fn autosave(&self) -> bool {
        self.autosave
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.saves_dir(), Path::new("saves"));
        assert_eq!(config.max_chapters(), 50);
        assert_eq!(config.max_choices(), 4);
        assert!(config.autosave());
        assert!(config.model().is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_saves_dir("/tmp/stories")
            .with_max_chapters(2)
            .with_max_choices(6)
            .with_autosave(false)
            .with_model("qwen2.5");

        assert_eq!(config.saves_dir(), Path::new("/tmp/stories"));
        assert_eq!(config.max_chapters(), 2);
        assert_eq!(config.max_choices(), 6);
        assert!(!config.autosave());
        assert_eq!(config.model(), Some("qwen2.5"));
    }

    #[test]
    fn test_max_choices_floor() {
        let config = EngineConfig::default().with_max_choices(0);
        assert_eq!(config.max_choices(), 1);
    }
}
