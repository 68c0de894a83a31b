//! Cross-reference extraction for the link index.

use super::{parse_lines, GenerationOptions, NarrateError, Narrator};
use crate::config::EngineConfig;
use std::sync::Arc;

/// Upper bound on references extracted per chapter.
const MAX_REFS: usize = 16;

/// Extracts the entities a chapter introduces or resolves.
#[derive(Clone)]
pub struct LinkAgent {
    narrator: Arc<dyn Narrator>,
    options: GenerationOptions,
}

impl LinkAgent {
    pub fn new(narrator: Arc<dyn Narrator>, config: &EngineConfig) -> Self {
        let mut options = GenerationOptions::default()
            .with_system(include_str!("prompts/links_system.txt"))
            .with_temperature(0.3)
            .with_max_tokens(512);

        if let Some(model) = config.model() {
            options = options.with_model(model);
        }

        Self { narrator, options }
    }

    /// Extract cross-references from one chapter's text.
    pub async fn extract(&self, chapter_text: &str) -> Result<Vec<String>, NarrateError> {
        let prompt = format!(
            "List the continuity-relevant references in this chapter:\n\n{chapter_text}"
        );
        let response = self.narrator.generate(&prompt, &self.options).await?;
        Ok(parse_lines(&response, MAX_REFS))
    }
}
