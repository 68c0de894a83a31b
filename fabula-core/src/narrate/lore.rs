//! Lore queries about the story's world.

use super::{GenerationOptions, NarrateError, Narrator};
use crate::config::EngineConfig;
use crate::state::WorldState;
use std::sync::Arc;

/// Answers questions about the world's lore in a consistent voice.
#[derive(Clone)]
pub struct LoreAgent {
    narrator: Arc<dyn Narrator>,
    options: GenerationOptions,
}

impl LoreAgent {
    pub fn new(narrator: Arc<dyn Narrator>, config: &EngineConfig) -> Self {
        let mut options = GenerationOptions::default()
            .with_system(include_str!("prompts/lore_system.txt"))
            .with_temperature(0.5)
            .with_max_tokens(1024);

        if let Some(model) = config.model() {
            options = options.with_model(model);
        }

        Self { narrator, options }
    }

    /// Generate lore about a topic, grounded in the known world facts.
    pub async fn lore(&self, topic: &str, state: &WorldState) -> Result<String, NarrateError> {
        let world_facts = serde_yml::to_string(&state.world).unwrap_or_default();
        let prompt = format!(
            "Known world facts:\n{world_facts}\n\
             Tell me about: {topic}"
        );
        self.narrator.generate(&prompt, &self.options).await
    }
}
