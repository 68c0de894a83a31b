//! Story continuation and choice generation.

use super::{parse_lines, GenerationOptions, NarrateError, Narrator};
use crate::config::EngineConfig;
use crate::state::WorldState;
use std::sync::Arc;

/// Sentinel choice used to request the opening chapter.
pub const BEGIN_CHOICE: &str = "begin";

/// Generates chapter text and the choices that follow from it.
#[derive(Clone)]
pub struct StoryAgent {
    narrator: Arc<dyn Narrator>,
    chapter_options: GenerationOptions,
    choice_options: GenerationOptions,
    max_choices: usize,
}

impl StoryAgent {
    pub fn new(narrator: Arc<dyn Narrator>, config: &EngineConfig) -> Self {
        let mut chapter_options = GenerationOptions::default()
            .with_system(include_str!("prompts/story_system.txt"));
        let mut choice_options = GenerationOptions::default()
            .with_system(include_str!("prompts/choices_system.txt"))
            .with_max_tokens(256);

        if let Some(model) = config.model() {
            chapter_options = chapter_options.with_model(model);
            choice_options = choice_options.with_model(model);
        }

        Self {
            narrator,
            chapter_options,
            choice_options,
            max_choices: config.max_choices(),
        }
    }

    /// Generate the opening chapter of a new story.
    pub async fn open(&self) -> Result<String, NarrateError> {
        self.continue_story("", BEGIN_CHOICE).await
    }

    /// Generate the next chapter from the current text and the choice
    /// the player made.
    pub async fn continue_story(
        &self,
        current_text: &str,
        choice: &str,
    ) -> Result<String, NarrateError> {
        let prompt = if current_text.is_empty() {
            "Begin a new interactive fiction story with its opening chapter.".to_string()
        } else {
            format!(
                "The story so far:\n\n{current_text}\n\n\
                 The player chose: {choice}\n\n\
                 Write the next chapter."
            )
        };

        self.narrator.generate(&prompt, &self.chapter_options).await
    }

    /// Generate the choices available after the current chapter.
    pub async fn choices(
        &self,
        current_text: &str,
        state: &WorldState,
    ) -> Result<Vec<String>, NarrateError> {
        let prompt = format!(
            "The current chapter:\n\n{current_text}\n\n\
             Chapters so far: {}. Recent player choices: {}.\n\n\
             List the player's possible next actions.",
            state.story.chapters,
            recent_choices(state),
        );

        let response = self.narrator.generate(&prompt, &self.choice_options).await?;
        Ok(parse_lines(&response, self.max_choices))
    }
}

/// The last few choices, newest last, for prompt context.
fn recent_choices(state: &WorldState) -> String {
    let recent: Vec<&str> = state
        .story
        .choices
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(String::as_str)
        .collect();
    if recent.is_empty() {
        "none".to_string()
    } else {
        recent.join("; ")
    }
}
