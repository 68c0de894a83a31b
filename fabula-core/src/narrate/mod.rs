//! The generation capability and the agents built on it.
//!
//! Everything that talks to the text-generation service goes through
//! the [`Narrator`] trait: one opaque `generate(prompt, options)` call.
//! The agents layer role-specific prompting on top of it:
//!
//! - [`StoryAgent`] opens and continues the story and proposes choices
//! - [`LinkAgent`] extracts cross-references for the link index
//! - [`LoreAgent`] answers lore queries about the world
//!
//! Transport and model failures surface as [`NarrateError`], never as
//! raw client errors.

mod link;
mod lore;
mod story;

pub use link::LinkAgent;
pub use lore::LoreAgent;
pub use story::{StoryAgent, BEGIN_CHOICE};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the generation capability.
#[derive(Debug, Error)]
pub enum NarrateError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("generation returned empty text")]
    Empty,
}

impl From<llm::Error> for NarrateError {
    fn from(e: llm::Error) -> Self {
        NarrateError::Generation(e.to_string())
    }
}

/// Options for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Model override; the narrator's default if unset.
    pub model: Option<String>,

    /// System prompt establishing the agent's role.
    pub system: Option<String>,

    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: None,
            system: None,
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
        }
    }
}

impl GenerationOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The external text-generation service, consumed behind one call.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, NarrateError>;
}

/// Narrator backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmNarrator {
    client: llm::Client,
}

impl LlmNarrator {
    pub fn new(client: llm::Client) -> Self {
        Self { client }
    }

    /// Build a narrator from `OPENAI_API_KEY` / `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, NarrateError> {
        Ok(Self {
            client: llm::Client::from_env()?,
        })
    }
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, NarrateError> {
        let mut request = llm::Request::from_prompt(prompt)
            .with_temperature(options.temperature)
            .with_top_p(options.top_p)
            .with_max_tokens(options.max_tokens);

        if let Some(ref model) = options.model {
            request = request.with_model(model);
        }
        if let Some(ref system) = options.system {
            request = request.with_system(system);
        }

        let response = self.client.complete(request).await?;
        let text = response.content.trim().to_string();
        if text.is_empty() {
            return Err(NarrateError::Empty);
        }
        Ok(text)
    }
}

/// Parse one item per line out of a model response.
///
/// Tolerates the list dressing models add: bullets, numbering, and the
/// `> ` choice prefix all get stripped.
pub(crate) fn parse_lines(response: &str, max: usize) -> Vec<String> {
    response
        .lines()
        .map(strip_list_markers)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .take(max)
        .collect()
}

fn strip_list_markers(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("> "))
        .unwrap_or(line);

    // Numbered lists: "1. " / "2) "
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}
