//! Testing utilities for the fiction engine.
//!
//! `MockNarrator` stands in for the text-generation service with
//! scripted replies, so session flows can be tested deterministically
//! and without network access.

use crate::narrate::{GenerationOptions, NarrateError, Narrator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted reply from the mock narrator.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Succeed with this text.
    Text(String),
    /// Fail with a generation error carrying this description.
    Failure(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn failure(description: impl Into<String>) -> Self {
        ScriptedReply::Failure(description.into())
    }
}

/// A narrator that returns scripted replies in order.
///
/// Replies are consumed one per `generate` call; once the script is
/// exhausted, a fixed fallback text is returned (so a test that makes
/// one extra call fails on content, not on a panic). Every prompt
/// received is recorded for assertion.
pub struct MockNarrator {
    script: Mutex<VecDeque<ScriptedReply>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

/// Fallback text returned once the script runs out.
pub const EXHAUSTED_REPLY: &str = "The narrator has no more scripted replies.";

impl MockNarrator {
    /// Create a mock with the given script.
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that replies with each text in order.
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| ScriptedReply::text(*t)).collect())
    }

    /// Create a mock whose calls fail with the given description.
    ///
    /// The script holds enough failures to cover any realistic test.
    pub fn failing(description: impl Into<String>) -> Self {
        let description = description.into();
        Self::new(
            (0..64)
                .map(|_| ScriptedReply::failure(description.clone()))
                .collect(),
        )
    }

    /// Append a reply to the script. Callable while shared.
    pub fn push(&self, reply: ScriptedReply) {
        lock(&self.script).push_back(reply);
    }

    /// Handle onto the recorded prompts, usable after the mock has been
    /// moved behind an `Arc<dyn Narrator>`.
    pub fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Narrator for MockNarrator {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, NarrateError> {
        lock(&self.prompts).push(prompt.to_string());

        match lock(&self.script).pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(description)) => {
                Err(NarrateError::Generation(description))
            }
            None => Ok(EXHAUSTED_REPLY.to_string()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_fallback() {
        let mock = MockNarrator::with_texts(&["one", "two"]);
        let options = GenerationOptions::default();

        assert_eq!(mock.generate("p1", &options).await.unwrap(), "one");
        assert_eq!(mock.generate("p2", &options).await.unwrap(), "two");
        assert_eq!(
            mock.generate("p3", &options).await.unwrap(),
            EXHAUSTED_REPLY
        );
        assert_eq!(mock.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mock = MockNarrator::new(vec![
            ScriptedReply::text("fine"),
            ScriptedReply::failure("boom"),
        ]);
        let options = GenerationOptions::default();

        assert!(mock.generate("a", &options).await.is_ok());
        let err = mock.generate("b", &options).await.unwrap_err();
        assert!(matches!(err, NarrateError::Generation(d) if d == "boom"));
    }

    #[tokio::test]
    async fn test_failing_mock_fails_repeatedly() {
        let mock = MockNarrator::failing("down");
        let options = GenerationOptions::default();

        for _ in 0..3 {
            assert!(mock.generate("p", &options).await.is_err());
        }
    }
}
