//! Session lifecycle: create, load, advance, save.
//!
//! A `Session` exclusively owns one namespace's world state and chapter
//! log for its lifetime. Callers must not operate two sessions on the
//! same namespace concurrently; no locking is provided.

use crate::chapters::{ChapterError, ChapterLog, ChapterRef};
use crate::config::EngineConfig;
use crate::links::LinkIndex;
use crate::namespace::Namespace;
use crate::narrate::{LinkAgent, LoreAgent, NarrateError, Narrator, StoryAgent};
use crate::queue::{QueueStatus, TaskQueue, TaskStatus};
use crate::state::{StateError, WorldState, WorldStateStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

/// The choice value that ends the interaction loop.
///
/// The front end exits when the player selects it; the session itself
/// is not marked finished and can be resumed later.
pub const QUIT_CHOICE: &str = "quit";

/// Choice offered when choice generation fails or returns nothing.
const FALLBACK_CHOICE: &str = "Continue...";

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("chapter error: {0}")]
    Chapter(#[from] ChapterError),

    #[error("generation error: {0}")]
    Generation(#[from] NarrateError),

    #[error("no saved sessions found")]
    NoSaves,

    #[error("usage error: {0}")]
    Usage(String),
}

/// One interactive fiction session.
pub struct Session {
    namespace: Namespace,
    config: EngineConfig,
    store: WorldStateStore,
    log: ChapterLog,
    links: LinkIndex,
    queue: TaskQueue,
    story: StoryAgent,
    link_agent: LinkAgent,
    lore_agent: LoreAgent,
    state: WorldState,
    current: ChapterRef,
}

impl Session {
    /// Create a new session with a freshly generated opening chapter.
    ///
    /// Fails fatally if the opening generation, the first chapter
    /// write, or the state save fails; the half-created namespace
    /// directory is removed so no chapterless save is left behind.
    pub async fn new(
        config: EngineConfig,
        narrator: Arc<dyn Narrator>,
    ) -> Result<Self, SessionError> {
        let namespace = Namespace::generate();
        let store = WorldStateStore::new(&config);
        let log = ChapterLog::new(&config);
        let story = StoryAgent::new(narrator.clone(), &config);

        let mut state = store.initialize(&namespace).await?;

        let bootstrap = async {
            let opening = story.open().await?;
            let current = log.append(&namespace, &opening).await?;
            store.save(&namespace, &mut state).await?;
            Ok::<ChapterRef, SessionError>(current)
        };

        let current = match bootstrap.await {
            Ok(current) => current,
            Err(e) => {
                let dir = namespace.dir(config.saves_dir());
                if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                    warn!(namespace = %namespace, error = %cleanup,
                        "failed to clean up after aborted session creation");
                }
                return Err(e);
            }
        };

        info!(namespace = %namespace, "created new session");
        Ok(Self::assemble(
            namespace, config, store, log, narrator, state, current,
        ))
    }

    /// Load a saved session.
    ///
    /// With no id, picks the namespace with the most recent
    /// `meta.last_saved`. Fails with `NoSaves` when nothing has ever
    /// been saved; missing or corrupt state and missing chapters
    /// surface from the underlying stores.
    pub async fn load(
        config: EngineConfig,
        narrator: Arc<dyn Narrator>,
        id: Option<&str>,
    ) -> Result<Self, SessionError> {
        let store = WorldStateStore::new(&config);
        let log = ChapterLog::new(&config);

        let namespace = match id {
            Some(id) => Namespace::from_id(id),
            None => store.most_recent().await?.ok_or(SessionError::NoSaves)?,
        };

        let state = store.load(&namespace).await?;
        let current = log.latest(&namespace).await?;

        info!(namespace = %namespace, chapter = current.seq(), "loaded session");
        Ok(Self::assemble(
            namespace, config, store, log, narrator, state, current,
        ))
    }

    fn assemble(
        namespace: Namespace,
        config: EngineConfig,
        store: WorldStateStore,
        log: ChapterLog,
        narrator: Arc<dyn Narrator>,
        state: WorldState,
        current: ChapterRef,
    ) -> Self {
        Self {
            links: LinkIndex::new(&config),
            queue: TaskQueue::new(),
            story: StoryAgent::new(narrator.clone(), &config),
            link_agent: LinkAgent::new(narrator.clone(), &config),
            lore_agent: LoreAgent::new(narrator, &config),
            namespace,
            config,
            store,
            log,
            state,
            current,
        }
    }

    /// Advance the story by one accepted choice.
    ///
    /// Generation and chapter-write failures are fatal to the call and
    /// leave the session state untouched. The link refresh afterwards
    /// is best-effort: its failure is logged, never propagated.
    pub async fn advance(&mut self, choice: &str) -> Result<(), SessionError> {
        let choice = choice.trim();
        if choice.is_empty() {
            return Err(SessionError::Usage("cannot advance on an empty choice".into()));
        }

        let current_text = self.log.read(&self.current).await?;
        let next_text = self.story.continue_story(&current_text, choice).await?;

        let next_state = self.state.clone().apply_choice(choice);
        let chapter = self.log.append(&self.namespace, &next_text).await?;

        // Only now is the new chapter durable; commit in memory.
        self.state = next_state;
        self.current = chapter;

        self.refresh_links(&next_text).await;

        if self.config.autosave() {
            self.save().await?;
        }

        info!(namespace = %self.namespace, chapter = self.current.seq(),
            "advanced story");
        Ok(())
    }

    /// Refresh the cross-reference index for the newest chapter.
    ///
    /// Runs through the task queue so a generation failure is isolated
    /// in the task's record, where it is logged and dropped.
    async fn refresh_links(&mut self, chapter_text: &str) {
        let agent = self.link_agent.clone();
        let text = chapter_text.to_string();
        let stem = self.current.file_stem();

        let task_id = self.queue.enqueue(
            move |_payload| async move {
                let refs = agent.extract(&text).await?;
                Ok(serde_json::to_value(refs)?)
            },
            serde_json::json!({ "chapter": stem }),
        );
        self.queue.run_all().await;

        let Some(record) = self.queue.result(&task_id) else {
            return;
        };
        match record.status {
            TaskStatus::Completed => {
                let refs: Vec<String> = record
                    .result
                    .clone()
                    .and_then(|value| serde_json::from_value(value).ok())
                    .unwrap_or_default();
                let stem = self.current.file_stem();
                if let Err(e) = self.links.update(&self.namespace, &stem, refs).await {
                    warn!(namespace = %self.namespace, chapter = %stem, error = %e,
                        "failed to write link index");
                }
            }
            _ => {
                warn!(namespace = %self.namespace, task_id = %record.id,
                    error = record.error.as_deref().unwrap_or("unknown"),
                    "link refresh failed");
            }
        }
    }

    /// Persist the world state.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        self.store.save(&self.namespace, &mut self.state).await?;
        Ok(())
    }

    /// Whether the story has reached its configured chapter ceiling.
    ///
    /// Callers must check this before `advance`; the session does not
    /// reject advances past the ceiling itself.
    pub fn is_finished(&self) -> bool {
        self.state.story.chapters >= self.config.max_chapters()
    }

    /// Text of the current (highest-numbered) chapter.
    pub async fn current_text(&self) -> Result<String, SessionError> {
        Ok(self.log.read(&self.current).await?)
    }

    /// Choices available to the player right now.
    ///
    /// Generation-backed and best-effort: on failure the fallback list
    /// is returned. The quit sentinel is always the last entry.
    pub async fn current_choices(&self) -> Vec<String> {
        let text = match self.log.read(&self.current).await {
            Ok(text) => text,
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e,
                    "could not read current chapter for choices");
                String::new()
            }
        };

        let mut choices = match self.story.choices(&text, &self.state).await {
            Ok(choices) if !choices.is_empty() => choices,
            Ok(_) => vec![FALLBACK_CHOICE.to_string()],
            Err(e) => {
                warn!(namespace = %self.namespace, error = %e,
                    "choice generation failed");
                vec![FALLBACK_CHOICE.to_string()]
            }
        };
        choices.push(QUIT_CHOICE.to_string());
        choices
    }

    /// Lore about a topic, grounded in the current world facts.
    ///
    /// Best-effort: failures are logged and reported as `None`.
    pub async fn lore(&self, topic: &str) -> Option<String> {
        match self.lore_agent.lore(topic, &self.state).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(namespace = %self.namespace, topic, error = %e,
                    "lore lookup failed");
                None
            }
        }
    }

    /// Record that an ending has been seen.
    ///
    /// Persisted on the next save.
    pub fn record_ending(&mut self, ending_id: impl Into<String>) {
        self.state.record_ending(ending_id);
    }

    /// The session id.
    pub fn id(&self) -> &str {
        self.namespace.as_str()
    }

    /// The session's storage namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The current world state.
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Reference to the current chapter.
    pub fn current_chapter(&self) -> &ChapterRef {
        &self.current
    }

    /// Snapshot of the task queue.
    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// The configuration this session runs with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WORLD_STATE_FILE;
    use crate::testing::{MockNarrator, ScriptedReply};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> EngineConfig {
        EngineConfig::default().with_saves_dir(dir.path())
    }

    /// Each advance consumes two scripted replies: chapter text, then
    /// the link extraction.
    fn advance_script(chapter: &str) -> [ScriptedReply; 2] {
        [
            ScriptedReply::text(chapter),
            ScriptedReply::text("- someone\n- somewhere"),
        ]
    }

    #[tokio::test]
    async fn test_new_creates_seed_chapter_only() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["Chapter 1 text"]);
        let session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        let ns_dir = session.namespace().dir(dir.path());
        let chapter_1 = ns_dir.join("chapter_1.md");
        assert!(chapter_1.exists());
        assert_eq!(std::fs::read_to_string(chapter_1).unwrap(), "Chapter 1 text");
        assert!(ns_dir.join(WORLD_STATE_FILE).exists());

        // The seed chapter applies no choice.
        assert_eq!(session.state().story.chapters, 0);
        assert!(session.state().story.choices.is_empty());
        assert_eq!(session.current_text().await.unwrap(), "Chapter 1 text");
    }

    #[tokio::test]
    async fn test_new_failure_leaves_no_save_behind() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::failing("model offline");

        let result = Session::new(config_in(&dir), Arc::new(narrator)).await;
        assert!(matches!(result, Err(SessionError::Generation(_))));

        // No namespace directory survives a failed creation.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .map(|entries| entries.collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_advance_appends_chapter_and_choice() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["Chapter 1 text"]);
        for reply in advance_script("Chapter 2 text") {
            narrator.push(reply);
        }
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        session.advance("open the door").await.unwrap();

        assert_eq!(session.state().story.chapters, 1);
        assert_eq!(session.state().story.choices, vec!["open the door"]);
        assert_eq!(session.current_chapter().seq(), 2);
        assert_eq!(session.current_text().await.unwrap(), "Chapter 2 text");

        let chapter_2 = session.namespace().dir(dir.path()).join("chapter_2.md");
        assert_eq!(std::fs::read_to_string(chapter_2).unwrap(), "Chapter 2 text");
    }

    #[tokio::test]
    async fn test_choice_invariant_after_each_advance() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        for i in 0..4 {
            for reply in advance_script(&format!("chapter {}", i + 2)) {
                narrator.push(reply);
            }
        }
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        for (i, choice) in ["a", "b", "c", "d"].iter().enumerate() {
            session.advance(choice).await.unwrap();
            let story = &session.state().story;
            assert_eq!(story.choices.len(), story.chapters as usize);
            assert_eq!(story.chapters as usize, i + 1);
        }
    }

    #[tokio::test]
    async fn test_advance_generation_failure_is_fatal_and_clean() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::failure("model offline"));
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        let result = session.advance("open the door").await;
        assert!(matches!(result, Err(SessionError::Generation(_))));

        // State and chapter log are unchanged.
        assert_eq!(session.state().story.chapters, 0);
        assert!(session.state().story.choices.is_empty());
        assert_eq!(session.current_chapter().seq(), 1);
        let chapter_2 = session.namespace().dir(dir.path()).join("chapter_2.md");
        assert!(!chapter_2.exists());
    }

    #[tokio::test]
    async fn test_advance_link_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::text("Chapter 2 text"));
        narrator.push(ScriptedReply::failure("link model offline"));
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        session.advance("press on").await.unwrap();

        assert_eq!(session.state().story.chapters, 1);
        let status = session.queue_status();
        assert_eq!(status.failed, 1);
        assert_eq!(status.completed, 0);
    }

    #[tokio::test]
    async fn test_advance_writes_link_index() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::text("Chapter 2 text"));
        narrator.push(ScriptedReply::text("- the lighthouse\n- Wren"));
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        session.advance("walk to the shore").await.unwrap();

        let links = LinkIndex::new(session.config());
        let index = links.load(session.namespace()).await.unwrap();
        assert_eq!(index["chapter_2"], vec!["the lighthouse", "Wren"]);
    }

    #[tokio::test]
    async fn test_advance_empty_choice_is_usage_error() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        let result = session.advance("   ").await;
        assert!(matches!(result, Err(SessionError::Usage(_))));
    }

    #[tokio::test]
    async fn test_autosave_round_trips_through_load() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        for reply in advance_script("Chapter 2 text") {
            narrator.push(reply);
        }
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();
        session.advance("open the door").await.unwrap();
        let id = session.id().to_string();

        let reloaded = Session::load(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&[])),
            Some(&id),
        )
        .await
        .unwrap();

        assert_eq!(reloaded.state(), session.state());
        assert_eq!(reloaded.current_chapter().seq(), 2);
        assert_eq!(reloaded.current_text().await.unwrap(), "Chapter 2 text");
    }

    #[tokio::test]
    async fn test_load_without_id_picks_most_recent() {
        let dir = TempDir::new().unwrap();

        let first = Session::new(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&["first story"])),
        )
        .await
        .unwrap();
        let second = Session::new(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&["second story"])),
        )
        .await
        .unwrap();

        let loaded = Session::load(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&[])),
            None,
        )
        .await
        .unwrap();

        assert_eq!(loaded.id(), second.id());
        assert_ne!(loaded.id(), first.id());
    }

    #[tokio::test]
    async fn test_load_with_no_saves() {
        let dir = TempDir::new().unwrap();
        let result = Session::load(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&[])),
            None,
        )
        .await;
        assert!(matches!(result, Err(SessionError::NoSaves)));
    }

    #[tokio::test]
    async fn test_load_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = Session::load(
            config_in(&dir),
            Arc::new(MockNarrator::with_texts(&[])),
            Some("no-such-session"),
        )
        .await;
        assert!(matches!(
            result,
            Err(SessionError::State(StateError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_finished_exactly_at_ceiling() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        for chapter in ["two", "three"] {
            for reply in advance_script(chapter) {
                narrator.push(reply);
            }
        }
        let config = config_in(&dir).with_max_chapters(2);
        let mut session = Session::new(config, Arc::new(narrator)).await.unwrap();

        assert!(!session.is_finished());
        session.advance("first").await.unwrap();
        assert!(!session.is_finished());
        session.advance("second").await.unwrap();
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_current_choices_end_with_quit() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::text("Go north\nGo south"));
        let session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        let choices = session.current_choices().await;
        assert_eq!(choices, vec!["Go north", "Go south", QUIT_CHOICE]);
    }

    #[tokio::test]
    async fn test_current_choices_fall_back_on_failure() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::failure("model offline"));
        let session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        let choices = session.current_choices().await;
        assert_eq!(choices, vec![FALLBACK_CHOICE, QUIT_CHOICE]);
    }

    #[tokio::test]
    async fn test_lore_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        narrator.push(ScriptedReply::text("An old beacon."));
        narrator.push(ScriptedReply::failure("model offline"));
        let session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        assert_eq!(
            session.lore("the lighthouse").await.as_deref(),
            Some("An old beacon.")
        );
        assert_eq!(session.lore("the lighthouse").await, None);
    }

    #[tokio::test]
    async fn test_record_ending_persists() {
        let dir = TempDir::new().unwrap();
        let narrator = MockNarrator::with_texts(&["seed"]);
        let mut session = Session::new(config_in(&dir), Arc::new(narrator))
            .await
            .unwrap();

        session.record_ending("the long sleep");
        session.save().await.unwrap();
        let id = session.id().to_string();

        let reloaded = Session::load(
            session.config().clone(),
            Arc::new(MockNarrator::with_texts(&[])),
            Some(&id),
        )
        .await
        .unwrap();
        assert!(reloaded
            .state()
            .story
            .endings_seen
            .contains("the long sleep"));
    }
}
