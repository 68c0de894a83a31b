//! Choice-branching interactive fiction engine with an AI narrator.
//!
//! This crate provides:
//! - Persistent world/story state with an append-only chapter log
//! - A FIFO task queue for narrator invocations with status tracking
//! - Session lifecycle: create, load, advance, save
//! - Narrator agents for story continuation, cross-references, and lore
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fabula_core::{EngineConfig, LlmNarrator, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let narrator = Arc::new(LlmNarrator::from_env()?);
//!     let mut session = Session::new(EngineConfig::default(), narrator).await?;
//!
//!     println!("{}", session.current_text().await?);
//!     session.advance("open the door").await?;
//!     Ok(())
//! }
//! ```

pub mod chapters;
pub mod config;
pub mod links;
pub mod namespace;
pub mod narrate;
pub mod queue;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use chapters::{ChapterError, ChapterLog, ChapterRef};
pub use config::EngineConfig;
pub use links::LinkIndex;
pub use namespace::Namespace;
pub use narrate::{
    GenerationOptions, LinkAgent, LlmNarrator, LoreAgent, NarrateError, Narrator, StoryAgent,
};
pub use queue::{QueueMode, QueueStatus, StopHandle, TaskId, TaskQueue, TaskRecord, TaskStatus};
pub use session::{Session, SessionError, QUIT_CHOICE};
pub use state::{StateError, WorldState, WorldStateStore};
pub use testing::MockNarrator;
