//! Main application state and key handling.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use fabula_core::{Session, QUIT_CHOICE};

/// Main application state.
pub struct App {
    pub session: Session,
    pub chapter_text: String,
    pub choices: Vec<String>,
    pub selected: usize,
    pub scroll: u16,
    pub status: Option<String>,
    /// Choice the player just confirmed, consumed by the main loop.
    pub pending_choice: Option<String>,
    pub should_quit: bool,
    /// The story reached its ending; the next key press exits.
    pub ended: bool,
}

impl App {
    pub async fn new(session: Session) -> Self {
        let mut app = Self {
            session,
            chapter_text: String::new(),
            choices: Vec::new(),
            selected: 0,
            scroll: 0,
            status: None,
            pending_choice: None,
            should_quit: false,
            ended: false,
        };
        app.refresh().await;
        app
    }

    /// Re-read the current chapter and the choices that follow it.
    pub async fn refresh(&mut self) {
        match self.session.current_text().await {
            Ok(text) => self.chapter_text = text,
            Err(e) => self.status = Some(format!("Could not read chapter: {e}")),
        }
        self.choices = self.session.current_choices().await;
        self.selected = 0;
        self.scroll = 0;
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.ended {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected > 0 {
                    self.selected -= 1;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.choices.len() {
                    self.selected += 1;
                }
            }
            KeyCode::PageUp => {
                self.scroll = self.scroll.saturating_sub(5);
            }
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_add(5);
            }
            KeyCode::Enter => {
                if let Some(choice) = self.choices.get(self.selected) {
                    self.pending_choice = Some(choice.clone());
                }
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.pending_choice = Some(QUIT_CHOICE.to_string());
            }
            _ => {}
        }
    }
}
