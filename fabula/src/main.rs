//! Interactive fiction TUI with an AI narrator.
//!
//! Starts a new story by default; `--load` resumes the most recently
//! saved session, `--load <id>` a specific one.

mod app;
mod ui;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fabula_core::{EngineConfig, LlmNarrator, Session, QUIT_CHOICE};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use app::App;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    init_logging()?;

    let narrator = match LlmNarrator::from_env() {
        Ok(narrator) => Arc::new(narrator),
        Err(e) => {
            eprintln!("Error: narrator is not configured: {e}");
            eprintln!("Set OPENAI_API_KEY, or OPENAI_BASE_URL for a local endpoint,");
            eprintln!("in the environment or a .env file.");
            std::process::exit(1);
        }
    };

    let config = config_from_env();

    // Create or resume the session before touching the terminal, so
    // failures print normally.
    let session = match load_request(&args) {
        Some(id) => Session::load(config, narrator, id.as_deref()).await,
        None => Session::new(config, narrator).await,
    };
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: could not start session: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(session = session.id(), "session ready");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, App::new(session).await).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
) -> std::io::Result<()> {
    loop {
        terminal.draw(|f| ui::render(f, &app))?;

        // Process a confirmed choice before polling for the next key.
        if let Some(choice) = app.pending_choice.take() {
            if choice == QUIT_CHOICE {
                app.should_quit = true;
            } else {
                app.set_status("The narrator is writing...");
                terminal.draw(|f| ui::render(f, &app))?;

                match app.session.advance(&choice).await {
                    Ok(()) => {
                        app.status = None;
                        if app.session.is_finished() {
                            app.session.record_ending("final-chapter");
                            if let Err(e) = app.session.save().await {
                                app.set_status(format!("Save failed: {e}"));
                            }
                            app.ended = true;
                        }
                        app.refresh().await;
                    }
                    Err(e) => {
                        app.set_status(format!("The story could not advance: {e}"));
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }
    }
}

/// Whether `--load` was requested, and with which session id.
fn load_request(args: &[String]) -> Option<Option<String>> {
    let position = args.iter().position(|a| a == "--load")?;
    let id = args
        .get(position + 1)
        .filter(|a| !a.starts_with("--"))
        .cloned();
    Some(id)
}

fn config_from_env() -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Ok(dir) = std::env::var("FABULA_SAVES_DIR") {
        config = config.with_saves_dir(dir);
    }
    if let Ok(model) = std::env::var("FABULA_MODEL") {
        config = config.with_model(model);
    }
    config
}

/// Log to a file; the alternate screen owns stdout.
fn init_logging() -> std::io::Result<()> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("fabula.log")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn print_help() {
    println!("fabula - interactive fiction with an AI narrator");
    println!();
    println!("USAGE:");
    println!("  fabula [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help       Show this help message");
    println!("  --load [ID]      Resume a saved session (most recent if no id)");
    println!();
    println!("ENVIRONMENT:");
    println!("  OPENAI_API_KEY     API key for the narrator endpoint");
    println!("  OPENAI_BASE_URL    Custom endpoint (e.g. a local server)");
    println!("  FABULA_SAVES_DIR   Where sessions are stored (default: saves)");
    println!("  FABULA_MODEL       Model name to request");
    println!("  RUST_LOG           Log filter (written to fabula.log)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_request_absent() {
        assert_eq!(load_request(&args(&["fabula"])), None);
    }

    #[test]
    fn test_load_request_without_id() {
        assert_eq!(load_request(&args(&["fabula", "--load"])), Some(None));
    }

    #[test]
    fn test_load_request_with_id() {
        assert_eq!(
            load_request(&args(&["fabula", "--load", "abc-123"])),
            Some(Some("abc-123".to_string()))
        );
    }

    #[test]
    fn test_load_request_ignores_following_flag() {
        assert_eq!(
            load_request(&args(&["fabula", "--load", "--help"])),
            Some(None)
        );
    }
}
