//! Rendering for the fiction TUI.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::App;

/// Prefix marking the selected choice.
const CHOICE_PREFIX: &str = "> ";

/// Main render function.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(app.choices.len() as u16 + 2),
        Constraint::Length(1),
    ])
    .split(area);

    render_chapter(frame, app, chunks[0]);
    render_choices(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    if app.ended {
        render_ending_overlay(frame, area);
    }
}

fn render_chapter(frame: &mut Frame, app: &App, area: Rect) {
    let title = format!(
        " Chapter {} · {} ",
        app.session.current_chapter().seq(),
        short_id(app.session.id()),
    );
    let chapter = Paragraph::new(app.chapter_text.as_str())
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0))
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(chapter, area);
}

fn render_choices(frame: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            if i == app.selected {
                Line::from(Span::styled(
                    format!("{CHOICE_PREFIX}{choice}"),
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(format!("  {choice}"))
            }
        })
        .collect();

    let choices = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Choices "));
    frame.render_widget(choices, area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let text = match app.status {
        Some(ref status) => status.clone(),
        None => "↑/↓ select · Enter choose · PgUp/PgDn scroll · q quit".to_string(),
    };
    let bar = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(bar, area);
}

fn render_ending_overlay(frame: &mut Frame, area: Rect) {
    let overlay = centered_rect(40, 5, area);
    frame.render_widget(Clear, overlay);

    let ending = Paragraph::new("The story has reached its end.\n\nPress any key to leave.")
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(" The End "));
    frame.render_widget(ending, overlay);
}

/// A fixed-size rect centered in `area`, clamped to fit.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// First block of a session id, enough to tell saves apart.
fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}
