//! Builds each frame: transcript lines, the history picker, and the input box.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use super::{App, Mode, PickerState, TranscriptCell};
use crate::core::message::{Message, Role};

pub fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(frame.area());

    match &app.mode {
        Mode::Picker(picker) => draw_picker(frame, app, picker, chunks[0]),
        _ => draw_transcript(frame, app, chunks[0]),
    }
    draw_input(frame, app, chunks[1]);
}

fn title(app: &App) -> String {
    match app.mode {
        Mode::Live => format!("parley · {}", app.endpoint_name),
        Mode::Picker(_) => format!("parley · {} · saved conversations", app.endpoint_name),
        Mode::Viewing => format!("parley · {} · viewing", app.endpoint_name),
    }
}

fn draw_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let lines = transcript_lines(app);
    let available_height = area.height.saturating_sub(1);
    let max_offset = (lines.len() as u16).saturating_sub(available_height);
    let offset = if app.auto_scroll {
        max_offset
    } else {
        app.scroll_offset.min(max_offset)
    };

    let paragraph = Paragraph::new(lines)
        .block(Block::default().title(title(app)))
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    frame.render_widget(paragraph, area);
}

pub fn transcript_lines(app: &App) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    for cell in &app.transcript {
        match cell {
            TranscriptCell::Notice(text) => {
                lines.push(Line::from(Span::styled(
                    text.as_str(),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
                lines.push(Line::from(""));
            }
            TranscriptCell::Turn(message) => {
                message_lines(message, &mut lines);
                lines.push(Line::from(""));
            }
        }
    }
    lines
}

pub fn transcript_line_count(app: &App) -> usize {
    transcript_lines(app).len()
}

fn message_lines<'a>(message: &'a Message, lines: &mut Vec<Line<'a>>) {
    match message.role {
        Role::User => {
            lines.push(Line::from(vec![
                Span::styled(
                    "You: ",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(message.content.as_str(), Style::default().fg(Color::Cyan)),
            ]));
        }
        Role::Assistant => {
            for content_line in message.content.lines() {
                lines.push(Line::from(Span::styled(
                    content_line,
                    Style::default().fg(Color::White),
                )));
            }
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    lines.push(Line::from(Span::styled(
                        format!("⚙ {}({})", call.function.name, call.function.arguments),
                        Style::default()
                            .fg(Color::Magenta)
                            .add_modifier(Modifier::DIM),
                    )));
                }
            }
        }
        Role::Tool => {
            lines.push(Line::from(Span::styled(
                format!("tool ▸ {}", message.content),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
}

fn draw_picker(frame: &mut Frame, app: &App, picker: &PickerState, area: Rect) {
    let mut lines = Vec::new();
    if picker.entries.is_empty() {
        lines.push(Line::from(Span::styled(
            "No saved conversations yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for (index, entry) in picker.entries.iter().enumerate() {
        let marker = if index == picker.selected { "▸ " } else { "  " };
        let preview: String = entry.user_message.chars().take(50).collect();
        let style = if index == picker.selected {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{marker}{}  {preview}",
                entry.created_at.format("%Y-%m-%d %H:%M")
            ),
            style,
        )));
    }

    let paragraph = Paragraph::new(lines).block(Block::default().title(title(app)));
    frame.render_widget(paragraph, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let (text, hint, editable) = match &app.mode {
        Mode::Live => (
            app.input.as_str(),
            "Type your message (Enter to send, Ctrl+H history, Ctrl+C quit)",
            true,
        ),
        Mode::Picker(_) => ("", "Up/Down to select, Enter to view, Esc to cancel", false),
        Mode::Viewing => (
            "",
            "Viewing a saved conversation — Ctrl+N starts a new chat",
            false,
        ),
    };
    let style = if editable {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let input = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(hint))
        .wrap(Wrap { trim: true });
    frame.render_widget(input, area);

    if editable {
        frame.set_cursor_position((
            area.x + app.input.chars().count() as u16 + 1,
            area.y + 1,
        ));
    }
}
