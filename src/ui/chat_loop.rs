//! Main session loop: input handling, turn execution, and history browsing.
//!
//! A submitted prompt runs its whole exchange inline: the loop stops polling
//! for input until the streamed response (or its fallback) completes, so two
//! submissions never interleave within one session.

use std::io;
use std::time::{Duration, Instant};

use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::Terminal;
use tracing::warn;

use super::renderer::ui;
use super::{App, Mode, PickerState, TranscriptCell};
use crate::api::client::{BoxError, Endpoint, EndpointClient};
use crate::core::config::Settings;
use crate::core::history::{flatten_messages, HistoryEntry, HistoryStore, RECENT_LIMIT};
use crate::core::message::Message;
use crate::core::telemetry::TelemetrySink;
use crate::core::turn::{run_turn, SlotId, TaskKind, TurnCanvas};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Canvas backed by the live terminal. The adapters mutate the transcript's
/// turn region through it, and every mutation redraws the frame.
struct TuiCanvas<'a, B: Backend> {
    terminal: &'a mut Terminal<B>,
    app: &'a mut App,
    turn_start: usize,
    slots: Vec<usize>,
    placeholder_shown: bool,
}

impl<'a, B: Backend> TuiCanvas<'a, B> {
    fn new(terminal: &'a mut Terminal<B>, app: &'a mut App, turn_start: usize) -> Self {
        Self {
            terminal,
            app,
            turn_start,
            slots: Vec::new(),
            placeholder_shown: false,
        }
    }

    fn clear_turn_region(&mut self) {
        self.app.transcript.truncate(self.turn_start);
        self.slots.clear();
        self.placeholder_shown = false;
    }

    fn redraw(&mut self) {
        self.app.auto_scroll = true;
        let app = &*self.app;
        let _ = self.terminal.draw(|frame| ui(frame, app));
    }
}

impl<B: Backend> TurnCanvas for TuiCanvas<'_, B> {
    fn placeholder(&mut self, text: &str) {
        self.clear_turn_region();
        self.app.transcript.push(TranscriptCell::Notice(text.to_string()));
        self.placeholder_shown = true;
        self.redraw();
    }

    fn open_slot(&mut self) -> SlotId {
        if self.placeholder_shown {
            self.clear_turn_region();
        }
        self.app
            .transcript
            .push(TranscriptCell::Turn(Message::assistant(String::new())));
        self.slots.push(self.app.transcript.len() - 1);
        SlotId(self.slots.len() - 1)
    }

    fn update_slot(&mut self, slot: SlotId, message: &Message) {
        if let Some(&index) = self.slots.get(slot.0) {
            self.app.transcript[index] = TranscriptCell::Turn(message.clone());
        }
        self.redraw();
    }

    fn replace_all(&mut self, messages: &[Message]) {
        self.clear_turn_region();
        for message in messages {
            self.app
                .transcript
                .push(TranscriptCell::Turn(message.clone()));
        }
        self.redraw();
    }
}

pub async fn run_chat(settings: Settings) -> Result<(), BoxError> {
    let http = reqwest::Client::new();
    let endpoint = EndpointClient::new(
        http.clone(),
        settings.base_url.clone(),
        settings.api_key.clone(),
        settings.endpoint.clone(),
    );
    let label = endpoint.task_label().await;
    let task = TaskKind::classify(&label);
    let history = settings.history_file.clone().map(HistoryStore::new);
    let telemetry = TelemetrySink::new(http, settings.telemetry_url.clone(), settings.endpoint.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(settings.endpoint.clone());
    greet(&mut app, &label, history.is_some());

    let result = session_loop(
        &mut terminal,
        &mut app,
        &endpoint,
        task,
        history.as_ref(),
        &telemetry,
    )
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn greet(app: &mut App, label: &str, persistence: bool) {
    if label.is_empty() {
        app.push_notice("Endpoint task type unknown; assuming plain chat completions.");
    } else {
        app.push_notice(format!("Endpoint task type: {label}"));
    }
    if persistence {
        app.push_notice("Exchanges are saved locally. Press Ctrl+H to browse them.");
    } else {
        app.push_notice("Running without history persistence.");
    }
}

async fn session_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    endpoint: &dyn Endpoint,
    task: TaskKind,
    history: Option<&HistoryStore>,
    telemetry: &TelemetrySink,
) -> Result<(), BoxError> {
    loop {
        {
            let app_view = &*app;
            terminal.draw(|frame| ui(frame, app_view))?;
        }

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(());
        }

        if matches!(app.mode, Mode::Picker(_)) {
            handle_picker_key(app, key);
            continue;
        }
        if matches!(app.mode, Mode::Viewing) {
            handle_viewing_key(app, key);
            continue;
        }

        match key.code {
            KeyCode::Char('h') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                open_picker(app, history);
            }
            KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                new_chat(app);
            }
            KeyCode::Enter => {
                submit_prompt(terminal, app, endpoint, task, history, telemetry).await;
            }
            KeyCode::Char(c) => app.input.push(c),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Up => {
                let height = transcript_height(terminal);
                app.scroll_up(height);
            }
            KeyCode::Down => {
                let height = transcript_height(terminal);
                app.scroll_down(height);
            }
            _ => {}
        }
    }
}

fn transcript_height<B: Backend>(terminal: &Terminal<B>) -> u16 {
    // 3 rows of input box, 1 title row.
    terminal
        .size()
        .map(|size| size.height)
        .unwrap_or(24)
        .saturating_sub(4)
}

async fn submit_prompt<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    endpoint: &dyn Endpoint,
    task: TaskKind,
    history: Option<&HistoryStore>,
    telemetry: &TelemetrySink,
) {
    let prompt = app.input.trim().to_string();
    if prompt.is_empty() {
        return;
    }
    app.input.clear();
    app.auto_scroll = true;
    app.conversation.push_user(prompt.clone());
    app.transcript
        .push(TranscriptCell::Turn(Message::user(prompt.clone())));

    let input_messages = app.conversation.to_input_messages();
    let turn_start = app.transcript.len();
    let started = Instant::now();

    let outcome = {
        let mut canvas = TuiCanvas::new(terminal, app, turn_start);
        run_turn(
            task,
            endpoint,
            &mut canvas,
            &input_messages,
            task.supports_traces(),
        )
        .await
    };

    match outcome {
        Ok(response) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let response_text = flatten_messages(&response.messages);
            if let Some(store) = history {
                if let Err(e) = store.save(
                    &prompt,
                    &response.messages,
                    response.request_id.as_deref(),
                    &app.endpoint_name,
                ) {
                    warn!(error = %e, "failed to save chat exchange");
                }
            }
            telemetry.record(&prompt, &response_text, elapsed_ms);
            app.conversation.push_assistant(response);
        }
        Err(e) => {
            app.transcript
                .push(TranscriptCell::Notice(format!("Request failed: {e}")));
        }
    }
}

fn open_picker(app: &mut App, history: Option<&HistoryStore>) {
    match history {
        Some(store) => {
            let entries = store.recent(RECENT_LIMIT);
            app.mode = Mode::Picker(PickerState {
                entries,
                selected: 0,
            });
        }
        None => app.push_notice("History is unavailable in this session."),
    }
}

fn handle_picker_key(app: &mut App, key: KeyEvent) {
    let Mode::Picker(picker) = &mut app.mode else {
        return;
    };
    match key.code {
        KeyCode::Up => {
            picker.selected = picker.selected.saturating_sub(1);
        }
        KeyCode::Down => {
            if picker.selected + 1 < picker.entries.len() {
                picker.selected += 1;
            }
        }
        KeyCode::Esc => {
            app.mode = Mode::Live;
        }
        KeyCode::Enter => {
            let entry = picker.entries.get(picker.selected).cloned();
            match entry {
                Some(entry) => view_entry(app, entry),
                None => app.mode = Mode::Live,
            }
        }
        _ => {}
    }
}

fn handle_viewing_key(app: &mut App, key: KeyEvent) {
    let ctrl_n =
        key.code == KeyCode::Char('n') && key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl_n || key.code == KeyCode::Esc {
        new_chat(app);
    }
}

/// Switches the session to a read-only view of one saved exchange.
fn view_entry(app: &mut App, entry: HistoryEntry) {
    app.conversation.load_saved(
        &entry.user_message,
        &entry.assistant_response,
        entry.request_id.clone(),
    );
    app.transcript = vec![
        TranscriptCell::Notice(format!(
            "Viewing conversation from {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S")
        )),
        TranscriptCell::Turn(Message::user(entry.user_message)),
        TranscriptCell::Turn(Message::assistant(entry.assistant_response)),
    ];
    if let Some(request_id) = entry.request_id {
        app.push_notice(format!("Request ID: {request_id}"));
    }
    app.mode = Mode::Viewing;
    app.auto_scroll = true;
}

fn new_chat(app: &mut App) {
    app.conversation.reset();
    app.transcript.clear();
    app.push_notice("Started a new conversation.");
    app.mode = Mode::Live;
    app.input.clear();
    app.auto_scroll = true;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::core::message::Role;

    fn test_terminal() -> Terminal<TestBackend> {
        Terminal::new(TestBackend::new(60, 12)).unwrap()
    }

    fn entry(user: &str, assistant: &str) -> HistoryEntry {
        HistoryEntry {
            user_message: user.to_string(),
            assistant_response: assistant.to_string(),
            request_id: Some("req-1".to_string()),
            endpoint: "chat-ep".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_slot_replaces_the_placeholder() {
        let mut terminal = test_terminal();
        let mut app = App::new("chat-ep".to_string());
        app.push_notice("greeting");
        let turn_start = app.transcript.len();

        let mut canvas = TuiCanvas::new(&mut terminal, &mut app, turn_start);
        canvas.placeholder("Thinking…");
        let slot = canvas.open_slot();
        canvas.update_slot(slot, &Message::assistant("Hi"));

        assert_eq!(app.transcript.len(), 2);
        assert!(matches!(&app.transcript[0], TranscriptCell::Notice(text) if text == "greeting"));
        assert!(
            matches!(&app.transcript[1], TranscriptCell::Turn(message) if message.content == "Hi")
        );
    }

    #[test]
    fn replace_all_rebuilds_the_turn_region_only() {
        let mut terminal = test_terminal();
        let mut app = App::new("chat-ep".to_string());
        app.transcript
            .push(TranscriptCell::Turn(Message::user("question")));
        let turn_start = app.transcript.len();

        let mut canvas = TuiCanvas::new(&mut terminal, &mut app, turn_start);
        canvas.placeholder("Thinking…");
        let slot = canvas.open_slot();
        canvas.update_slot(slot, &Message::assistant("partial"));
        canvas.replace_all(&[Message::assistant("final"), Message::tool("c1", "ok")]);

        assert_eq!(app.transcript.len(), 3);
        assert!(
            matches!(&app.transcript[0], TranscriptCell::Turn(message) if message.role == Role::User)
        );
        assert!(
            matches!(&app.transcript[1], TranscriptCell::Turn(message) if message.content == "final")
        );
    }

    #[test]
    fn out_of_range_slots_are_ignored() {
        let mut terminal = test_terminal();
        let mut app = App::new("chat-ep".to_string());
        let mut canvas = TuiCanvas::new(&mut terminal, &mut app, 0);
        canvas.update_slot(SlotId(3), &Message::assistant("nowhere"));
        assert!(app.transcript.is_empty());
    }

    #[test]
    fn viewing_an_entry_is_read_only_until_new_chat() {
        let mut app = App::new("chat-ep".to_string());
        view_entry(&mut app, entry("old question", "old answer"));

        assert!(matches!(app.mode, Mode::Viewing));
        assert!(app.conversation.is_viewing());
        assert_eq!(app.transcript.len(), 4);

        new_chat(&mut app);
        assert!(matches!(app.mode, Mode::Live));
        assert!(!app.conversation.is_viewing());
        assert!(app.conversation.is_empty());
    }

    #[test]
    fn picker_selection_stays_in_bounds() {
        let mut app = App::new("chat-ep".to_string());
        app.mode = Mode::Picker(PickerState {
            entries: vec![entry("a", "1"), entry("b", "2")],
            selected: 0,
        });

        let down = KeyEvent::new(KeyCode::Down, KeyModifiers::NONE);
        handle_picker_key(&mut app, down);
        handle_picker_key(&mut app, down);
        let Mode::Picker(picker) = &app.mode else {
            panic!("expected picker mode");
        };
        assert_eq!(picker.selected, 1);

        let up = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        handle_picker_key(&mut app, up);
        handle_picker_key(&mut app, up);
        let Mode::Picker(picker) = &app.mode else {
            panic!("expected picker mode");
        };
        assert_eq!(picker.selected, 0);
    }

    #[test]
    fn escape_leaves_the_picker_without_loading() {
        let mut app = App::new("chat-ep".to_string());
        app.mode = Mode::Picker(PickerState {
            entries: vec![entry("a", "1")],
            selected: 0,
        });
        handle_picker_key(&mut app, KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(matches!(app.mode, Mode::Live));
        assert!(!app.conversation.is_viewing());
    }

    #[test]
    fn selecting_an_entry_switches_to_viewing() {
        let mut app = App::new("chat-ep".to_string());
        app.mode = Mode::Picker(PickerState {
            entries: vec![entry("a", "1")],
            selected: 0,
        });
        handle_picker_key(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert!(matches!(app.mode, Mode::Viewing));
        assert_eq!(app.conversation.to_input_messages()[0].content, "a");
    }
}
