//! Terminal interface: transcript state, frame drawing, and the session loop.

pub mod chat_loop;
pub mod renderer;

use crate::core::conversation::Conversation;
use crate::core::history::HistoryEntry;
use crate::core::message::Message;

/// One display cell in the transcript pane.
#[derive(Debug, Clone)]
pub enum TranscriptCell {
    /// Transient or informational line never sent to the endpoint.
    Notice(String),
    /// A rendered conversation turn.
    Turn(Message),
}

/// What the session is currently showing.
pub enum Mode {
    Live,
    Picker(PickerState),
    Viewing,
}

pub struct PickerState {
    pub entries: Vec<HistoryEntry>,
    pub selected: usize,
}

pub struct App {
    pub transcript: Vec<TranscriptCell>,
    pub conversation: Conversation,
    pub input: String,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub mode: Mode,
    pub endpoint_name: String,
}

impl App {
    pub fn new(endpoint_name: String) -> Self {
        Self {
            transcript: Vec::new(),
            conversation: Conversation::new(),
            input: String::new(),
            scroll_offset: 0,
            auto_scroll: true,
            mode: Mode::Live,
            endpoint_name,
        }
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.transcript.push(TranscriptCell::Notice(text.into()));
    }

    fn max_scroll_offset(&self, available_height: u16) -> u16 {
        let total = renderer::transcript_line_count(self) as u16;
        total.saturating_sub(available_height)
    }

    pub fn scroll_up(&mut self, available_height: u16) {
        let max = self.max_scroll_offset(available_height);
        let current = if self.auto_scroll {
            max
        } else {
            self.scroll_offset.min(max)
        };
        self.auto_scroll = false;
        self.scroll_offset = current.saturating_sub(1);
    }

    pub fn scroll_down(&mut self, available_height: u16) {
        let max = self.max_scroll_offset(available_height);
        let current = if self.auto_scroll {
            max
        } else {
            self.scroll_offset.min(max)
        };
        let next = current.saturating_add(1).min(max);
        self.scroll_offset = next;
        if next >= max {
            self.auto_scroll = true;
        }
    }
}
