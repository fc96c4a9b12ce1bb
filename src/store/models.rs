use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chart::ChartOptions;

/// Header plus five data rows.
pub const PREVIEW_ROWS: usize = 6;

pub const DEFAULT_TITLE: &str = "New Conversation";

pub const GREETING: &str = "Hi! I'm your AI assistant. You can send me messages, attach CSV or \
Excel files, or ask me to build a chart from your data.";

/// A parsed CSV/Excel file, normalized to rows of string cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    name: String,
    mime_type: String,
    content: Vec<Vec<String>>,
    preview: Vec<Vec<String>>,
}

impl Attachment {
    pub(crate) fn new(name: &str, mime_type: &str, content: Vec<Vec<String>>) -> Self {
        let preview = content.iter().take(PREVIEW_ROWS).cloned().collect();
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            content,
            preview,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn content(&self) -> &[Vec<String>] {
        &self.content
    }

    pub fn preview(&self) -> &[Vec<String>] {
        &self.preview
    }

    pub fn header(&self) -> Option<&[String]> {
        self.content.first().map(Vec::as_slice)
    }

    /// Rows after the header.
    pub fn data_row_count(&self) -> usize {
        self.content.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub is_bot: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub show_chart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_options: Option<ChartOptions>,
}

impl ChatMessage {
    pub fn user(id: u64, text: String, attachment: Option<Attachment>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            is_bot: false,
            timestamp: at,
            attachment,
            show_chart: false,
            chart_options: None,
        }
    }

    pub fn bot(id: u64, text: String, chart: Option<ChartOptions>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            text,
            is_bot: true,
            timestamp: at,
            attachment: None,
            show_chart: chart.is_some(),
            chart_options: chart,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub last_updated: DateTime<Utc>,
}

impl Conversation {
    /// A fresh conversation seeded with the bot greeting.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            messages: vec![ChatMessage::bot(1, GREETING.to_string(), None, now)],
            last_updated: now,
        }
    }

    pub(crate) fn next_message_id(&self) -> u64 {
        self.messages.len() as u64 + 1
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub message_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title.clone(),
            message_count: conversation.messages.len(),
            last_updated: conversation.last_updated,
        }
    }
}
