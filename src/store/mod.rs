pub mod models;

use chrono::{DateTime, Utc};
use models::{Attachment, ChatMessage, Conversation, ConversationSummary};
use uuid::Uuid;

use crate::chart::ChartOptions;

/// All conversations of the session plus the active one.
///
/// The list is never empty. State only changes through [`reduce`], which
/// returns a new value and leaves its input untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    conversations: Vec<Conversation>,
    active: Uuid,
}

impl Default for ChatState {
    fn default() -> Self {
        let conversation = Conversation::new();
        Self {
            active: conversation.id,
            conversations: vec![conversation],
        }
    }
}

impl ChatState {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn active_id(&self) -> Uuid {
        self.active_conversation().id
    }

    /// Falls back to the first conversation if the active id went stale.
    pub fn active_conversation(&self) -> &Conversation {
        self.conversation(self.active)
            .unwrap_or(&self.conversations[0])
    }

    pub fn conversation(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn summaries(&self) -> Vec<ConversationSummary> {
        self.conversations.iter().map(ConversationSummary::from).collect()
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    NewConversation,
    Select(Uuid),
    AppendUserMessage {
        conversation_id: Uuid,
        text: String,
        attachment: Option<Attachment>,
        at: DateTime<Utc>,
    },
    AppendBotMessage {
        conversation_id: Uuid,
        text: String,
        chart: Option<ChartOptions>,
        at: DateTime<Utc>,
    },
    Rename {
        conversation_id: Uuid,
        title: String,
    },
    Delete(Uuid),
}

pub fn reduce(state: &ChatState, action: Action) -> ChatState {
    match action {
        Action::NewConversation => {
            let conversation = Conversation::new();
            let active = conversation.id;
            let mut conversations = state.conversations.clone();
            conversations.push(conversation);
            ChatState {
                conversations,
                active,
            }
        }
        Action::Select(id) => {
            if state.conversation(id).is_none() {
                log::warn!("Ignoring selection of unknown conversation {}", id);
                return state.clone();
            }
            ChatState {
                conversations: state.conversations.clone(),
                active: id,
            }
        }
        Action::AppendUserMessage {
            conversation_id,
            text,
            attachment,
            at,
        } => {
            let trimmed = text.trim();
            if trimmed.is_empty() && attachment.is_none() {
                return state.clone();
            }
            update(state, conversation_id, |conversation| {
                let body = match &attachment {
                    Some(file) if trimmed.is_empty() => format!("Attached file: {}", file.name()),
                    _ => text.clone(),
                };
                // Only the seeded greeting so far: this is the first user message.
                if conversation.messages.len() == 1 {
                    conversation.title = if !trimmed.is_empty() {
                        trimmed.to_string()
                    } else {
                        attachment
                            .as_ref()
                            .map(|file| file.name().to_string())
                            .unwrap_or_else(|| "Chat".to_string())
                    };
                }
                let id = conversation.next_message_id();
                conversation
                    .messages
                    .push(ChatMessage::user(id, body, attachment, at));
                conversation.last_updated = at;
            })
        }
        Action::AppendBotMessage {
            conversation_id,
            text,
            chart,
            at,
        } => update(state, conversation_id, |conversation| {
            let id = conversation.next_message_id();
            conversation.messages.push(ChatMessage::bot(id, text, chart, at));
            conversation.last_updated = at;
        }),
        Action::Rename {
            conversation_id,
            title,
        } => {
            let title = title.trim();
            if title.is_empty() {
                return state.clone();
            }
            update(state, conversation_id, |conversation| {
                conversation.title = title.to_string();
            })
        }
        Action::Delete(id) => {
            let mut conversations: Vec<Conversation> = state
                .conversations
                .iter()
                .filter(|c| c.id != id)
                .cloned()
                .collect();
            if conversations.is_empty() {
                conversations.push(Conversation::new());
            }
            let active = if state.active == id || !conversations.iter().any(|c| c.id == state.active)
            {
                conversations[0].id
            } else {
                state.active
            };
            ChatState {
                conversations,
                active,
            }
        }
    }
}

/// Copy of `state` with `f` applied to one conversation. Unknown ids are a no-op.
fn update(state: &ChatState, id: Uuid, f: impl FnOnce(&mut Conversation)) -> ChatState {
    let Some(index) = state.conversations.iter().position(|c| c.id == id) else {
        log::warn!("Conversation {} not found, state left unchanged", id);
        return state.clone();
    };
    let mut conversations = state.conversations.clone();
    f(&mut conversations[index]);
    ChatState {
        conversations,
        active: state.active,
    }
}
