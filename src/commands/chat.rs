use chrono::Utc;
use uuid::Uuid;

use crate::chart::{self, ChartEndpoint, ChartOptions, ChartRequest};
use crate::state::AppState;
use crate::store::models::{ChatMessage, Conversation, ConversationSummary};
use crate::store::Action;

fn parse_id(id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|_| format!("Invalid conversation id: {}", id))
}

pub fn create_conversation(state: &AppState) -> Conversation {
    state
        .dispatch(Action::NewConversation)
        .active_conversation()
        .clone()
}

pub fn list_conversations(state: &AppState) -> Vec<ConversationSummary> {
    state.chats().summaries()
}

pub fn active_conversation(state: &AppState) -> Conversation {
    state.chats().active_conversation().clone()
}

pub fn select_conversation(state: &AppState, id: &str) -> Result<Conversation, String> {
    let id = parse_id(id)?;
    state
        .dispatch(Action::Select(id))
        .conversation(id)
        .cloned()
        .ok_or_else(|| format!("Conversation not found: {}", id))
}

pub fn get_messages(state: &AppState, conversation_id: &str) -> Result<Vec<ChatMessage>, String> {
    let id = parse_id(conversation_id)?;
    state
        .chats()
        .conversation(id)
        .map(|c| c.messages.clone())
        .ok_or_else(|| format!("Conversation not found: {}", id))
}

pub fn rename_conversation(state: &AppState, id: &str, title: &str) -> Result<(), String> {
    let id = parse_id(id)?;
    if title.trim().is_empty() {
        return Err("Title cannot be empty".into());
    }
    if state.chats().conversation(id).is_none() {
        return Err(format!("Conversation not found: {}", id));
    }
    state.dispatch(Action::Rename {
        conversation_id: id,
        title: title.to_string(),
    });
    Ok(())
}

pub fn delete_conversation(state: &AppState, id: &str) -> Result<(), String> {
    let id = parse_id(id)?;
    state.dispatch(Action::Delete(id));
    Ok(())
}

/// Send the user's message (with the staged attachment, if any) to the active
/// conversation and append the bot's reply.
///
/// Returns the bot message, or `None` when there was nothing to send. Chart
/// endpoint failures never surface as errors: they become the bot's reply.
pub async fn send_message(state: &AppState, text: &str, generate_chart: bool) -> Option<ChatMessage> {
    let attachment = state.staged().take();
    if text.trim().is_empty() && attachment.is_none() {
        return None;
    }

    // 1. Save user message
    let conversation_id = state.chats().active_id();
    state.dispatch(Action::AppendUserMessage {
        conversation_id,
        text: text.to_string(),
        attachment: attachment.clone(),
        at: Utc::now(),
    });

    // 2. Ask the chart endpoint, or answer locally
    let (reply, chart) = if generate_chart || attachment.is_some() {
        let endpoint = ChartEndpoint::from(&state.config());
        let request = ChartRequest {
            prompt: text.to_string(),
            generate_chart,
            attachment,
        };
        chart_reply(&endpoint, &request).await
    } else {
        (format!("Normal reply: {}", text.trim()), None)
    };

    // 3. Save bot message
    let next = state.dispatch(Action::AppendBotMessage {
        conversation_id,
        text: reply,
        chart,
        at: Utc::now(),
    });
    let message = next
        .conversation(conversation_id)
        .and_then(|c| c.messages.last())
        .cloned();
    if message.is_none() {
        log::warn!("Conversation {} was deleted before the reply arrived", conversation_id);
    }
    message
}

async fn chart_reply(endpoint: &ChartEndpoint, request: &ChartRequest) -> (String, Option<ChartOptions>) {
    match chart::request_chart(endpoint, request).await {
        Ok(reply) => (reply.text(), reply.chart),
        Err(e) => {
            log::error!("Failed to get chart data: {}", e);
            (
                format!("Sorry, something went wrong while generating the response: {}", e),
                None,
            )
        }
    }
}
