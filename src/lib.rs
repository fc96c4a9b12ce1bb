//! Core of a chat assistant that accepts CSV/Excel attachments and asks a
//! remote endpoint to turn them into charts.
//!
//! - [`doc_processor`] normalizes uploaded files into [`Attachment`]s.
//! - [`store`] holds conversations and the reducer that updates them.
//! - [`chart`] talks to the chart-generation endpoint.
//! - [`commands`] are the handlers a UI calls, over a shared [`AppState`].

pub mod chart;
pub mod commands;
pub mod config;
pub mod doc_processor;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use state::AppState;
pub use store::models::{Attachment, ChatMessage, Conversation};
