//! Handlers a UI shell calls. Each returns plain data or a `String` error
//! that can be shown to the user as-is.

pub mod attachment;
pub mod chat;
pub mod settings;

pub use attachment::*;
pub use chat::*;
pub use settings::*;
