//! The streaming chat gateway: HTTP entry point, relational persistence,
//! and the request/row types shared between them.

mod handler;
mod store;
mod types;

pub use handler::{post_chat, ChatErrorResponse};
pub use types::ChatRequest;
