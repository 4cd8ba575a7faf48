//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area.

pub(crate) mod chat;
pub(crate) mod doc;
mod health;

pub use chat::post_chat;
pub use health::health;
