//! Reformats normalized agent `StreamEvent`s into the block-oriented,
//! Vercel AI-SDK-style SSE protocol the chat UI speaks.

mod formatter;
mod frame;

pub use formatter::SseFormatter;
pub use frame::{Frame, DONE_SENTINEL};
