//! Normalizes the line-delimited JSON event stream emitted by agent workers
//! (Claude SDK and deepagents/LangGraph dialects) into one closed vocabulary
//! of `StreamEvent`s for the SSE formatter and persistence layer to consume.

mod claude;
mod deepagents;
mod parser;
mod types;

pub use parser::EventParser;
pub use types::{AgentEvent, EventType, ParserDialect, StreamEvent};
