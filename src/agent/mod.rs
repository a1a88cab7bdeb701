//! Agent module: the dispatch loop, its context window, and the service facade.

pub mod dispatch;
pub mod history;
pub mod prompts;
pub mod service;

pub use dispatch::{ConversationState, route_after_agent};
pub use service::{AgentDeps, AgentService, ChatReply};
