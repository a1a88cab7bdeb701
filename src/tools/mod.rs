//! Tool abstraction for agent capabilities.

pub mod builtin;
pub mod intents;
pub mod registry;
pub mod tool;

pub use intents::SessionIntent;
pub use registry::ToolRegistry;
pub use tool::*;
