//! Built-in tools for learner profiles and the knowledge graph.

pub mod knowledge;
pub mod profile;

use std::sync::Arc;

use crate::knowledge::KnowledgeGraph;
use crate::store::ProfileStore;
use crate::tools::{ToolError, ToolRegistry};

pub use knowledge::{
    GetPrerequisitesTool, RetrieveConceptTool, RetrieveSectionsTool, UpdateConceptStatusTool,
};
pub use profile::{DeleteProfileTool, RetrieveProfileTool, StoreProfileTool};

/// Register the seven built-in tools.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    profiles: Arc<dyn ProfileStore>,
    graph: Arc<KnowledgeGraph>,
) -> Result<(), ToolError> {
    registry.register_sync(Arc::new(StoreProfileTool::new(profiles.clone())))?;
    registry.register_sync(Arc::new(RetrieveProfileTool::new(profiles.clone())))?;
    registry.register_sync(Arc::new(DeleteProfileTool::new(profiles)))?;
    registry.register_sync(Arc::new(RetrieveSectionsTool::new(graph.clone())))?;
    registry.register_sync(Arc::new(RetrieveConceptTool::new(graph.clone())))?;
    registry.register_sync(Arc::new(UpdateConceptStatusTool::new(graph.clone())))?;
    registry.register_sync(Arc::new(GetPrerequisitesTool::new(graph)))?;
    tracing::info!(count = registry.count(), "Registered built-in tools");
    Ok(())
}
