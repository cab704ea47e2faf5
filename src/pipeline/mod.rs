//! 研究流水线
//!
//! 状态容器、阶段代理与编排器。

pub mod agents;
pub mod context;
pub mod orchestrator;
pub mod state;

pub use context::JobContext;
pub use orchestrator::{PipelineStream, ResearchPipeline, StageEvent};
pub use state::{ResearchState, Stage, StateDelta};
