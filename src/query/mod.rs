pub mod agent_status;
pub mod cursor;
pub mod metrics;
pub mod pipeline;
pub mod tasks;
pub mod timeline;

pub use agent_status::{agent_status_view, AgentStatusView, Stats1h};
pub use pipeline::{agent_pipeline, fleet_pipeline, AgentPipeline, FleetPipeline};
pub use tasks::{derive_task, list_tasks, TaskListFilter, TaskStatus, TaskView};
pub use timeline::{build_timeline, Timeline};
