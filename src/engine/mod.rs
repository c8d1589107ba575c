pub mod types;
pub mod workflow;

pub use workflow::WorkflowSession;
