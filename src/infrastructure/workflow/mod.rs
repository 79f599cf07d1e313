//! Workflow execution - scheduler, iteration sub-engine and run control

mod engine;
mod interrupt;
mod iteration;
mod scheduler;

pub use engine::{EngineConfig, RunControl, RunHandle, WorkflowEngine};
pub use interrupt::InterruptGate;
pub use iteration::{INDEX_INPUT, ITEM_INPUT};
