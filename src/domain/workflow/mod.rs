//! Workflow domain - run requests, results, checkpoints and errors

mod error;
mod request;
mod result;

pub use error::WorkflowError;
pub use request::{ChatRole, ChatTurn, RunRequest};
pub use result::{PendingQuestion, RunCheckpoint, WorkflowFailure, WorkflowRunResult};
