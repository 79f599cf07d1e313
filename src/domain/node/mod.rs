//! Node contract - executor trait, results, progression signals and registry

mod error;
mod executor;
mod registry;
mod result;
mod status;

pub use error::{NodeError, NodeErrorCode};
pub use executor::{
    DeltaSender, Interrupter, NodeCapabilities, NodeContext, NodeExecutor, SubgraphRunner,
};
pub use registry::NodeRegistry;
pub use result::{
    NodeRunResult, NodeRunStatus, TokenCost, ERROR_CODE_KEY, ERROR_MESSAGE_KEY,
};
pub use status::{NodeRunningStatus, Signal};

#[cfg(test)]
pub use executor::mock;
#[cfg(test)]
pub use executor::{MockInterrupter, MockSubgraphRunner};
