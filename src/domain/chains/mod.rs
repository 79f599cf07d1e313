//! Dependency resolver - control/data dependencies, liveness sources and scopes

mod compiled;
mod dependency;
mod resolver;

pub use compiled::CompiledWorkflow;
pub use dependency::{
    BindingSource, CompiledBinding, DataDependency, DependencyInfo, ScopeInfo, ROOT_SCOPE,
};
pub use resolver::{DependencyResolver, ITERATION_START_PARAM};
