mod config;
mod host_math;
mod probe;
mod query;

pub use config::*;
pub use host_math::*;
pub use probe::ProbePlan;
pub use query::{DynamicQuery, QueryOrigin, QueryState};
