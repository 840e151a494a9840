pub mod config;
pub mod error;
pub mod models;
pub mod preprocess;
pub mod problem;
pub mod registry;

pub use config::{BlockConfig, Configuration, Formulation, PreprocessBounds};
pub use error::{Error, Result};
pub use models::lp::{LpOutcome, LpSolver};
pub use models::mmcf::{Decomposition, MmcfModel};
pub use preprocess::PreprocessReport;
pub use problem::{ActiveSet, Arc, DuplicateMarkers, Problem, ProblemConstructionError, INF};
pub use registry::Registry;
