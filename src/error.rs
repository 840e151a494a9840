use derive_more::Display;

use crate::problem::ProblemConstructionError;

/// Everything that can go wrong while loading, preprocessing, building or solving a model.
#[derive(Debug, Display)]
pub enum Error {
    /// A caller supplied an argument outside of its domain
    #[display(fmt = "invalid argument: {}", _0)]
    InvalidArgument(String),
    /// An internal invariant or an unimplemented extension was hit
    #[display(fmt = "logic error: {}", _0)]
    Logic(String),
    /// The problem data is malformed
    #[display(fmt = "invalid problem data: {:?}", _0)]
    Construction(ProblemConstructionError),
    #[display(fmt = "io error: {}", _0)]
    Io(String),
    #[display(fmt = "parse error: {}", _0)]
    Parse(String),
    /// The external solver failed
    #[display(fmt = "solver error: {}", _0)]
    Solver(String),
}

impl std::error::Error for Error {}

impl From<ProblemConstructionError> for Error {
    fn from(err: ProblemConstructionError) -> Self {
        Error::Construction(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
