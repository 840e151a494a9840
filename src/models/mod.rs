pub mod knapsack;
pub mod lp;
pub mod mcf;
pub mod mmcf;
pub mod utils;

pub use mmcf::MmcfModel;
