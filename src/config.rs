use std::{fs::File, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{error::Result, problem::INF};

/// Which decomposition of the MMCF problem the abstract representation implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formulation {
    /// One min cost flow sub-model per commodity, shared capacities handled in the parent
    Flow,
    /// One knapsack sub-model per arc, flow conservation handled in the parent
    Knapsack,
}

impl Default for Formulation {
    fn default() -> Self {
        Formulation::Flow
    }
}

impl From<i32> for Formulation {
    fn from(value: i32) -> Self {
        match value {
            0 => Formulation::Flow,
            _ => Formulation::Knapsack,
        }
    }
}

/// A configuration handed directly to the construction of the abstract representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Configuration {
    /// 0 for the flow decomposition, anything else for the knapsack decomposition
    #[serde(default)]
    pub formulation: Option<i32>,
    /// Whether the knapsack decomposition adds the strong forcing constraints
    #[serde(default)]
    pub strong_forcing: Option<bool>,
}

impl Configuration {
    pub fn with_formulation(formulation: i32) -> Configuration {
        Configuration {
            formulation: Some(formulation),
            strong_forcing: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Configuration> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// The defaults a model falls back on when no configuration is handed to it directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockConfig {
    /// Formulation selector used by variable construction
    #[serde(default)]
    pub static_variables: Option<i32>,
    /// Nonzero enables the strong forcing constraints
    #[serde(default)]
    pub static_constraints: Option<i32>,
}

impl BlockConfig {
    /// The formulation selected by `direct`, or by these defaults when `direct` has no opinion
    pub fn formulation(&self, direct: Option<&Configuration>) -> Formulation {
        direct
            .and_then(|c| c.formulation)
            .or(self.static_variables)
            .map(Formulation::from)
            .unwrap_or_default()
    }

    /// Whether strong forcing is enabled by `direct`, or by these defaults
    pub fn strong_forcing(&self, direct: Option<&Configuration>) -> bool {
        direct
            .and_then(|c| c.strong_forcing)
            .or_else(|| self.static_constraints.map(|v| v != 0))
            .unwrap_or(false)
    }
}

fn unbounded<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(INF))
}

/// Bounds on how much the data may change after preprocessing. Every bound is non-negative,
/// and a smaller bound lets the preprocessor prove more constraints redundant.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PreprocessBounds {
    /// Maximum increase of a shared capacity, may be `INF`
    #[serde(default, deserialize_with = "unbounded")]
    pub inc_uk: f64,
    /// Maximum decrease of a shared capacity, may be `INF`
    #[serde(default, deserialize_with = "unbounded")]
    pub dec_uk: f64,
    /// Maximum increase of an individual capacity, may be `INF`
    #[serde(default, deserialize_with = "unbounded")]
    pub inc_ujk: f64,
    /// Maximum decrease of an individual capacity, may be `INF`
    #[serde(default, deserialize_with = "unbounded")]
    pub dec_ujk: f64,
    /// Maximum change of any deficit, must be finite
    #[serde(default, deserialize_with = "unbounded")]
    pub chg_dfct: f64,
    /// Maximum decrease of any cost, must be finite
    #[serde(default, deserialize_with = "unbounded")]
    pub dec_csts: f64,
}

impl Default for PreprocessBounds {
    fn default() -> Self {
        PreprocessBounds {
            inc_uk: 0.0,
            dec_uk: 0.0,
            inc_ujk: 0.0,
            dec_ujk: 0.0,
            chg_dfct: 0.0,
            dec_csts: 0.0,
        }
    }
}

impl PreprocessBounds {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<PreprocessBounds> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
