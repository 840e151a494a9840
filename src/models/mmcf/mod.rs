use std::fmt::Debug;

use log::{info, warn};

use crate::config::{BlockConfig, Configuration, Formulation, PreprocessBounds};
use crate::error::{Error, Result};
use crate::models::utils::{RowConstraint, SubModel, Var};
use crate::preprocess::PreprocessReport;
use crate::problem::{ArcIndex, CommodityIndex, Cost, Flow, NodeIndex, Problem};

mod flow;
mod knapsack;
#[cfg(test)]
mod tests;

pub use flow::FlowDecomposition;
pub use knapsack::KnapsackDecomposition;

/// One way of splitting an MMCF problem into independent sub-models tied together by linking
/// constraints in the parent.
pub trait Decomposition: Debug {
    /// Creates the sub-models and their variables
    fn build(problem: &Problem) -> Result<Self>
    where
        Self: Sized;

    fn formulation(&self) -> Formulation;

    /// Generates the constraints of every sub-model followed by the linking constraints. On
    /// error, nothing has been generated.
    fn generate_constraints(&mut self, problem: &Problem, strong_forcing: bool) -> Result<()>;

    /// The flow of commodity k on arc j
    fn flow(&self, k: CommodityIndex, j: ArcIndex) -> Flow;

    /// The variable deciding the flow of commodity k on arc j
    fn flow_variable(&self, k: CommodityIndex, j: ArcIndex) -> Option<Var>;

    /// How much arc j is activated, always 0 when the decomposition has no activation decisions
    fn activation(&self, _j: ArcIndex) -> f64 {
        0.0
    }

    /// The potential of node i for commodity k
    fn potential(&self, k: CommodityIndex, i: NodeIndex) -> f64;

    fn set_potential(&mut self, k: CommodityIndex, i: NodeIndex, potential: f64);

    /// The dual value of the shared capacity constraint of arc j
    fn dual(&self, j: ArcIndex) -> f64;

    fn set_dual(&mut self, j: ArcIndex, dual: f64);

    /// The sub-models, where the position of a sub-model is the `block` of its variables
    fn sub_models(&self) -> Vec<&dyn SubModel>;

    fn sub_models_mut(&mut self) -> Vec<&mut dyn SubModel>;

    /// The linking constraints, empty before constraints are generated
    fn constraints(&self) -> &[RowConstraint];
}

/// How far the abstract representation has been built
#[derive(Debug)]
enum Construction {
    Empty,
    VariablesBuilt(Box<dyn Decomposition>),
    FullyBuilt {
        decomposition: Box<dyn Decomposition>,
        strong_forcing: bool,
    },
}

/// A multicommodity min cost flow problem together with its abstract representation.
#[derive(Debug)]
pub struct MmcfModel {
    problem: Problem,
    block_config: BlockConfig,
    state: Construction,
}

impl MmcfModel {
    pub fn new(problem: Problem) -> MmcfModel {
        MmcfModel::with_config(problem, BlockConfig::default())
    }

    pub fn with_config(problem: Problem, block_config: BlockConfig) -> MmcfModel {
        MmcfModel {
            problem,
            block_config,
            state: Construction::Empty,
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn block_config(&self) -> &BlockConfig {
        &self.block_config
    }

    /// Preprocesses the data. Only allowed before the abstract representation is built.
    pub fn preprocess(&mut self, bounds: &PreprocessBounds) -> Result<PreprocessReport> {
        if !matches!(self.state, Construction::Empty) {
            return Err(Error::Logic(
                "preprocessing after the abstract representation is built".into(),
            ));
        }
        self.problem.preprocess(bounds)
    }

    /// Replaces the data and drops the abstract representation built from the old data
    pub fn reset(&mut self, problem: Problem) {
        self.problem = problem;
        self.state = Construction::Empty;
    }

    pub fn into_problem(self) -> Problem {
        self.problem
    }

    /// Builds the sub-models and their variables, using the formulation chosen by `config` or,
    /// when it has none, by the block defaults. Does nothing if the variables already exist.
    pub fn generate_variables(&mut self, config: Option<&Configuration>) -> Result<()> {
        if !matches!(self.state, Construction::Empty) {
            return Ok(());
        }

        let decomposition: Box<dyn Decomposition> = match self.block_config.formulation(config) {
            Formulation::Flow => {
                info!("Building flow decomposition of {}", self.problem);
                Box::new(FlowDecomposition::build(&self.problem)?)
            }
            Formulation::Knapsack => {
                info!("Building knapsack decomposition of {}", self.problem);
                Box::new(KnapsackDecomposition::build(&self.problem)?)
            }
        };

        info!(
            "Successfully built {} sub-models",
            decomposition.sub_models().len()
        );
        self.state = Construction::VariablesBuilt(decomposition);
        Ok(())
    }

    /// Generates the constraints of the sub-models and the linking constraints, building the
    /// variables first if needed. Does nothing if the constraints already exist. On error the
    /// model is left as it was before the call.
    pub fn generate_constraints(&mut self, config: Option<&Configuration>) -> Result<()> {
        let was_empty = matches!(self.state, Construction::Empty);
        if was_empty {
            self.generate_variables(config)?;
        }

        let strong_forcing = self.block_config.strong_forcing(config);
        match std::mem::replace(&mut self.state, Construction::Empty) {
            Construction::VariablesBuilt(mut decomposition) => {
                match decomposition.generate_constraints(&self.problem, strong_forcing) {
                    Ok(()) => {
                        info!(
                            "Successfully generated {} linking constraints",
                            decomposition.constraints().len()
                        );
                        self.state = Construction::FullyBuilt {
                            decomposition,
                            strong_forcing,
                        };
                        Ok(())
                    }
                    Err(err) => {
                        warn!("Failed to generate constraints: {}", err);
                        if !was_empty {
                            self.state = Construction::VariablesBuilt(decomposition);
                        }
                        Err(err)
                    }
                }
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    /// Builds the whole abstract representation. On error the model is left as it was.
    pub fn build(&mut self, config: Option<&Configuration>) -> Result<()> {
        let was_empty = matches!(self.state, Construction::Empty);
        self.generate_variables(config)?;
        if let Err(err) = self.generate_constraints(config) {
            if was_empty {
                self.state = Construction::Empty;
            }
            return Err(err);
        }
        Ok(())
    }

    fn decomposition(&self) -> Option<&dyn Decomposition> {
        match &self.state {
            Construction::Empty => None,
            Construction::VariablesBuilt(d) => Some(d.as_ref()),
            Construction::FullyBuilt { decomposition, .. } => Some(decomposition.as_ref()),
        }
    }

    fn decomposition_mut(&mut self) -> Option<&mut (dyn Decomposition + 'static)> {
        match &mut self.state {
            Construction::Empty => None,
            Construction::VariablesBuilt(d) => Some(d.as_mut()),
            Construction::FullyBuilt { decomposition, .. } => Some(decomposition.as_mut()),
        }
    }

    pub fn variables_built(&self) -> bool {
        !matches!(self.state, Construction::Empty)
    }

    pub fn constraints_built(&self) -> bool {
        matches!(self.state, Construction::FullyBuilt { .. })
    }

    /// The formulation in use, `None` before the variables are built
    pub fn formulation(&self) -> Option<Formulation> {
        self.decomposition().map(|d| d.formulation())
    }

    /// Whether strong forcing was requested when the constraints were generated
    pub fn strong_forcing(&self) -> bool {
        match self.state {
            Construction::FullyBuilt { strong_forcing, .. } => strong_forcing,
            _ => false,
        }
    }

    pub fn cost(&self, k: CommodityIndex, j: ArcIndex) -> Cost {
        self.problem.cost(k, j)
    }

    pub fn capacity(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.problem.capacity(k, j)
    }

    pub fn shared_capacity(&self, j: ArcIndex) -> Flow {
        self.problem.shared_capacity(j)
    }

    /// The flow of commodity k on arc j, 0 before the variables are built
    pub fn flow(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.decomposition().map_or(0.0, |d| d.flow(k, j))
    }

    /// The flows of commodity k, indexed by arc
    pub fn flows(&self, k: CommodityIndex) -> Vec<Flow> {
        (0..self.problem.n_arcs()).map(|j| self.flow(k, j)).collect()
    }

    pub fn activation(&self, j: ArcIndex) -> f64 {
        self.decomposition().map_or(0.0, |d| d.activation(j))
    }

    pub fn flow_variable(&self, k: CommodityIndex, j: ArcIndex) -> Option<Var> {
        self.decomposition().and_then(|d| d.flow_variable(k, j))
    }

    pub fn potential(&self, k: CommodityIndex, i: NodeIndex) -> f64 {
        self.decomposition().map_or(0.0, |d| d.potential(k, i))
    }

    pub fn set_potential(&mut self, k: CommodityIndex, i: NodeIndex, potential: f64) {
        if let Some(d) = self.decomposition_mut() {
            d.set_potential(k, i, potential);
        }
    }

    /// The dual value of the shared capacity constraint of arc j, 0 if there is none
    pub fn dual(&self, j: ArcIndex) -> f64 {
        self.decomposition().map_or(0.0, |d| d.dual(j))
    }

    pub fn set_dual(&mut self, j: ArcIndex, dual: f64) {
        if let Some(d) = self.decomposition_mut() {
            d.set_dual(j, dual);
        }
    }

    pub fn sub_models(&self) -> Vec<&dyn SubModel> {
        self.decomposition().map_or_else(Vec::new, |d| d.sub_models())
    }

    pub fn sub_models_mut(&mut self) -> Vec<&mut dyn SubModel> {
        match self.decomposition_mut() {
            Some(d) => d.sub_models_mut(),
            None => Vec::new(),
        }
    }

    /// The linking constraints of the parent
    pub fn constraints(&self) -> &[RowConstraint] {
        match self.decomposition() {
            Some(d) => d.constraints(),
            None => &[],
        }
    }

    /// The objective value of the values currently held by the variables
    pub fn objective_value(&self) -> f64 {
        self.sub_models()
            .iter()
            .map(|sm| sm.objective().evaluate(|v| sm.value(v.index)))
            .sum()
    }
}
