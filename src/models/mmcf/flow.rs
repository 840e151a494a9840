use log::debug;

use super::Decomposition;
use crate::config::Formulation;
use crate::error::{Error, Result};
use crate::models::mcf::McfBlock;
use crate::models::utils::{LinearConstraint, LinearFunction, RowConstraint, SubModel, Var};
use crate::problem::{ArcIndex, CommodityIndex, Flow, NodeIndex, Problem, INF};

/// One min cost flow sub-model per commodity. The shared capacity of every active arc is
/// enforced by a linking row `sum_k x[k][j] <= UTot[j]`.
#[derive(Debug, Clone)]
pub struct FlowDecomposition {
    blocks: Vec<McfBlock>,
    coupling: Vec<RowConstraint>,
    /// The coupling row of each arc, if it has one
    row_of: Vec<Option<usize>>,
}

impl FlowDecomposition {
    fn coupling_rows(&self, problem: &Problem) -> Result<Vec<RowConstraint>> {
        let mut rows = Vec::with_capacity(problem.n_coupling());
        for j in problem.active().indices(problem.n_arcs()) {
            let shared = problem.shared_capacity(j);
            if shared >= INF {
                return Err(Error::Logic(format!(
                    "coupling constraint of arc {} has an infinite right hand side",
                    j
                )));
            }

            let coeffs = self
                .blocks
                .iter()
                .filter(|b| b.variables()[j].upper > 0.0)
                .map(|b| (Var { block: b.id(), index: j }, 1.0))
                .collect();

            let mut row = RowConstraint::new(format!("shared_{}", j));
            row.set_function(LinearFunction::new(coeffs, 0.0));
            row.set_rhs(shared);
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Decomposition for FlowDecomposition {
    fn build(problem: &Problem) -> Result<Self> {
        let blocks = (0..problem.n_commodities())
            .map(|k| {
                McfBlock::load(
                    k,
                    problem.arcs(),
                    problem.capacities(k),
                    problem.costs(k),
                    problem.deficits(k),
                )
            })
            .collect();

        Ok(FlowDecomposition {
            blocks,
            coupling: Vec::new(),
            row_of: vec![None; problem.n_arcs()],
        })
    }

    fn formulation(&self) -> Formulation {
        Formulation::Flow
    }

    fn generate_constraints(&mut self, problem: &Problem, _strong_forcing: bool) -> Result<()> {
        let rows = self.coupling_rows(problem)?;

        for block in &mut self.blocks {
            block.generate_constraints();
        }

        let mut row_of = vec![None; problem.n_arcs()];
        for (r, j) in problem.active().indices(problem.n_arcs()).into_iter().enumerate() {
            row_of[j] = Some(r);
        }

        debug!("{} coupling rows", rows.len());
        self.coupling = rows;
        self.row_of = row_of;
        Ok(())
    }

    fn flow(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.blocks[k].flow(j)
    }

    fn flow_variable(&self, k: CommodityIndex, j: ArcIndex) -> Option<Var> {
        self.blocks[k].var(j)
    }

    fn potential(&self, k: CommodityIndex, i: NodeIndex) -> f64 {
        self.blocks[k].potential(i)
    }

    fn set_potential(&mut self, k: CommodityIndex, i: NodeIndex, potential: f64) {
        self.blocks[k].set_potential(i, potential);
    }

    fn dual(&self, j: ArcIndex) -> f64 {
        self.row_of[j].map_or(0.0, |r| self.coupling[r].dual())
    }

    fn set_dual(&mut self, j: ArcIndex, dual: f64) {
        if let Some(r) = self.row_of[j] {
            self.coupling[r].set_dual(dual);
        }
    }

    fn sub_models(&self) -> Vec<&dyn SubModel> {
        self.blocks.iter().map(|b| b as &dyn SubModel).collect()
    }

    fn sub_models_mut(&mut self) -> Vec<&mut dyn SubModel> {
        self.blocks
            .iter_mut()
            .map(|b| b as &mut dyn SubModel)
            .collect()
    }

    fn constraints(&self) -> &[RowConstraint] {
        &self.coupling
    }
}
