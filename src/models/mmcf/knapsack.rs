use itertools::iproduct;
use log::{debug, warn};

use super::Decomposition;
use crate::config::Formulation;
use crate::error::Result;
use crate::models::knapsack::{Item, KnapsackBlock};
use crate::models::utils::{
    LinearConstraint, LinearFunction, RowConstraint, RowsWith, SubModel, Var,
};
use crate::preprocess::flow_bounds;
use crate::problem::{ArcIndex, CommodityIndex, Flow, NodeIndex, Problem, INF};

/// One knapsack per arc, with one item per commodity and, when the problem has fixed costs, an
/// activation item. Selecting the fraction `x[j][k]` of item k ships `scale[k][j] * x[j][k]`
/// units of commodity k along arc j, where `scale[k][j]` is the individual capacity or, if that
/// is infinite, a bound on the flow of commodity k. Flow conservation is enforced by linking
/// rows in the parent.
#[derive(Debug, Clone)]
pub struct KnapsackDecomposition {
    n_nodes: usize,
    n_commodities: usize,
    blocks: Vec<KnapsackBlock>,
    /// The flow represented by fully selecting item k of knapsack j, indexed (k, j)
    scale: Vec<Vec<Flow>>,
    /// Whether the knapsacks carry an activation item
    activation: bool,
    /// Conservation rows in (commodity, node) order, followed by any strong forcing rows
    rows: Vec<RowConstraint>,
}

impl KnapsackDecomposition {
    /// The objective coefficient of selecting an item whose arc the commodity can't use. It
    /// exceeds the objective of any selection of usable items, so no optimal solution selects it.
    fn penalty(problem: &Problem, scale: &[Vec<Flow>]) -> f64 {
        let flow_costs = iproduct!(0..problem.n_commodities(), 0..problem.n_arcs())
            .filter(|&(k, j)| problem.cost(k, j) < INF)
            .map(|(k, j)| problem.cost(k, j).abs() * scale[k][j])
            .sum::<f64>();
        let fixed_costs = problem
            .fixed_costs()
            .map_or(0.0, |f| f.iter().map(|c| c.abs()).sum::<f64>());

        1.0 + flow_costs + fixed_costs
    }

    fn usable(problem: &Problem, k: CommodityIndex, j: ArcIndex) -> bool {
        let arc = problem.arc(j);
        problem.exists(k, j)
            && problem.deficit(k, arc.start) < INF
            && problem.deficit(k, arc.end) < INF
    }

    fn conservation_rows(&self, problem: &Problem) -> Vec<RowConstraint> {
        let mut rows = Vec::with_capacity(self.n_commodities * self.n_nodes);
        for k in 0..self.n_commodities {
            for i in 0..self.n_nodes {
                let mut row = RowConstraint::new(format!("conservation_{}_{}", k, i));
                let deficit = problem.deficit(k, i);
                if deficit == INF {
                    row.set_both(0.0);
                    rows.push(row);
                    continue;
                }

                let coeffs = problem
                    .arcs()
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| self.scale[k][*j] != 0.0)
                    .filter_map(|(j, arc)| {
                        let var = Var { block: j, index: k };
                        match (arc.start == i, arc.end == i) {
                            (true, _) => Some((var, self.scale[k][j])),
                            (_, true) => Some((var, -self.scale[k][j])),
                            _ => None,
                        }
                    })
                    .collect();

                row.set_function(LinearFunction::new(coeffs, 0.0));
                row.set_both(-deficit);
                rows.push(row);
            }
        }
        rows
    }

    /// `x[j][k] <= y[j]` for every commodity k and arc j, in (k, j) order. Pairs where the arc
    /// can't be used get a row too, so row `k * n_arcs + j` always belongs to (k, j).
    fn forcing_rows(&self, problem: &Problem) -> Vec<RowConstraint> {
        let activation = self.n_commodities;
        (self.n_commodities, problem.n_arcs())
            .rows_with(|(k, j)| {
                let mut row = RowConstraint::new(format!("forcing_{}_{}", k, j));
                row.set_function(LinearFunction::new(
                    vec![
                        (Var { block: j, index: k }, 1.0),
                        (Var { block: j, index: activation }, -1.0),
                    ],
                    0.0,
                ));
                row.set_rhs(0.0);
                row
            })
            .into_iter()
            .flatten()
            .collect()
    }

    /// The knapsack scale of commodity k on arc j
    pub fn scale(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.scale[k][j]
    }

    pub fn has_activation(&self) -> bool {
        self.activation
    }
}

impl Decomposition for KnapsackDecomposition {
    fn build(problem: &Problem) -> Result<Self> {
        let n_comm = problem.n_commodities();
        let n_arcs = problem.n_arcs();

        let unbounded = (0..n_comm).any(|k| {
            (0..n_arcs).any(|j| Self::usable(problem, k, j) && problem.capacity(k, j) >= INF)
        });
        let bounds = match unbounded {
            true => flow_bounds(
                problem.n_nodes(),
                &problem.costs,
                &problem.capacities,
                &problem.deficits,
                &problem.shared,
                0.0,
                0.0,
            )?,
            false => Vec::new(),
        };

        let scale = (0..n_comm)
            .map(|k| {
                (0..n_arcs)
                    .map(|j| match problem.capacity(k, j) {
                        _ if !Self::usable(problem, k, j) => 0.0,
                        u if u < INF => u,
                        _ => bounds[k].min(problem.shared_capacity(j)),
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let activation = problem.has_fixed_costs();
        let penalty = Self::penalty(problem, &scale);
        debug!("knapsack penalty for unusable arcs: {}", penalty);

        let blocks = (0..n_arcs)
            .map(|j| {
                let shared = match problem.shared_capacity(j) {
                    u if u < INF => u,
                    _ => scale.iter().map(|row| row[j]).sum(),
                };

                let mut items = (0..n_comm)
                    .map(|k| match Self::usable(problem, k, j) {
                        true => Item {
                            weight: scale[k][j],
                            profit: problem.cost(k, j) * scale[k][j],
                            integer: false,
                        },
                        false => Item {
                            weight: 0.0,
                            profit: penalty,
                            integer: false,
                        },
                    })
                    .collect::<Vec<_>>();

                if activation {
                    items.push(Item {
                        weight: -shared,
                        profit: problem.fixed_cost(j),
                        integer: true,
                    });
                }

                let bound = if activation { 0.0 } else { shared };
                KnapsackBlock::load(j, bound, items)
            })
            .collect();

        Ok(KnapsackDecomposition {
            n_nodes: problem.n_nodes(),
            n_commodities: n_comm,
            blocks,
            scale,
            activation,
            rows: Vec::new(),
        })
    }

    fn formulation(&self) -> Formulation {
        Formulation::Knapsack
    }

    fn generate_constraints(&mut self, problem: &Problem, strong_forcing: bool) -> Result<()> {
        let mut rows = self.conservation_rows(problem);
        match (strong_forcing, self.activation) {
            (true, true) => rows.extend(self.forcing_rows(problem)),
            (true, false) => warn!("strong forcing requested without fixed costs, ignored"),
            _ => (),
        }

        for block in &mut self.blocks {
            block.generate_constraints();
        }

        debug!("{} linking rows", rows.len());
        self.rows = rows;
        Ok(())
    }

    fn flow(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.scale[k][j] * self.blocks[j].selection(k)
    }

    fn flow_variable(&self, k: CommodityIndex, j: ArcIndex) -> Option<Var> {
        self.blocks[j].var(k)
    }

    fn activation(&self, j: ArcIndex) -> f64 {
        match self.activation {
            true => self.blocks[j].selection(self.n_commodities),
            false => 0.0,
        }
    }

    fn potential(&self, k: CommodityIndex, i: NodeIndex) -> f64 {
        self.rows
            .get(k * self.n_nodes + i)
            .map_or(0.0, |r| r.dual())
    }

    fn set_potential(&mut self, k: CommodityIndex, i: NodeIndex, potential: f64) {
        if let Some(r) = self.rows.get_mut(k * self.n_nodes + i) {
            r.set_dual(potential);
        }
    }

    fn dual(&self, j: ArcIndex) -> f64 {
        self.blocks[j].capacity_dual()
    }

    fn set_dual(&mut self, j: ArcIndex, dual: f64) {
        self.blocks[j].set_capacity_dual(dual);
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
        &self.rows
    }
}
