use log::trace;

use crate::models::utils::{
    LinearConstraint, LinearFunction, RowConstraint, RowsWith, SubModel, Var, Variable,
};
use crate::problem::{Arc, ArcIndex, Cost, Flow, NodeIndex, INF};

/// A single commodity min cost flow problem over a directed network:
///
/// ```text
/// min   sum_j c_j x_j
/// s.t.  sum_{j out of i} x_j - sum_{j into i} x_j = -b_i    for every node i
///       0 <= x_j <= u_j
/// ```
///
/// where `b_i` is the deficit of node i. The dual value of the row of node i is its potential.
#[derive(Debug, Clone)]
pub struct McfBlock {
    id: usize,
    name: String,
    arcs: Vec<Arc>,
    deficits: Vec<Flow>,
    variables: Vec<Variable>,
    objective: LinearFunction,
    /// One row per node, empty until constraints are generated
    node_rows: Vec<RowConstraint>,
}

impl McfBlock {
    /// Sets up the flow variables of the block with handle `id`. An arc with an infinite cost,
    /// or touching a node whose deficit is infinite, can't carry flow. An infinite capacity
    /// leaves the flow unbounded.
    pub fn load(
        id: usize,
        arcs: &[Arc],
        capacities: &[Flow],
        costs: &[Cost],
        deficits: &[Flow],
    ) -> McfBlock {
        let removed = |i: NodeIndex| deficits[i] == INF;

        let variables = arcs
            .iter()
            .enumerate()
            .map(|(j, arc)| {
                let usable = costs[j] < INF && !removed(arc.start) && !removed(arc.end);
                let upper = if usable { capacities[j] } else { 0.0 };
                Variable::cont(format!("x_{}_{}", id, j), 0.0, upper)
            })
            .collect::<Vec<_>>();

        let coeffs = variables
            .iter()
            .enumerate()
            .filter(|(j, v)| v.upper > 0.0 && costs[*j] != 0.0)
            .map(|(j, _)| (Var { block: id, index: j }, costs[j]))
            .collect();

        McfBlock {
            id,
            name: format!("mcf_{}", id),
            arcs: arcs.to_vec(),
            deficits: deficits.to_vec(),
            variables,
            objective: LinearFunction::new(coeffs, 0.0),
            node_rows: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn n_nodes(&self) -> usize {
        self.deficits.len()
    }

    pub fn n_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// The flow on arc j
    pub fn flow(&self, j: ArcIndex) -> Flow {
        self.value(j)
    }

    /// The potential of node i, 0 until constraints are generated
    pub fn potential(&self, i: NodeIndex) -> f64 {
        self.dual(i)
    }

    pub fn set_potential(&mut self, i: NodeIndex, potential: f64) {
        self.set_dual(i, potential);
    }
}

impl SubModel for McfBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn variables_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    fn objective(&self) -> &LinearFunction {
        &self.objective
    }

    fn generate_constraints(&mut self) {
        if !self.node_rows.is_empty() {
            return;
        }

        let id = self.id;
        let arcs = &self.arcs;
        let deficits = &self.deficits;
        let variables = &self.variables;

        self.node_rows = self.deficits.len().rows_with(|i| {
            let mut row = RowConstraint::new(format!("flow_{}_{}", id, i));
            // a removed node keeps an empty row so that node indices and row indices agree
            if deficits[i] == INF {
                row.set_both(0.0);
                return row;
            }

            let coeffs = arcs
                .iter()
                .enumerate()
                .filter(|(j, _)| variables[*j].upper > 0.0)
                .filter_map(|(j, arc)| {
                    let var = Var { block: id, index: j };
                    match (arc.start == i, arc.end == i) {
                        (true, _) => Some((var, 1.0)),
                        (_, true) => Some((var, -1.0)),
                        _ => None,
                    }
                })
                .collect();

            row.set_function(LinearFunction::new(coeffs, 0.0));
            row.set_both(-deficits[i]);
            row
        });

        trace!("generated {} node rows for {}", self.node_rows.len(), self.name);
    }

    fn constraints(&self) -> &[RowConstraint] {
        &self.node_rows
    }

    fn constraints_mut(&mut self) -> &mut [RowConstraint] {
        &mut self.node_rows
    }

    fn var(&self, index: usize) -> Option<Var> {
        (index < self.variables.len()).then(|| Var {
            block: self.id,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> McfBlock {
        McfBlock::load(
            2,
            &[Arc::new(0, 1), Arc::new(1, 2), Arc::new(0, 2)],
            &[3.0, INF, 1.0],
            &[1.0, 1.0, INF],
            &[-3.0, 0.0, 3.0],
        )
    }

    #[test]
    fn variables_follow_costs_and_capacities() {
        let block = triangle();
        assert_eq!(block.variables().len(), 3);
        assert_eq!(block.variables()[0].upper, 3.0);
        assert_eq!(block.variables()[1].upper, INF);
        // the arc with infinite cost can't be used
        assert_eq!(block.variables()[2].upper, 0.0);
        assert_eq!(block.objective().coeffs().len(), 2);
        assert_eq!(block.var(1), Some(Var { block: 2, index: 1 }));
        assert_eq!(block.var(3), None);
    }

    #[test]
    fn node_rows_balance_the_deficits() {
        let mut block = triangle();
        assert!(block.constraints().is_empty());
        assert_eq!(block.potential(0), 0.0);

        block.generate_constraints();
        block.generate_constraints();
        assert_eq!(block.constraints().len(), 3);

        let source = &block.constraints()[0];
        assert!(source.is_equality());
        assert_eq!(source.rhs(), 3.0);
        assert_eq!(source.function().coeffs(), &[(Var { block: 2, index: 0 }, 1.0)]);

        // shipping 3 units along 0 -> 1 -> 2 satisfies every row
        for j in 0..2 {
            block.set_value(j, 3.0);
        }
        let value = |v: Var| block.value(v.index);
        assert!(block.constraints().iter().all(|r| r.is_satisfied(value, 1e-9)));
        assert_eq!(block.flow(1), 3.0);

        block.set_potential(2, -4.0);
        assert_eq!(block.potential(2), -4.0);
    }

    #[test]
    fn removed_nodes_disable_their_arcs() {
        let mut block = McfBlock::load(
            9,
            &[Arc::new(0, 1), Arc::new(1, 2)],
            &[1.0, 1.0],
            &[1.0, 1.0],
            &[-1.0, 1.0, INF],
        );
        assert_eq!(block.variables()[1].upper, 0.0);

        block.generate_constraints();
        let removed = &block.constraints()[2];
        assert!(removed.function().is_empty());
        assert_eq!(removed.rhs(), 0.0);
    }
}
