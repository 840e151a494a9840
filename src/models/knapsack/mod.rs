use log::trace;

use crate::models::utils::{
    LinearConstraint, LinearFunction, RowConstraint, SubModel, Var, VarType, Variable,
};
use crate::problem::INF;

/// An item that can be put in a knapsack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    /// The room the item takes, may be negative
    pub weight: f64,
    /// What it costs to select the item
    pub profit: f64,
    /// Whether the item must be taken as a whole
    pub integer: bool,
}

/// A knapsack with items selected in [0, 1]:
///
/// ```text
/// min   sum_i p_i x_i
/// s.t.  sum_i w_i x_i <= bound
///       0 <= x_i <= 1
/// ```
#[derive(Debug, Clone)]
pub struct KnapsackBlock {
    id: usize,
    name: String,
    bound: f64,
    items: Vec<Item>,
    variables: Vec<Variable>,
    objective: LinearFunction,
    /// The capacity row, empty until constraints are generated
    rows: Vec<RowConstraint>,
}

impl KnapsackBlock {
    pub fn load(id: usize, bound: f64, items: Vec<Item>) -> KnapsackBlock {
        let variables = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let name = format!("x_{}_{}", id, i);
                match item.integer {
                    true => Variable::binary(name),
                    false => Variable::cont(name, 0.0, 1.0),
                }
            })
            .collect();

        let coeffs = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.profit != 0.0)
            .map(|(i, item)| (Var { block: id, index: i }, item.profit))
            .collect();

        KnapsackBlock {
            id,
            name: format!("knapsack_{}", id),
            bound,
            items,
            variables,
            objective: LinearFunction::new(coeffs, 0.0),
            rows: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// How much of item i is selected
    pub fn selection(&self, i: usize) -> f64 {
        self.value(i)
    }

    /// The dual value of the capacity row, 0 until constraints are generated
    pub fn capacity_dual(&self) -> f64 {
        self.dual(0)
    }

    pub fn set_capacity_dual(&mut self, dual: f64) {
        self.set_dual(0, dual);
    }

    /// Whether item i has to be selected fully or not at all
    pub fn is_integer(&self, i: usize) -> bool {
        self.variables
            .get(i)
            .map_or(false, |v| v.vtype == VarType::Integer)
    }
}

impl SubModel for KnapsackBlock {
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
        if !self.rows.is_empty() {
            return;
        }

        let coeffs = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.weight != 0.0)
            .map(|(i, item)| {
                (
                    Var {
                        block: self.id,
                        index: i,
                    },
                    item.weight,
                )
            })
            .collect();

        let mut row = RowConstraint::new(format!("capacity_{}", self.id));
        row.set_function(LinearFunction::new(coeffs, 0.0));
        row.set_lhs(-INF);
        row.set_rhs(self.bound);
        self.rows = vec![row];

        trace!("generated the capacity row of {}", self.name);
    }

    fn constraints(&self) -> &[RowConstraint] {
        &self.rows
    }

    fn constraints_mut(&mut self) -> &mut [RowConstraint] {
        &mut self.rows
    }

    fn var(&self, index: usize) -> Option<Var> {
        (index < self.variables.len()).then(|| Var {
            block: self.id,
            index,
        })
    }
}
