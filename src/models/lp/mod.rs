use std::collections::HashMap;

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::models::mmcf::MmcfModel;
use crate::models::utils::{RowConstraint, Var};
use crate::problem::INF;

/// The result of solving a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpOutcome {
    pub objective: f64,
}

/// Solves the continuous relaxation of a built model with the pure Rust `minilp` backend of
/// `good_lp`. Integer variables are relaxed to their bounds, and dual values are left untouched
/// as the backend does not report them.
pub struct LpSolver {}

impl LpSolver {
    pub fn solve(model: &mut MmcfModel) -> Result<LpOutcome> {
        if !model.constraints_built() {
            return Err(Error::Logic(
                "the abstract representation must be built before it is solved".into(),
            ));
        }
        info!("Solving the LP relaxation of {}", model.problem());

        let mut vars = ProblemVariables::new();
        let mut handles = HashMap::new();
        let mut objective = Expression::default();

        for sm in model.sub_models() {
            for (index, v) in sm.variables().iter().enumerate() {
                let mut def = variable().min(v.lower);
                if v.upper < INF {
                    def = def.max(v.upper);
                }
                let var = sm
                    .var(index)
                    .ok_or_else(|| Error::Logic(format!("no variable {} in {}", index, sm.name())))?;
                handles.insert(var, vars.add(def));
            }
            for &(v, c) in sm.objective().coeffs() {
                objective.add_mul(c, lookup(&handles, v)?);
            }
        }

        let mut rows: Vec<&RowConstraint> = Vec::new();
        for sm in model.sub_models() {
            rows.extend(sm.constraints());
        }
        rows.extend(model.constraints());

        let mut problem = vars.minimise(objective).using(default_solver);
        let mut n_rows = 0;
        for row in rows {
            let function = row.function();
            let (lhs, rhs) = (row.lhs() - function.constant(), row.rhs() - function.constant());
            if function.is_empty() {
                if lhs > 0.0 || rhs < 0.0 {
                    return Err(Error::Solver(format!("row {} can't be satisfied", row.name())));
                }
                continue;
            }

            let mut expr = Expression::default();
            for &(v, c) in function.coeffs() {
                expr.add_mul(c, lookup(&handles, v)?);
            }

            if row.is_equality() {
                problem = problem.with(constraint!(expr == rhs));
                n_rows += 1;
                continue;
            }
            if lhs > -INF {
                problem = problem.with(constraint!(expr.clone() >= lhs));
                n_rows += 1;
            }
            if rhs < INF {
                problem = problem.with(constraint!(expr <= rhs));
                n_rows += 1;
            }
        }
        debug!("LP has {} variables and {} rows", handles.len(), n_rows);

        let solution = problem
            .solve()
            .map_err(|err| Error::Solver(err.to_string()))?;

        for sm in model.sub_models_mut() {
            for index in 0..sm.variables().len() {
                if let Some(var) = sm.var(index) {
                    let value = solution.value(lookup(&handles, var)?);
                    sm.set_value(index, value);
                }
            }
        }

        let objective = model.objective_value();
        info!("Optimal objective value {}", objective);
        Ok(LpOutcome { objective })
    }
}

fn lookup(handles: &HashMap<Var, good_lp::Variable>, v: Var) -> Result<good_lp::Variable> {
    handles
        .get(&v)
        .copied()
        .ok_or_else(|| Error::Logic(format!("unknown variable {:?}", v)))
}
