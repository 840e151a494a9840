use std::fmt::Debug;

use crate::problem::INF;

/// Handle of a variable: the sub-model owning it and its position within the sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub block: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Continuous,
    Integer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub vtype: VarType,
    pub lower: f64,
    pub upper: f64,
    /// The value last written by a solver
    pub value: f64,
}

impl Variable {
    /// A continuous variable within `lower..=upper`
    pub fn cont(name: String, lower: f64, upper: f64) -> Variable {
        Variable {
            name,
            vtype: VarType::Continuous,
            lower,
            upper,
            value: 0.0,
        }
    }

    /// A variable restricted to {0, 1}
    pub fn binary(name: String) -> Variable {
        Variable {
            name,
            vtype: VarType::Integer,
            lower: 0.0,
            upper: 1.0,
            value: 0.0,
        }
    }
}

/// `constant + sum coeff * var`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearFunction {
    coeffs: Vec<(Var, f64)>,
    constant: f64,
}

impl LinearFunction {
    pub fn new(coeffs: Vec<(Var, f64)>, constant: f64) -> LinearFunction {
        LinearFunction { coeffs, constant }
    }

    pub fn coeffs(&self) -> &[(Var, f64)] {
        &self.coeffs
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// The value of the function when each variable takes the value given by `value`
    pub fn evaluate<F: Fn(Var) -> f64>(&self, value: F) -> f64 {
        self.constant + self.coeffs.iter().map(|&(v, c)| c * value(v)).sum::<f64>()
    }
}

/// The operations a linear constraint `lhs <= f(x) <= rhs` supports.
pub trait LinearConstraint {
    fn set_lhs(&mut self, lhs: f64);

    fn set_rhs(&mut self, rhs: f64);

    /// Turns the constraint into the equality `f(x) == value`
    fn set_both(&mut self, value: f64) {
        self.set_lhs(value);
        self.set_rhs(value);
    }

    fn set_function(&mut self, function: LinearFunction);
}

/// A constraint `lhs <= f(x) <= rhs`, where either side may be infinite, together with its dual
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct RowConstraint {
    name: String,
    function: LinearFunction,
    lhs: f64,
    rhs: f64,
    dual: f64,
}

impl RowConstraint {
    /// A free row, `-inf <= 0 <= inf`
    pub fn new(name: String) -> RowConstraint {
        RowConstraint {
            name,
            function: LinearFunction::default(),
            lhs: -INF,
            rhs: INF,
            dual: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> &LinearFunction {
        &self.function
    }

    pub fn lhs(&self) -> f64 {
        self.lhs
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    pub fn is_equality(&self) -> bool {
        self.lhs == self.rhs
    }

    pub fn dual(&self) -> f64 {
        self.dual
    }

    pub fn set_dual(&mut self, dual: f64) {
        self.dual = dual;
    }

    /// Whether the row holds, within `tol`, for the given values
    pub fn is_satisfied<F: Fn(Var) -> f64>(&self, value: F, tol: f64) -> bool {
        let v = self.function.evaluate(value);
        v >= self.lhs - tol && v <= self.rhs + tol
    }
}

impl LinearConstraint for RowConstraint {
    fn set_lhs(&mut self, lhs: f64) {
        self.lhs = lhs;
    }

    fn set_rhs(&mut self, rhs: f64) {
        self.rhs = rhs;
    }

    fn set_function(&mut self, function: LinearFunction) {
        self.function = function;
    }
}

/// A sub-model of a decomposition: a set of variables it owns, a (minimization) objective over
/// them and the constraints it generates on its own.
pub trait SubModel: Debug {
    fn name(&self) -> &str;

    fn variables(&self) -> &[Variable];

    fn variables_mut(&mut self) -> &mut [Variable];

    fn objective(&self) -> &LinearFunction;

    /// Generates the constraints of the sub-model. Calling it again does nothing.
    fn generate_constraints(&mut self);

    /// The generated constraints, empty before `generate_constraints` has been called
    fn constraints(&self) -> &[RowConstraint];

    fn constraints_mut(&mut self) -> &mut [RowConstraint];

    /// The handle of variable `index`
    fn var(&self, index: usize) -> Option<Var>;

    /// The value of variable `index`, 0 if there is no such variable
    fn value(&self, index: usize) -> f64 {
        self.variables().get(index).map_or(0.0, |v| v.value)
    }

    fn set_value(&mut self, index: usize, value: f64) {
        if let Some(v) = self.variables_mut().get_mut(index) {
            v.value = value;
        }
    }

    /// The dual value of constraint `index`, 0 if there is no such constraint
    fn dual(&self, index: usize) -> f64 {
        self.constraints().get(index).map_or(0.0, |c| c.dual())
    }

    fn set_dual(&mut self, index: usize, dual: f64) {
        if let Some(c) = self.constraints_mut().get_mut(index) {
            c.set_dual(dual);
        }
    }
}

/// Create rows over a grid of indices with a closure
pub trait RowsWith {
    type Out;

    fn rows_with<F: FnMut(Self) -> RowConstraint>(&self, func: F) -> Self::Out
    where
        Self: Sized;
}

impl RowsWith for usize {
    type Out = Vec<RowConstraint>;

    fn rows_with<F: FnMut(Self) -> RowConstraint>(&self, func: F) -> Self::Out {
        (0..*self).map(func).collect()
    }
}

impl RowsWith for (usize, usize) {
    type Out = Vec<<usize as RowsWith>::Out>;

    fn rows_with<F: FnMut(Self) -> RowConstraint>(&self, mut func: F) -> Self::Out {
        let mut out = Vec::with_capacity(self.0);
        for i in 0..self.0 {
            out.push(self.1.rows_with(|j| func((i, j))));
        }
        out
    }
}
