use std::{fmt, fs::File, io::Read, path::Path};

use log::{info, warn};
use serde::Deserialize;

use crate::error::{Error, Result};

/// The type used for flow quantities, capacities and deficits
pub type Flow = f64;
/// The type used for costs
pub type Cost = f64;

pub type NodeIndex = usize;
pub type ArcIndex = usize;
pub type CommodityIndex = usize;

/// The "infinite" value. A cost equal to `INF` marks an arc that does not exist for a commodity,
/// a capacity equal to `INF` is unbounded and a deficit equal to `INF` marks a node that has been
/// removed for a commodity.
pub const INF: f64 = f64::INFINITY;

/// A directed arc between two distinct nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arc {
    /// The node in which the arc begins
    pub start: NodeIndex,
    /// The node in which the arc ends
    pub end: NodeIndex,
}

impl Arc {
    pub fn new(start: NodeIndex, end: NodeIndex) -> Arc {
        Arc { start, end }
    }
}

/// The arcs for which some constraint has not been proven redundant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveSet {
    /// Every arc is active
    All,
    /// Only these arcs are active, sorted ascending
    Subset(Vec<ArcIndex>),
}

impl Default for ActiveSet {
    fn default() -> Self {
        ActiveSet::All
    }
}

impl ActiveSet {
    /// Builds the set from one flag per arc, collapsing to `All` when every flag is set.
    pub fn from_flags(flags: &[bool]) -> ActiveSet {
        let subset = flags
            .iter()
            .enumerate()
            .filter(|(_, &active)| active)
            .map(|(j, _)| j)
            .collect::<Vec<_>>();

        if subset.len() == flags.len() {
            ActiveSet::All
        } else {
            ActiveSet::Subset(subset)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ActiveSet::All)
    }

    pub fn contains(&self, arc: ArcIndex) -> bool {
        match self {
            ActiveSet::All => true,
            ActiveSet::Subset(arcs) => arcs.binary_search(&arc).is_ok(),
        }
    }

    /// The number of active arcs in a network with `n_arcs` arcs
    pub fn len(&self, n_arcs: usize) -> usize {
        match self {
            ActiveSet::All => n_arcs,
            ActiveSet::Subset(arcs) => arcs.len(),
        }
    }

    /// The active arcs, in ascending order, of a network with `n_arcs` arcs
    pub fn indices(&self, n_arcs: usize) -> Vec<ArcIndex> {
        match self {
            ActiveSet::All => (0..n_arcs).collect(),
            ActiveSet::Subset(arcs) => arcs.clone(),
        }
    }
}

/// Where the data of a row is (also) found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// The row is not a copy of anything seen before it
    Own,
    /// The row is identical to the row of an earlier commodity
    Commodity(CommodityIndex),
    /// The row is identical to the shared capacity vector
    Shared,
}

/// Duplicate detection result for one family of per-commodity rows (deficits, capacities or costs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateMarkers {
    /// No duplicate detection has been run
    Unchecked,
    /// Detection was run and every row is unique
    NoneFound,
    /// `flags[k]` is set when commodity k belongs to a group of identical rows, `sources[k]`
    /// tells which earlier row commodity k copies
    Found {
        flags: Vec<bool>,
        sources: Vec<RowSource>,
    },
}

impl Default for DuplicateMarkers {
    fn default() -> Self {
        DuplicateMarkers::Unchecked
    }
}

impl DuplicateMarkers {
    pub fn is_duplicate(&self, k: CommodityIndex) -> bool {
        match self {
            DuplicateMarkers::Found { flags, .. } => flags.get(k).copied().unwrap_or(false),
            _ => false,
        }
    }

    pub fn source(&self, k: CommodityIndex) -> RowSource {
        match self {
            DuplicateMarkers::Found { sources, .. } => {
                sources.get(k).copied().unwrap_or(RowSource::Own)
            }
            _ => RowSource::Own,
        }
    }

    pub fn flags(&self) -> Option<&[bool]> {
        match self {
            DuplicateMarkers::Found { flags, .. } => Some(flags),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProblemConstructionError {
    /// At least two nodes are needed
    TooFewNodes(usize),
    /// The network has no arcs
    NoArcs,
    /// There must be at least one commodity
    NoCommodities,
    /// The arc starts and ends in the same node
    SelfLoop { arc: ArcIndex, node: NodeIndex },
    /// The arc refers to a node name that does not exist
    NodeOutOfRange { arc: ArcIndex, node: usize },
    /// The number of rows of a per-commodity table does not match the number of commodities
    CommodityCountMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A row of a per-commodity table has the wrong length
    RowSizeMismatch {
        table: &'static str,
        commodity: CommodityIndex,
        expected: usize,
        actual: usize,
    },
    /// The shared capacity or fixed cost vector has the wrong length
    ArcVectorSizeMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A capacity is negative, `commodity` is `None` for the shared capacity
    NegativeCapacity {
        commodity: Option<CommodityIndex>,
        arc: ArcIndex,
    },
    /// A table contains NaN
    NotANumber { table: &'static str },
}

/// The data of a multicommodity min cost flow problem.
#[derive(Debug, Clone)]
pub struct Problem {
    /// The number of nodes
    pub(crate) n_nodes: usize,
    /// The arcs of the network, shared by all commodities
    pub(crate) arcs: Vec<Arc>,
    /// Cost of arc j for commodity k, indexed (k, j)
    pub(crate) costs: Vec<Vec<Cost>>,
    /// Individual capacity of arc j for commodity k, indexed (k, j)
    pub(crate) capacities: Vec<Vec<Flow>>,
    /// Deficit of node i for commodity k, indexed (k, i). Negative for supply, positive for demand.
    pub(crate) deficits: Vec<Vec<Flow>>,
    /// Capacity of arc j shared by all commodities
    pub(crate) shared: Vec<Flow>,
    /// Fixed cost of using arc j
    pub(crate) fixed_costs: Option<Vec<Cost>>,
    /// The name of the first node in the input
    pub(crate) first_node: usize,
    /// The arcs with a shared capacity constraint
    pub(crate) active: ActiveSet,
    /// The arcs with an individual capacity constraint, per commodity
    pub(crate) active_k: Vec<ActiveSet>,
    pub(crate) deficit_copies: DuplicateMarkers,
    pub(crate) capacity_copies: DuplicateMarkers,
    pub(crate) cost_copies: DuplicateMarkers,
}

impl Problem {
    /// Builds a problem out of its tables. Per-commodity tables are indexed (commodity, arc) or
    /// (commodity, node), and `arcs` uses 0-based node indices. The capacity of an arc that does
    /// not exist for a commodity (cost `INF`) is set to 0.
    pub fn new(
        n_nodes: usize,
        arcs: Vec<Arc>,
        costs: Vec<Vec<Cost>>,
        mut capacities: Vec<Vec<Flow>>,
        deficits: Vec<Vec<Flow>>,
        shared: Vec<Flow>,
        fixed_costs: Option<Vec<Cost>>,
    ) -> std::result::Result<Problem, ProblemConstructionError> {
        use ProblemConstructionError::*;

        if n_nodes <= 1 {
            return Err(TooFewNodes(n_nodes));
        }
        if arcs.is_empty() {
            return Err(NoArcs);
        }
        if costs.is_empty() {
            return Err(NoCommodities);
        }

        for (j, arc) in arcs.iter().enumerate() {
            for node in [arc.start, arc.end] {
                if node >= n_nodes {
                    return Err(NodeOutOfRange { arc: j, node });
                }
            }
            if arc.start == arc.end {
                return Err(SelfLoop {
                    arc: j,
                    node: arc.start,
                });
            }
        }

        let n_comm = costs.len();
        let n_arcs = arcs.len();
        Self::check_table("costs", &costs, n_comm, n_arcs)?;
        Self::check_table("capacities", &capacities, n_comm, n_arcs)?;
        Self::check_table("deficits", &deficits, n_comm, n_nodes)?;
        Self::check_vector("shared capacities", &shared, n_arcs)?;
        if let Some(fixed) = &fixed_costs {
            Self::check_vector("fixed costs", fixed, n_arcs)?;
        }

        for (k, row) in capacities.iter().enumerate() {
            if let Some(j) = row.iter().position(|&u| u < 0.0) {
                return Err(NegativeCapacity {
                    commodity: Some(k),
                    arc: j,
                });
            }
        }
        if let Some(j) = shared.iter().position(|&u| u < 0.0) {
            return Err(NegativeCapacity {
                commodity: None,
                arc: j,
            });
        }

        for (c, u) in costs.iter().zip(capacities.iter_mut()) {
            for (&c, u) in c.iter().zip(u.iter_mut()) {
                if c == INF {
                    *u = 0.0;
                }
            }
        }

        let active_k = costs
            .iter()
            .zip(&capacities)
            .map(|(c, u)| {
                let flags = c
                    .iter()
                    .zip(u)
                    .map(|(&c, &u)| c < INF && u < INF)
                    .collect::<Vec<_>>();
                ActiveSet::from_flags(&flags)
            })
            .collect();

        Ok(Problem {
            n_nodes,
            arcs,
            costs,
            capacities,
            deficits,
            shared,
            fixed_costs,
            first_node: 0,
            active: ActiveSet::All,
            active_k,
            deficit_copies: DuplicateMarkers::Unchecked,
            capacity_copies: DuplicateMarkers::Unchecked,
            cost_copies: DuplicateMarkers::Unchecked,
        })
    }

    fn check_table(
        table: &'static str,
        rows: &[Vec<f64>],
        n_comm: usize,
        len: usize,
    ) -> std::result::Result<(), ProblemConstructionError> {
        if rows.len() != n_comm {
            return Err(ProblemConstructionError::CommodityCountMismatch {
                table,
                expected: n_comm,
                actual: rows.len(),
            });
        }
        for (k, row) in rows.iter().enumerate() {
            if row.len() != len {
                return Err(ProblemConstructionError::RowSizeMismatch {
                    table,
                    commodity: k,
                    expected: len,
                    actual: row.len(),
                });
            }
            if row.iter().any(|x| x.is_nan()) {
                return Err(ProblemConstructionError::NotANumber { table });
            }
        }
        Ok(())
    }

    fn check_vector(
        table: &'static str,
        values: &[f64],
        len: usize,
    ) -> std::result::Result<(), ProblemConstructionError> {
        if values.len() != len {
            return Err(ProblemConstructionError::ArcVectorSizeMismatch {
                table,
                expected: len,
                actual: values.len(),
            });
        }
        if values.iter().any(|x| x.is_nan()) {
            return Err(ProblemConstructionError::NotANumber { table });
        }
        Ok(())
    }

    /// Reads a problem from its JSON description
    pub fn from_reader<R: Read>(reader: R) -> Result<Problem> {
        let raw: RawProblem = serde_json::from_reader(reader)?;
        raw.into_problem()
    }

    /// Reads a problem from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Problem> {
        let path = path.as_ref();
        info!("Loading MMCF instance from {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// The number of nodes
    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    /// The number of arcs
    pub fn n_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// The number of commodities
    pub fn n_commodities(&self) -> usize {
        self.costs.len()
    }

    /// The number of arcs with a shared capacity constraint
    pub fn n_coupling(&self) -> usize {
        self.active.len(self.n_arcs())
    }

    /// The name the input used for the node with index 0
    pub fn first_node(&self) -> usize {
        self.first_node
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn arc(&self, j: ArcIndex) -> Arc {
        self.arcs[j]
    }

    pub fn cost(&self, k: CommodityIndex, j: ArcIndex) -> Cost {
        self.costs[k][j]
    }

    /// The costs of commodity k, indexed by arc
    pub fn costs(&self, k: CommodityIndex) -> &[Cost] {
        &self.costs[k]
    }

    pub fn capacity(&self, k: CommodityIndex, j: ArcIndex) -> Flow {
        self.capacities[k][j]
    }

    /// The individual capacities of commodity k, indexed by arc
    pub fn capacities(&self, k: CommodityIndex) -> &[Flow] {
        &self.capacities[k]
    }

    pub fn deficit(&self, k: CommodityIndex, i: NodeIndex) -> Flow {
        self.deficits[k][i]
    }

    /// The deficits of commodity k, indexed by node
    pub fn deficits(&self, k: CommodityIndex) -> &[Flow] {
        &self.deficits[k]
    }

    pub fn shared_capacity(&self, j: ArcIndex) -> Flow {
        self.shared[j]
    }

    pub fn shared_capacities(&self) -> &[Flow] {
        &self.shared
    }

    pub fn fixed_costs(&self) -> Option<&[Cost]> {
        self.fixed_costs.as_deref()
    }

    /// The fixed cost of arc j, 0 if the problem has none
    pub fn fixed_cost(&self, j: ArcIndex) -> Cost {
        self.fixed_costs.as_ref().map_or(0.0, |f| f[j])
    }

    /// Whether some arc carries a nonzero fixed cost
    pub fn has_fixed_costs(&self) -> bool {
        self.fixed_costs
            .as_ref()
            .map_or(false, |f| f.iter().any(|&c| c != 0.0))
    }

    /// Whether arc j can be used by commodity k
    pub fn exists(&self, k: CommodityIndex, j: ArcIndex) -> bool {
        self.costs[k][j] < INF
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    pub fn active_k(&self, k: CommodityIndex) -> &ActiveSet {
        &self.active_k[k]
    }

    pub fn deficit_copies(&self) -> &DuplicateMarkers {
        &self.deficit_copies
    }

    pub fn capacity_copies(&self) -> &DuplicateMarkers {
        &self.capacity_copies
    }

    pub fn cost_copies(&self) -> &DuplicateMarkers {
        &self.cost_copies
    }

    /// The arcs leaving and entering node i
    pub fn incident(&self, i: NodeIndex) -> (Vec<ArcIndex>, Vec<ArcIndex>) {
        let out = (0..self.n_arcs())
            .filter(|&j| self.arcs[j].start == i)
            .collect();
        let into = (0..self.n_arcs())
            .filter(|&j| self.arcs[j].end == i)
            .collect();
        (out, into)
    }

    /// Sets the fixed cost of every arc to `lambda` times the average, over the commodities, of
    /// cost times capacity. Arcs that do not exist or have unbounded capacity for a commodity do
    /// not contribute.
    pub fn set_fixed_costs_from_mean(&mut self, lambda: f64) {
        let n_comm = self.n_commodities() as f64;
        let fixed = (0..self.n_arcs())
            .map(|j| {
                let mean = self
                    .costs
                    .iter()
                    .zip(&self.capacities)
                    .filter(|(c, u)| c[j] < INF && u[j] < INF)
                    .map(|(c, u)| c[j] * u[j] / n_comm)
                    .sum::<f64>();
                lambda * mean
            })
            .collect::<Vec<_>>();

        if fixed.iter().all(|&f| f == 0.0) {
            warn!("all fixed costs derived from the arc means are zero");
        }

        self.fixed_costs = Some(fixed);
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MMCF problem with {} commodities, {} nodes and {} arcs",
            self.n_commodities(),
            self.n_nodes(),
            self.n_arcs()
        )
    }
}

fn default_first_node() -> usize {
    1
}

/// A side constraint over the flows, `lower <= sum coeff * x[k][j] <= upper`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraConstraint {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    /// (commodity, arc, coefficient), 0-based
    pub terms: Vec<(usize, usize, f64)>,
}

/// The JSON encoding of a problem. Capacities and costs given as `null` are infinite, as are
/// deficits, which marks the node as removed for that commodity.
#[derive(Debug, Clone, Deserialize)]
struct RawProblem {
    nodes: usize,
    #[serde(default = "default_first_node")]
    first_node: usize,
    arcs: Vec<(usize, usize)>,
    costs: Vec<Vec<Option<f64>>>,
    capacities: Vec<Vec<Option<f64>>>,
    deficits: Vec<Vec<Option<f64>>>,
    shared_capacities: Vec<Option<f64>>,
    #[serde(default)]
    fixed_costs: Option<Vec<f64>>,
    #[serde(default)]
    extra_constraints: Vec<ExtraConstraint>,
}

impl RawProblem {
    fn into_problem(self) -> Result<Problem> {
        if !self.extra_constraints.is_empty() {
            return Err(Error::Logic(format!(
                "{} extra constraints given, extra constraints are not supported",
                self.extra_constraints.len()
            )));
        }

        let first = self.first_node;
        let mut arcs = Vec::with_capacity(self.arcs.len());
        for (j, &(s, e)) in self.arcs.iter().enumerate() {
            let node = |name: usize| {
                name.checked_sub(first)
                    .ok_or(ProblemConstructionError::NodeOutOfRange { arc: j, node: name })
            };
            arcs.push(Arc::new(node(s)?, node(e)?));
        }

        let unbounded = |rows: Vec<Vec<Option<f64>>>| {
            rows.into_iter()
                .map(|row| row.into_iter().map(|x| x.unwrap_or(INF)).collect())
                .collect::<Vec<Vec<f64>>>()
        };

        let mut problem = Problem::new(
            self.nodes,
            arcs,
            unbounded(self.costs),
            unbounded(self.capacities),
            unbounded(self.deficits),
            self.shared_capacities
                .into_iter()
                .map(|x| x.unwrap_or(INF))
                .collect(),
            self.fixed_costs,
        )?;
        problem.first_node = first;

        info!("Loaded {}", problem);
        Ok(problem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_commodities() -> Problem {
        Problem::new(
            3,
            vec![Arc::new(0, 1), Arc::new(1, 2), Arc::new(0, 2)],
            vec![vec![1.0, 1.0, 3.0], vec![2.0, INF, 1.0]],
            vec![vec![4.0, INF, 2.0], vec![1.0, 0.0, 5.0]],
            vec![vec![-4.0, 0.0, 4.0], vec![-2.0, 0.0, 2.0]],
            vec![5.0, 4.0, INF],
            None,
        )
        .unwrap()
    }

    #[test]
    fn rejects_self_loops() {
        let err = Problem::new(
            2,
            vec![Arc::new(1, 1)],
            vec![vec![1.0]],
            vec![vec![1.0]],
            vec![vec![0.0, 0.0]],
            vec![1.0],
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProblemConstructionError::SelfLoop { arc: 0, node: 1 });
    }

    #[test]
    fn rejects_malformed_tables() {
        let err = Problem::new(
            2,
            vec![Arc::new(0, 2)],
            vec![vec![1.0]],
            vec![vec![1.0]],
            vec![vec![0.0, 0.0]],
            vec![1.0],
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProblemConstructionError::NodeOutOfRange { arc: 0, node: 2 });

        let err = Problem::new(
            2,
            vec![Arc::new(0, 1)],
            vec![vec![1.0]],
            vec![vec![1.0, 2.0]],
            vec![vec![0.0, 0.0]],
            vec![1.0],
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProblemConstructionError::RowSizeMismatch {
                table: "capacities",
                ..
            }
        ));

        let err = Problem::new(
            2,
            vec![Arc::new(0, 1)],
            vec![vec![1.0]],
            vec![vec![1.0]],
            vec![vec![0.0, 0.0]],
            vec![-1.0],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProblemConstructionError::NegativeCapacity {
                commodity: None,
                arc: 0
            }
        );
    }

    #[test]
    fn individual_active_sets_skip_missing_and_unbounded_arcs() {
        let problem = two_commodities();
        assert_eq!(problem.active_k(0), &ActiveSet::Subset(vec![0, 2]));
        assert_eq!(problem.active_k(1), &ActiveSet::Subset(vec![0, 2]));
        assert!(problem.active().is_all());
        assert_eq!(problem.n_coupling(), 3);
    }

    #[test]
    fn missing_arcs_have_no_capacity() {
        let problem = Problem::new(
            2,
            vec![Arc::new(0, 1), Arc::new(1, 0)],
            vec![vec![INF, 1.0]],
            vec![vec![7.0, INF]],
            vec![vec![-1.0, 1.0]],
            vec![5.0, 5.0],
            None,
        )
        .unwrap();
        assert!(!problem.exists(0, 0));
        assert_eq!(problem.capacity(0, 0), 0.0);
        assert_eq!(problem.capacity(0, 1), INF);
        assert_eq!(problem.active_k(0), &ActiveSet::Subset(vec![]));
    }

    #[test]
    fn active_set_queries() {
        let set = ActiveSet::from_flags(&[true, false, true, true]);
        assert_eq!(set, ActiveSet::Subset(vec![0, 2, 3]));
        assert!(set.contains(2));
        assert!(!set.contains(1));
        assert_eq!(set.len(4), 3);
        assert_eq!(ActiveSet::from_flags(&[true, true]), ActiveSet::All);
        assert_eq!(ActiveSet::All.indices(3), vec![0, 1, 2]);
    }

    #[test]
    fn fixed_costs_from_mean() {
        let mut problem = two_commodities();
        assert!(!problem.has_fixed_costs());
        problem.set_fixed_costs_from_mean(2.0);
        // arc 0: (1*4 + 2*1) / 2 = 3, arc 1: both skipped, arc 2: (3*2 + 1*5) / 2 = 5.5
        assert_eq!(problem.fixed_costs(), Some(&[6.0, 0.0, 11.0][..]));
        assert!(problem.has_fixed_costs());
    }

    #[test]
    fn loads_json_with_unbounded_entries() {
        let json = r#"{
            "nodes": 3,
            "arcs": [[1, 2], [2, 3]],
            "costs": [[1.0, null]],
            "capacities": [[null, 3.0]],
            "deficits": [[-2.0, 2.0, null]],
            "shared_capacities": [4.0, null]
        }"#;
        let problem = Problem::from_reader(json.as_bytes()).unwrap();
        assert_eq!(problem.first_node(), 1);
        assert_eq!(problem.arc(1), Arc::new(1, 2));
        assert_eq!(problem.cost(0, 1), INF);
        assert_eq!(problem.capacity(0, 0), INF);
        assert_eq!(problem.deficit(0, 2), INF);
        assert_eq!(problem.shared_capacity(1), INF);
        assert_eq!(
            problem.to_string(),
            "MMCF problem with 1 commodities, 3 nodes and 2 arcs"
        );
    }

    #[test]
    fn extra_constraints_are_not_supported() {
        let json = r#"{
            "nodes": 2,
            "arcs": [[1, 2]],
            "costs": [[1.0]],
            "capacities": [[1.0]],
            "deficits": [[-1.0, 1.0]],
            "shared_capacities": [1.0],
            "extra_constraints": [{"lower": 0.0, "upper": 1.0, "terms": [[0, 0, 1.0]]}]
        }"#;
        let err = Problem::from_reader(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Logic(_)));
    }
}
