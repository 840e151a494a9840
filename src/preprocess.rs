use log::{debug, info};
use serde::Serialize;

use crate::{
    config::PreprocessBounds,
    error::{Error, Result},
    problem::{ActiveSet, Cost, DuplicateMarkers, Flow, Problem, RowSource, INF},
};

/// What preprocessing did to a problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessReport {
    /// The number of (commodity, arc) pairs that preprocessing declared non-existent
    pub removed: usize,
    /// The number of shared capacity constraints that are still needed
    pub coupling: usize,
    /// The number of individual capacity constraints still needed, per commodity
    pub individual: Vec<usize>,
    /// Upper bound on the total flow of each commodity
    pub flow_bounds: Vec<Flow>,
}

impl PreprocessBounds {
    fn check(&self) -> Result<()> {
        let all = [
            ("IncUk", self.inc_uk),
            ("DecUk", self.dec_uk),
            ("IncUjk", self.inc_ujk),
            ("DecUjk", self.dec_ujk),
            ("ChgDfct", self.chg_dfct),
            ("DecCsts", self.dec_csts),
        ];
        for (name, value) in all {
            if value.is_nan() || value < 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        if self.chg_dfct >= INF {
            return Err(Error::InvalidArgument("infinite ChgDfct".into()));
        }
        if self.dec_csts >= INF {
            return Err(Error::InvalidArgument("infinite DecCsts".into()));
        }
        Ok(())
    }
}

/// A (very) rough upper bound on the flow any single arc can carry for each commodity: the total
/// supply, plus the capacity of every arc whose cost may become negative, plus room for the
/// deficits to change by `chg_dfct`.
pub(crate) fn flow_bounds(
    n_nodes: usize,
    costs: &[Vec<Cost>],
    capacities: &[Vec<Flow>],
    deficits: &[Vec<Flow>],
    shared: &[Flow],
    chg_dfct: Flow,
    dec_csts: Cost,
) -> Result<Vec<Flow>> {
    let slack = ((n_nodes + 1) / 2) as f64 * chg_dfct;

    let mut bounds = Vec::with_capacity(costs.len());
    for (k, ((c, u), b)) in costs.iter().zip(capacities).zip(deficits).enumerate() {
        let supply = b.iter().filter(|&&b| b < 0.0).map(|b| -b).sum::<Flow>();

        let mut negative = 0.0;
        for (j, (&c, &u)) in c.iter().zip(u).enumerate() {
            if c < dec_csts {
                let max_flow = u.min(shared[j]);
                if max_flow >= INF {
                    return Err(Error::InvalidArgument(format!(
                        "negative cost, infinite capacity: arc {} of commodity {}",
                        j, k
                    )));
                }
                negative += max_flow;
            }
        }

        bounds.push(supply + negative + slack);
    }

    Ok(bounds)
}

fn same_row(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Looks for rows that are bit-for-bit copies of an earlier row, or of `reference`.
fn duplicates(rows: &[Vec<f64>], reference: Option<&[f64]>) -> DuplicateMarkers {
    let mut sources = vec![RowSource::Own; rows.len()];
    for k in 0..rows.len() {
        let earlier = (0..k).find(|&i| sources[i] == RowSource::Own && same_row(&rows[k], &rows[i]));
        sources[k] = match earlier {
            Some(i) => RowSource::Commodity(i),
            None if reference.map_or(false, |r| same_row(&rows[k], r)) => RowSource::Shared,
            None => RowSource::Own,
        };
    }

    if sources.iter().all(|&s| s == RowSource::Own) {
        return DuplicateMarkers::NoneFound;
    }

    let flags = (0..rows.len())
        .map(|k| sources[k] != RowSource::Own || sources.contains(&RowSource::Commodity(k)))
        .collect();

    DuplicateMarkers::Found { flags, sources }
}

impl Problem {
    /// Tightens the data of the problem and finds the capacity constraints that can never be
    /// binding, given bounds on how much the data may change later on. Arcs that can never carry
    /// flow of a commodity are declared non-existent for it, redundant capacities are replaced
    /// by finite values, and rows that are copies of each other are marked.
    ///
    /// Every arc whose cost may become negative (cost < `dec_csts`) must have a finite capacity,
    /// otherwise no bound on the flows can be found and `Error::InvalidArgument` is returned.
    /// On error the problem is left untouched.
    ///
    /// Preprocessing is meant to be done once; running it again on the result is not supported.
    pub fn preprocess(&mut self, bounds: &PreprocessBounds) -> Result<PreprocessReport> {
        bounds.check()?;
        info!("Preprocessing {}", self);

        let n_arcs = self.n_arcs();
        let n_comm = self.n_commodities();

        let mut costs = self.costs.clone();
        let mut capacities = self.capacities.clone();
        let mut shared = self.shared.clone();

        // arcs entering or leaving a removed node do not exist
        for (k, c) in costs.iter_mut().enumerate() {
            for (j, arc) in self.arcs.iter().enumerate() {
                if self.deficits[k][arc.start] == INF || self.deficits[k][arc.end] == INF {
                    c[j] = INF;
                }
            }
        }

        // non-existent arcs have no capacity
        for (c, u) in costs.iter().zip(capacities.iter_mut()) {
            for j in 0..n_arcs {
                if c[j] == INF {
                    u[j] = 0.0;
                }
            }
        }

        let flow_bounds = flow_bounds(
            self.n_nodes,
            &costs,
            &capacities,
            &self.deficits,
            &shared,
            bounds.chg_dfct,
            bounds.dec_csts,
        )?;
        let max_flow = flow_bounds.iter().sum::<Flow>();

        // shared capacity constraints
        let mut coupling = vec![false; n_arcs];
        for j in 0..n_arcs {
            if bounds.inc_uk == 0.0 && shared[j] == 0.0 {
                debug!("arc {} has no capacity left and is removed", j);
                for k in 0..n_comm {
                    costs[k][j] = INF;
                    capacities[k][j] = 0.0;
                }
                continue;
            }

            if bounds.dec_uk == INF {
                if shared[j] == INF {
                    shared[j] = max_flow;
                } else {
                    coupling[j] = true;
                }
                continue;
            }

            // an upper bound on the flow of all commodities together on arc j
            let most = if bounds.inc_ujk < INF {
                (0..n_comm)
                    .map(|k| match capacities[k][j] {
                        u if u == INF => flow_bounds[k],
                        u => flow_bounds[k].min(u + bounds.inc_ujk),
                    })
                    .sum()
            } else {
                max_flow
            };

            // a shared capacity equal to the bound is redundant as well
            if shared[j] >= most - bounds.dec_uk {
                debug!("shared capacity of arc {} is redundant", j);
                shared[j] = most;
            } else {
                coupling[j] = true;
            }
        }
        let active = ActiveSet::from_flags(&coupling);

        // individual capacity constraints
        let mut active_k = Vec::with_capacity(n_comm);
        for k in 0..n_comm {
            let mut flags = vec![false; n_arcs];
            for j in 0..n_arcs {
                if costs[k][j] == INF {
                    continue;
                }

                if bounds.inc_ujk == 0.0 && capacities[k][j] == 0.0 {
                    costs[k][j] = INF;
                    continue;
                }

                if bounds.dec_ujk < INF {
                    if capacities[k][j] >= flow_bounds[k] + bounds.dec_ujk {
                        capacities[k][j] = flow_bounds[k].min(shared[j]);
                        continue;
                    }

                    // the shared capacity of an inactive arc is not enforced and proves nothing
                    if bounds.inc_uk < INF
                        && active.contains(j)
                        && capacities[k][j] >= shared[j] + bounds.inc_uk + bounds.dec_ujk
                    {
                        capacities[k][j] = shared[j];
                        continue;
                    }
                }

                flags[j] = true;
            }
            active_k.push(ActiveSet::from_flags(&flags));
        }

        let missing = |c: &[Vec<Cost>]| c.iter().flatten().filter(|&&c| c == INF).count();
        let removed = missing(&costs) - missing(&self.costs);

        self.costs = costs;
        self.capacities = capacities;
        self.shared = shared;
        self.active = active;
        self.active_k = active_k;

        self.deficit_copies = duplicates(&self.deficits, None);
        self.capacity_copies = duplicates(&self.capacities, Some(&self.shared));
        self.cost_copies = duplicates(&self.costs, None);

        let report = PreprocessReport {
            removed,
            coupling: self.n_coupling(),
            individual: self.active_k.iter().map(|a| a.len(n_arcs)).collect(),
            flow_bounds,
        };

        info!(
            "Preprocessing removed {} arcs and kept {} of {} shared capacity constraints",
            report.removed, report.coupling, n_arcs
        );

        Ok(report)
    }
}
