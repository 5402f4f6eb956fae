//! Solving by connected components.
//!
//! When every rule is range restricted and the positive premises of each rule
//! link all of its variables, a violated instantiation can only touch
//! elements that are already connected, and flipping edges inside a
//! component never connects it to another. Each component is then an
//! independent problem: it is solved on its own induced model and the local
//! flips are lifted back to global edge ids.
//!
//! Logics that do not meet the condition are solved as a whole.

use crate::error::{Result, SolveError};
use crate::problem::{ConsistProblem, ProblemConfig};
use crate::process::SolveControl;
use crate::solution::{ConsistencySolver, Solution, SolutionStatus};
use oxirel_logic::{EdgeId, Logic, Model, Rule, Var};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Whether the positive premises of `rule` mention every variable and link
/// them into one group.
fn premises_connect(rule: &Rule) -> bool {
    if !rule.is_range_restricted() {
        return false;
    }
    let vars = rule.vars();
    let index: FxHashMap<Var, usize> = vars.iter().enumerate().map(|(k, &v)| (v, k)).collect();
    let mut parent: Vec<usize> = (0..vars.len()).collect();
    fn root(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    for lit in rule.premises().iter().filter(|l| !l.negated) {
        let [a, b] = lit.atom.args;
        let (ra, rb) = (root(&mut parent, index[&a]), root(&mut parent, index[&b]));
        parent[ra.max(rb)] = ra.min(rb);
    }
    (0..vars.len()).all(|k| root(&mut parent, k) == root(&mut parent, 0))
}

/// Whether components of any model can be solved independently under
/// `logic`.
pub fn is_decomposable(logic: &Logic) -> bool {
    logic.rules().all(|(_, rule)| premises_connect(rule))
}

/// Solve `model` one connected component at a time with solvers made by
/// `factory`, merging the lifted flips.
///
/// The merged cost is recomputed on the whole problem. The result is optimal
/// when every component result is. Falls back to one solve over the whole
/// model when the logic is not decomposable.
pub fn solve_by_components<S, F>(
    logic: &Logic,
    model: &Model,
    config: &ProblemConfig,
    mut factory: F,
    control: &SolveControl,
) -> Result<Solution>
where
    S: ConsistencySolver,
    F: FnMut(ConsistProblem) -> S,
{
    let whole = ConsistProblem::with_config(logic.clone(), model.clone(), config.clone())?;
    if !is_decomposable(logic) {
        debug!("logic links unconnected elements, solving the whole model");
        return factory(whole).solve(control);
    }

    let components = model.component_split();
    let total = components.len().max(1);
    let mut flips: BTreeSet<EdgeId> = BTreeSet::new();
    let mut status = SolutionStatus::Optimal;
    let mut solved = 0usize;
    for (k, component) in components.iter().enumerate() {
        control.checkpoint()?;
        let part =
            ConsistProblem::with_config(logic.clone(), component.model.clone(), config.clone())?;
        if part.logic().is_consistent(part.base())? {
            continue;
        }
        debug!(
            component = k,
            elements = component.elements.len(),
            "solving component"
        );
        let solution = factory(part).solve(control)?;
        if !solution.is_optimal() {
            status = SolutionStatus::Heuristic;
        }
        flips.extend(solution.flips.iter().map(|&e| component.global_edge(e)));
        solved += 1;
        control.report((k + 1) as f64 / total as f64, "components");
    }

    if !whole.is_consistent_with(&flips)? {
        return Err(SolveError::NoSolution {
            solver: "components",
            reason: "merged component solutions are inconsistent".to_string(),
        });
    }
    let cost = whole.cost_of(&flips);
    info!(
        components = components.len(),
        solved,
        flips = flips.len(),
        cost,
        "solved by components"
    );
    Ok(Solution::new(flips, cost, status))
}
