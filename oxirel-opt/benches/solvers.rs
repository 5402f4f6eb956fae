//! Benchmark the consistency solvers on a chain of hypernymy fixtures

use criterion::{Criterion, criterion_group, criterion_main};
use oxirel_logic::{Logic, Model};
use oxirel_opt::{ConsistProblem, ConsistencySolver, SolveControl, SolverConfig, SolverKind};
use std::hint::black_box;

/// `copies` disjoint four-term fixtures, each needing one removal.
fn chained_problem(copies: usize) -> ConsistProblem {
    let mut model = Model::new(4 * copies);
    let hyp = model.add_probability_graph("hyp");
    hyp.set_base_val(0.02);
    for c in 0..copies {
        let o = 4 * c;
        hyp.set_val(o, o + 1, 0.99);
        hyp.set_val(o + 1, o + 2, 0.8);
        hyp.set_val(o + 2, o + 3, 0.99);
        hyp.set_val(o, o + 2, 0.45);
        hyp.set_val(o + 1, o + 3, 0.45);
    }
    let logic = Logic::parse("hyp(1,2); hyp(2,3) -> hyp(1,3)").unwrap();
    ConsistProblem::new(logic, model).unwrap()
}

fn benchmark_solvers(c: &mut Criterion) {
    let config = SolverConfig::default();
    let problem = chained_problem(3);
    for kind in [
        SolverKind::BranchBound,
        SolverKind::Growing,
        SolverKind::ResFree,
        SolverKind::GreedySat,
        SolverKind::Approx,
    ] {
        c.bench_function(&format!("solve_{kind}"), |b| {
            b.iter(|| {
                let mut solver = config.build_kind(kind, problem.clone());
                black_box(solver.solve(&SolveControl::new()).unwrap())
            });
        });
    }
}

fn benchmark_problem_matrix(c: &mut Criterion) {
    let problem = chained_problem(3);
    c.bench_function("build_problem_matrix", |b| {
        b.iter(|| {
            let mut problem = problem.clone();
            black_box(problem.build_problem_matrix().unwrap())
        });
    });
}

criterion_group!(benches, benchmark_solvers, benchmark_problem_matrix);
criterion_main!(benches);
