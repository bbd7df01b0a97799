//! Benchmarks for propagation and full search, exercised against the
//! classic 9x9 scenario.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sudoku::grid::CellState;
use sudoku::handler::{AllDifferent, HandlerSet};
use sudoku::lookup::LookupTables;
use sudoku::{Builder, Constraint, Operation};

fn classic_9x9_givens() -> Vec<Constraint> {
    let givens: &[(&str, u8)] = &[
        ("R1C1", 5), ("R1C2", 3), ("R1C5", 7),
        ("R2C1", 6), ("R2C4", 1), ("R2C5", 9), ("R2C6", 5),
        ("R3C2", 9), ("R3C3", 8), ("R3C8", 6),
        ("R4C1", 8), ("R4C5", 6), ("R4C9", 3),
        ("R5C1", 4), ("R5C4", 8), ("R5C6", 3), ("R5C9", 1),
        ("R6C1", 7), ("R6C5", 2), ("R6C9", 6),
        ("R7C2", 6), ("R7C7", 2), ("R7C8", 8),
        ("R8C4", 4), ("R8C5", 1), ("R8C6", 9), ("R8C9", 5),
        ("R9C5", 8), ("R9C8", 7), ("R9C9", 9),
    ];
    givens
        .iter()
        .map(|&(cell, value)| Constraint::Given {
            cell: cell.to_string(),
            value,
        })
        .collect()
}

fn bench_full_solve(c: &mut Criterion) {
    c.bench_function("classic_9x9_find_first_solution", |b| {
        b.iter(|| {
            let builder = Builder::new(classic_9x9_givens()).expect("valid constraint tree");
            let mut engine = builder.build().expect("buildable");
            let outcome = engine.run(Operation::FindNthSolution { n: 1 }, |_| false);
            black_box(outcome.solutions.len())
        });
    });
}

fn bench_row_propagation(c: &mut Criterion) {
    // One round of naked/hidden-single propagation over a single 9-cell row
    // with one value already fixed, isolated from search and the builder.
    c.bench_function("all_different_row_propagation", |b| {
        b.iter(|| {
            let tables = LookupTables::get(9);
            let mut grid = CellState::new(9, tables.all_values());
            grid.set(0, tables.from_value(5));
            let handler = AllDifferent::new((0..9).collect(), 9);
            let mut set = HandlerSet::new(9, vec![Box::new(handler)]);
            set.mark_all_dirty();
            set.propagate(&mut grid, || {}).unwrap();
            black_box(grid.get(1))
        });
    });
}

criterion_group!(benches, bench_full_solve, bench_row_propagation);
criterion_main!(benches);
