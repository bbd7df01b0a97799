//! Concrete scenario and invariant tests against the public API.

use sudoku::handler::{HandlerSet, Handler, Lunchbox, SameValues, Skyscraper};
use sudoku::grid::CellState;
use sudoku::lookup::LookupTables;
use sudoku::{Builder, Constraint};

fn given(cell: &str, value: u8) -> Constraint {
    Constraint::Given {
        cell: cell.to_string(),
        value,
    }
}

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
    givens.iter().map(|&(cell, value)| given(cell, value)).collect()
}

#[test]
fn classic_9x9_has_a_unique_solution() {
    let builder = Builder::new(classic_9x9_givens()).expect("valid constraint tree");
    let mut engine = builder.build().expect("buildable");
    let outcome = engine.run(sudoku::Operation::CountSolutions { limit: Some(2) }, |_| false);
    assert_eq!(outcome.reason, sudoku::StopReason::Exhausted);
    assert_eq!(outcome.solutions.len(), 1);
    assert_eq!(outcome.solutions[0].len(), 81);
}

#[test]
fn small_4x4_with_one_given_has_multiple_solutions() {
    let mut constraints = vec![Constraint::Shape {
        num_rows: 4,
        num_cols: 4,
        num_values: 4,
        box_height: Some(2),
        box_width: Some(2),
    }];
    constraints.push(given("R1C1", 1));

    let builder = Builder::new(constraints).expect("valid constraint tree");
    let mut engine = builder.build().expect("buildable");
    let outcome = engine.run(sudoku::Operation::CountSolutions { limit: Some(3) }, |_| false);
    assert!(outcome.solutions.len() > 1);

    let distinct: std::collections::HashSet<_> = outcome.solutions.iter().collect();
    assert_eq!(distinct.len(), outcome.solutions.len());
}

#[test]
fn lunchbox_four_cell_line_target_five_allows_bread_one_and_four() {
    let mut handler = Lunchbox::new(vec![0, 1, 2, 3], 5, 4);
    let tables = LookupTables::get(4);
    let mut grid = CellState::new(4, tables.all_values());
    let mut exclusions = sudoku::exclusions::CellExclusions::new(4);
    let shape = sudoku::GridShape::new(1, 4, 4);
    handler.initialize(&mut grid, &mut exclusions, &shape).unwrap();

    let mut set = HandlerSet::new(4, vec![Box::new(handler)]);
    set.mark_all_dirty();
    set.propagate(&mut grid, || {}).unwrap();

    // {1,4} as bread and {2,3} as interior (summing to 5) must still be
    // reachable after propagation.
    let one = tables.from_value(1);
    let four = tables.from_value(4);
    assert!(grid.get(0) & (one | four) != 0 || grid.get(3) & (one | four) != 0);
}

#[test]
fn skyscraper_visibility_one_pins_first_cell_and_prunes_rest() {
    let mut handler = Skyscraper::new(vec![0, 1, 2, 3], 1, 4);
    let tables = LookupTables::get(4);
    let mut grid = CellState::new(4, tables.all_values());
    let mut exclusions = sudoku::exclusions::CellExclusions::new(4);
    let shape = sudoku::GridShape::new(1, 4, 4);
    handler.initialize(&mut grid, &mut exclusions, &shape).unwrap();

    let mut set = HandlerSet::new(4, vec![Box::new(handler)]);
    set.mark_all_dirty();
    set.propagate(&mut grid, || {}).unwrap();

    assert_eq!(grid.get(0), tables.from_value(4));
    for cell in 1..4 {
        assert_eq!(grid.get(cell) & tables.from_value(4), 0);
    }
}

#[test]
fn skyscraper_visibility_four_fixes_the_ascending_run() {
    let mut handler = Skyscraper::new(vec![0, 1, 2, 3], 4, 4);
    let tables = LookupTables::get(4);
    let mut grid = CellState::new(4, tables.all_values());
    let mut exclusions = sudoku::exclusions::CellExclusions::new(4);
    let shape = sudoku::GridShape::new(1, 4, 4);
    handler.initialize(&mut grid, &mut exclusions, &shape).unwrap();

    let mut set = HandlerSet::new(4, vec![Box::new(handler)]);
    set.mark_all_dirty();
    set.propagate(&mut grid, || {}).unwrap();

    for (cell, value) in (0..4).zip(1..=4u8) {
        assert_eq!(grid.get(cell), tables.from_value(value));
    }
}

#[test]
fn same_values_scenario_narrows_to_the_shared_candidate() {
    let tables = LookupTables::get(4);
    let mut grid = CellState::new(4, 0);
    grid.set(0, tables.from_value(1) | tables.from_value(2));
    grid.set(1, tables.from_value(2) | tables.from_value(3));
    grid.set(2, tables.from_value(2) | tables.from_value(3));
    grid.set(3, tables.from_value(2) | tables.from_value(4));

    let mut handler = SameValues::new(vec![0, 1], vec![2, 3], 4);
    let mut exclusions = sudoku::exclusions::CellExclusions::new(4);
    let shape = sudoku::GridShape::new(1, 4, 4);
    handler.initialize(&mut grid, &mut exclusions, &shape).unwrap();

    let mut set = HandlerSet::new(4, vec![Box::new(handler)]);
    set.mark_all_dirty();
    set.propagate(&mut grid, || {}).unwrap();

    assert_eq!(grid.get(0), tables.from_value(2));
    assert_eq!(grid.get(3), tables.from_value(2));
}

#[test]
fn running_the_same_puzzle_twice_is_deterministic() {
    let first = {
        let builder = Builder::new(classic_9x9_givens()).expect("valid constraint tree");
        let mut engine = builder.build().expect("buildable");
        engine.run(sudoku::Operation::FindNthSolution { n: 1 }, |_| false)
    };
    let second = {
        let builder = Builder::new(classic_9x9_givens()).expect("valid constraint tree");
        let mut engine = builder.build().expect("buildable");
        engine.run(sudoku::Operation::FindNthSolution { n: 1 }, |_| false)
    };
    assert_eq!(first.stats.guesses, second.stats.guesses);
    assert_eq!(first.stats.backtracks, second.stats.backtracks);
    assert_eq!(first.solutions, second.solutions);
}

#[test]
fn conflicting_givens_are_rejected_before_search() {
    let constraints = vec![given("R1C1", 1), given("R1C1", 2)];
    let builder = Builder::new(constraints).expect("valid constraint tree");
    assert!(builder.build().is_err());
}
