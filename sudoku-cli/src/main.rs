//! Thin host binary: reads a constraint tree from a file or
//! stdin, drives [`sudoku::SearchEngine`], and prints the resulting
//! [`sudoku::Progress`] snapshot as JSON. The textual grammar that produces
//! the constraint tree, and any UI on top of the result, are someone else's
//! job — this binary only exercises the engine's consumed/produced
//! interfaces.

use std::io::Read as _;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use sudoku::{Builder, Constraint, Operation, StopReason};

#[derive(Parser)]
#[command(about = "Solve a Sudoku-family constraint puzzle")]
struct Args {
    /// Path to a JSON array of constraints; reads stdin if omitted.
    input: Option<PathBuf>,

    #[command(subcommand)]
    operation: OperationArg,

    /// Abort the search after this many milliseconds and report whatever the
    /// engine had found so far.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Subcommand)]
enum OperationArg {
    /// Stop at the nth solution found (1 = the first).
    FindNth {
        #[arg(default_value_t = 1)]
        n: u64,
    },
    /// Enumerate every solution, or up to `limit` if given.
    Count {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Check only that the layout constraints (jigsaw/region boundaries) are
    /// satisfiable, ignoring whatever value-level constraints the tree omits.
    Validate,
}

impl From<&OperationArg> for Operation {
    fn from(arg: &OperationArg) -> Self {
        match arg {
            OperationArg::FindNth { n } => Operation::FindNthSolution { n: *n },
            OperationArg::Count { limit } => Operation::CountSolutions { limit: *limit },
            OperationArg::Validate => Operation::ValidateLayout,
        }
    }
}

fn read_input(path: Option<&PathBuf>) -> String {
    match path {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|err| {
            eprintln!("could not read {path:?}: {err}");
            std::process::exit(1);
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .unwrap_or_else(|err| {
                    eprintln!("could not read stdin: {err}");
                    std::process::exit(1);
                });
            buf
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let input = read_input(args.input.as_ref());
    let constraints: Vec<Constraint> = serde_json::from_str(&input).unwrap_or_else(|err| {
        eprintln!("invalid constraint tree: {err}");
        std::process::exit(1);
    });

    let mut engine = Builder::new(constraints)
        .and_then(Builder::build)
        .unwrap_or_else(|err| {
            eprintln!("could not build engine: {err}");
            std::process::exit(1);
        });

    let deadline = args
        .timeout_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let operation = Operation::from(&args.operation);
    let outcome = engine.run(operation, |_| deadline.is_some_and(|d| Instant::now() >= d));

    log::info!(
        "stopped: {:?} after {} guesses, {} backtracks, {} solutions",
        outcome.reason,
        outcome.stats.guesses,
        outcome.stats.backtracks,
        outcome.solutions.len(),
    );

    let done = !matches!(outcome.reason, StopReason::Cancelled);
    let progress = engine.progress_from(&outcome, done);
    println!(
        "{}",
        serde_json::to_string_pretty(&progress).expect("Progress always serializes")
    );

    if !done {
        std::process::exit(2);
    }
}
