use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pips::{Board, Config, Interpreter, RunStats};

#[derive(Parser)]
#[command(name = "pips", version, about = "Run a pips board: a two-dimensional domino-tile program")]
struct Cli {
    /// Script to run
    file: PathBuf,

    /// Initial radix for values and opcodes (7-16)
    #[arg(long, default_value_t = 7)]
    base: u32,

    /// Seed for the random navigation modes
    #[arg(long)]
    seed: Option<u64>,

    /// Capacity of the data and return stacks
    #[arg(long = "stack-size", default_value_t = 512)]
    stack_size: usize,

    /// Delay after every instruction, in milliseconds
    #[arg(long = "step-delay", default_value_t = 0)]
    step_delay: u64,

    /// Yield to the host every N instructions (0 disables)
    #[arg(long = "yield-every", default_value_t = 0)]
    yield_every: u64,

    /// Print a JSON statistics report after the run
    #[arg(long)]
    stats: bool,

    /// Trace every executed instruction to stderr
    #[arg(long)]
    trace: bool,

    /// Reformat the board and print it instead of running
    #[arg(long)]
    fmt: bool,
}

#[derive(serde::Serialize)]
struct Report {
    elapsed_ms: u64,
    stats: RunStats,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let source = std::fs::read_to_string(&cli.file)
        .map_err(|e| format!("reading {}: {e}", cli.file.display()))?;

    if cli.fmt {
        let board = Board::parse(&source, cli.base).map_err(|e| e.to_string())?;
        println!("{}", board.source().map_err(|e| e.to_string())?);
        return Ok(());
    }

    let config = Config {
        base: cli.base,
        stack_capacity: cli.stack_size,
        step_delay_ms: cli.step_delay,
        yield_interval: cli.yield_every,
        seed: cli.seed,
        trace: cli.trace,
    };
    let mut interpreter = Interpreter::new(&source, config).map_err(|e| e.to_string())?;

    // imports resolve relative to the script's directory
    let script_dir = cli.file.parent().map(PathBuf::from).unwrap_or_default();
    interpreter.on_import(move |_, name| std::fs::read_to_string(script_dir.join(name)).ok());

    let started = std::time::Instant::now();
    interpreter.run().map_err(|e| e.to_string())?;

    if cli.stats {
        let report = Report {
            elapsed_ms: started.elapsed().as_millis() as u64,
            stats: interpreter.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?);
    }
    Ok(())
}
