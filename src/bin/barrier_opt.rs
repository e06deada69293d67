//! Run store barrier insertion over a TIR module and print the result.
//!
//! Set `RUST_LOG=store_barrier=trace` for the per-instruction epoch dump.

use clap::Parser;
use std::io::{self, Read};
use std::path::PathBuf;
use store_barrier::barrier::{BarrierConfig, ModeSelection, DEFAULT_STACK_ESCAPE_CAPACITY};
use store_barrier::test_ir::{check, TestIR};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Auto,
    Fast,
    Global,
}

impl From<Mode> for ModeSelection {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => ModeSelection::Auto,
            Mode::Fast => ModeSelection::Fast,
            Mode::Global => ModeSelection::Global,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "barrier-opt",
    version,
    about = "Insert GC store barriers into a TIR module"
)]
struct Cli {
    /// Input .tir file, stdin when omitted
    input: Option<PathBuf>,

    /// Barrier algorithm; auto picks global for SSA functions
    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Stack slots that may hold a fresh value at once
    #[arg(long, default_value_t = DEFAULT_STACK_ESCAPE_CAPACITY)]
    stack_escape_capacity: usize,

    /// Print statistics to stderr
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let text = match &cli.input {
        Some(path) => std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e)),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map(|_| buffer)
                .map_err(|e| format!("stdin: {}", e))
        }
    };
    let text = match text {
        Ok(text) => text,
        Err(e) => {
            eprintln!("barrier-opt: error: {}", e);
            std::process::exit(2);
        }
    };

    let mut ir = match TestIR::parse(&text) {
        Ok(ir) => ir,
        Err(e) => {
            eprintln!("barrier-opt: {}", e);
            std::process::exit(1);
        }
    };

    let config = BarrierConfig::default()
        .with_mode(cli.mode.into())
        .with_stack_escape_capacity(cli.stack_escape_capacity);
    // Functions that fail are printed unchanged.
    let (stats, failures) = check::run_module_keep_going(&mut ir, &config);
    for (func, e) in &failures {
        eprintln!("barrier-opt: error in {}: {}", func, e);
    }
    print!("{}", ir);
    if cli.stats {
        eprint!("{}", stats);
    }
    if !failures.is_empty() {
        std::process::exit(1);
    }
}
