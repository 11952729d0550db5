use std::path::PathBuf;

use clap::Parser;
use shoal::constants::STARTUP_ERROR;
use shoal_runner::init::{init, RunnerOptions};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "shoal.ron")]
    config: PathBuf,

    /// Number of ticks to run before exiting (0 runs until interrupted)
    #[arg(short, long, default_value_t = 0)]
    ticks: u64,

    /// Worker thread count, overriding the config file
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long)]
    skip_samples: bool,
}

fn main() {
    let args = Args::parse();

    if args.threads == Some(0) {
        eprintln!("Error: --threads must be at least 1.");
        std::process::exit(1);
    }

    let options = RunnerOptions {
        config_path: args.config,
        ticks: args.ticks,
        threads: args.threads,
        run_samples: !args.skip_samples,
    };

    match init(options) {
        Ok(exit) if exit.is_error() => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("{STARTUP_ERROR}: {err}");
            std::process::exit(1);
        }
    }
}
