//! vibecore - run SQL scripts against an in-memory engine

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use std::io::Read;
use std::path::PathBuf;
use vibecore::config::EngineConfig;
use vibecore::database::Database;
use vibecore::script::{run_script, run_script_file};

/// vibecore - SQL expression and constraint engine
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQL script to run; standard input when absent
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Rounds a recursive query may run (overrides VIBECORE_MAX_RECURSION)
    #[arg(short = 'r', long)]
    max_recursion: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = EngineConfig::from_env();
    if let Some(rounds) = args.max_recursion {
        config = config.with_max_recursive_rounds(rounds);
    }

    let database = Database::new(config);
    let mut session = database.session();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &args.script {
        Some(path) => {
            run_script_file(&mut session, path, &mut out)?;
        }
        None => {
            let mut script = String::new();
            std::io::stdin()
                .read_to_string(&mut script)
                .context("Failed to read script from standard input")?;
            run_script(&mut session, &script, &mut out)?;
        }
    }
    Ok(())
}
