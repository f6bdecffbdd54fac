use anyhow::{anyhow, Result};
use clap::Parser;
use pairmsa::{self, Cli, Command, LogLevel};
use std::{fs::File, io::BufWriter};

// --------------------------------------------------
fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// --------------------------------------------------
fn run(cli_args: Cli) -> Result<()> {
    let mut logger = env_logger::Builder::new();
    logger.filter_level(match cli_args.log {
        Some(LogLevel::Debug) => log::LevelFilter::Debug,
        Some(LogLevel::Info) => log::LevelFilter::Info,
        _ => log::LevelFilter::Off,
    });
    if let Some(logfile) = &cli_args.logfile {
        logger.target(env_logger::Target::Pipe(Box::new(BufWriter::new(
            File::create(logfile).map_err(|e| {
                anyhow!("Cannot write {}: {e}", logfile.display())
            })?,
        ))));
    }
    logger.init();

    match &cli_args.command {
        Command::Pair(args) => pairmsa::run_pair(args),
        Command::Homooligomer(args) => pairmsa::run_homooligomer(args),
    }
}
